use std::{
    any::Any,
    collections::VecDeque,
    path::PathBuf,
    time::Duration,
};

use futures::FutureExt;
use tokio::{sync::mpsc::Sender, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::{
    error::AppError,
    event::{Envelope, EventSink, TaskId, TaskKind},
    merge, scan,
};

pub const PREVIEW_POOL_SIZE: usize = 2;

const PRIMARY_GRACE: Duration = Duration::from_millis(1500);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Task {
    ScanImages(PathBuf),
    ListSubfolders(PathBuf),
    Merge {
        sources: Vec<PathBuf>,
        target: PathBuf,
        delete_empty_sources: bool,
    },
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::ScanImages(_) => TaskKind::ScanImages,
            Task::ListSubfolders(_) => TaskKind::ListSubfolders,
            Task::Merge { .. } => TaskKind::Merge,
        }
    }
}

struct RunningTask {
    id: TaskId,
    kind: TaskKind,
    cancellation: CancellationToken,
    handle: JoinHandle<()>,
}

struct RunningPreview {
    id: TaskId,
    folder: PathBuf,
    cancellation: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns every spawned unit of background work: one primary task slot for
/// scans, listings and merges, plus a bounded pool of preview lookups with a
/// FIFO wait queue. All results travel through the notification channel; the
/// manager itself is driven from the single threaded orchestrating layer.
pub struct TaskManager {
    sender: Sender<Envelope>,
    primary: Option<RunningTask>,
    previews: Vec<RunningPreview>,
    waiting: VecDeque<PathBuf>,
    generation: u64,
}

impl TaskManager {
    pub fn new(sender: Sender<Envelope>) -> Self {
        Self {
            sender,
            primary: None,
            previews: Vec::new(),
            waiting: VecDeque::new(),
            generation: 0,
        }
    }

    fn next_id(&mut self) -> TaskId {
        self.generation += 1;
        TaskId(self.generation)
    }

    /// Starts a primary task. A previously running primary is cancelled
    /// first and briefly waited on, so at most one is ever active.
    pub async fn run(&mut self, task: Task) -> TaskId {
        self.cancel_primary().await;

        let id = self.next_id();
        let kind = task.kind();
        let cancellation = CancellationToken::new();
        let events = EventSink::new(id, kind, self.sender.clone());
        let token = cancellation.clone();

        tracing::debug!("starting {:?} task {:?}", kind, id);

        let handle = tokio::spawn(async move {
            let body = async {
                match task {
                    Task::ScanImages(folder) => {
                        scan::scan_images(&folder, &token, &events).await.map(|()| true)
                    }
                    Task::ListSubfolders(folder) => {
                        scan::list_subdirs(&folder, &token, &events).await.map(|()| true)
                    }
                    Task::Merge {
                        sources,
                        target,
                        delete_empty_sources,
                    } => merge::merge(&sources, &target, delete_empty_sources, &token, &events)
                        .await
                        .map(|outcome| !outcome.cancelled && outcome.is_success()),
                }
            };

            let result = match std::panic::AssertUnwindSafe(body).catch_unwind().await {
                Ok(result) => result,
                Err(reason) => Err(AppError::Unexpected(panic_reason(reason))),
            };

            finish(&events, result).await;
        });

        self.primary = Some(RunningTask {
            id,
            kind,
            cancellation,
            handle,
        });

        id
    }

    pub fn primary_id(&self) -> Option<TaskId> {
        self.primary.as_ref().map(|running| running.id)
    }

    /// Acknowledges a primary task's terminal notification and frees the
    /// slot without the cancellation wait.
    pub fn primary_finished(&mut self, id: TaskId) {
        if self.primary_id() == Some(id) {
            self.primary = None;
        }
    }

    /// Requests cooperative cancellation of the running primary, waits a
    /// bounded grace period for it to exit, then aborts it and always waits
    /// for the abort to complete before freeing the slot.
    pub async fn cancel_primary(&mut self) {
        let Some(mut running) = self.primary.take() else {
            return;
        };

        if running.handle.is_finished() {
            let _ = running.handle.await;
            return;
        }

        tracing::debug!("cancelling {:?} task {:?}", running.kind, running.id);
        running.cancellation.cancel();

        if time::timeout(PRIMARY_GRACE, &mut running.handle).await.is_err() {
            tracing::warn!(
                "{:?} task {:?} did not stop within the grace period, aborting",
                running.kind,
                running.id
            );
            running.handle.abort();
            let _ = running.handle.await;
        }
    }

    /// Schedules a preview lookup for the folder: ignored when one is
    /// already running or queued, run immediately while the pool has a free
    /// slot, queued in FIFO order otherwise. Cache hits are the caller's
    /// business and never reach the manager.
    pub fn request_preview(&mut self, folder: PathBuf) {
        if self.previews.iter().any(|preview| preview.folder == folder) {
            tracing::trace!("preview for {:?} already running", folder);
            return;
        }

        if self.waiting.contains(&folder) {
            return;
        }

        if self.previews.len() >= PREVIEW_POOL_SIZE {
            self.waiting.push_back(folder);
            return;
        }

        self.spawn_preview(folder);
    }

    /// Acknowledges a preview task's terminal notification and drains the
    /// wait queue one in, one out.
    pub fn preview_finished(&mut self, id: TaskId) {
        let Some(index) = self.previews.iter().position(|preview| preview.id == id) else {
            return;
        };

        self.previews.remove(index);

        if let Some(next) = self.waiting.pop_front() {
            self.spawn_preview(next);
        }
    }

    pub fn is_preview(&self, id: TaskId) -> bool {
        self.previews.iter().any(|preview| preview.id == id)
    }

    pub fn running_previews(&self) -> usize {
        self.previews.len()
    }

    pub fn waiting_previews(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_idle(&self) -> bool {
        self.primary.is_none() && self.previews.is_empty() && self.waiting.is_empty()
    }

    /// Drops the wait queue and requests cancellation of every running
    /// preview without waiting; their late notifications are filtered as
    /// stale by the orchestrator.
    pub fn cancel_previews(&mut self) {
        self.waiting.clear();

        for preview in self.previews.drain(..) {
            tracing::trace!("cancelling preview task {:?}", preview.id);
            preview.cancellation.cancel();
        }
    }

    /// Cancels everything and waits for all units of execution to wind
    /// down, aborting stragglers after a short grace period.
    pub async fn shutdown(&mut self) {
        self.waiting.clear();
        self.cancel_primary().await;

        for preview in &self.previews {
            preview.cancellation.cancel();
        }

        for mut preview in self.previews.drain(..) {
            if preview.handle.is_finished() {
                let _ = preview.handle.await;
                continue;
            }

            if time::timeout(SHUTDOWN_GRACE, &mut preview.handle)
                .await
                .is_err()
            {
                preview.handle.abort();
                let _ = preview.handle.await;
            }
        }
    }

    fn spawn_preview(&mut self, folder: PathBuf) {
        let id = self.next_id();
        let cancellation = CancellationToken::new();
        let events = EventSink::new(id, TaskKind::FindPreview, self.sender.clone());
        let token = cancellation.clone();
        let task_folder = folder.clone();

        tracing::trace!("starting preview task {:?} for {:?}", id, folder);

        let handle = tokio::spawn(async move {
            let body = async { scan::find_preview(&task_folder, &token, &events).await.map(|()| true) };

            let result = match std::panic::AssertUnwindSafe(body).catch_unwind().await {
                Ok(result) => result,
                Err(reason) => Err(AppError::Unexpected(panic_reason(reason))),
            };

            finish(&events, result).await;
        });

        self.previews.push(RunningPreview {
            id,
            folder,
            cancellation,
            handle,
        });
    }
}

/// Task boundary: every task emits exactly one terminal notification, also
/// on errors and panics. Cancellation is terminal but not a failure report.
async fn finish(events: &EventSink, result: Result<bool, AppError>) {
    let success = match result {
        Ok(success) => success,
        Err(AppError::Cancelled) => {
            tracing::debug!("task cancelled");
            false
        }
        Err(error) => {
            events.error(format!("Error: {}", error)).await;
            false
        }
    };

    events.finished(success).await;
}

fn panic_reason(reason: Box<dyn Any + Send>) -> String {
    match reason.downcast::<String>() {
        Ok(text) => *text,
        Err(reason) => match reason.downcast::<&'static str>() {
            Ok(text) => (*text).to_string(),
            Err(_) => "task panicked".to_string(),
        },
    }
}
