use std::path::PathBuf;

use tokio::sync::mpsc::{self, Receiver};

use crate::{
    catalog::{FolderCatalog, SortMode},
    error::AppError,
    event::{Envelope, Message, TaskKind},
    merge::plan_merge,
    task::{Task, TaskManager},
};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct Settings {
    pub delete_empty_sources: bool,
    pub sort: SortMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delete_empty_sources: true,
            sort: SortMode::default(),
        }
    }
}

/// Single threaded orchestrating layer between a user interface and the
/// background tasks. Owns the catalog and the task manager, receives every
/// task notification on one channel and is the only place shared state is
/// mutated.
pub struct Session {
    pub catalog: FolderCatalog,
    tasks: TaskManager,
    receiver: Receiver<Envelope>,
    delete_empty_sources: bool,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

        let mut catalog = FolderCatalog::default();
        catalog.set_sort_mode(settings.sort);

        Self {
            catalog,
            tasks: TaskManager::new(sender),
            receiver,
            delete_empty_sources: settings.delete_empty_sources,
        }
    }

    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_idle()
    }

    /// Makes `root` the current root and lists its subfolders. Selecting a
    /// new root drops the carried preview cache; re-selecting the current
    /// one refreshes in place.
    pub async fn select_root(&mut self, root: PathBuf) -> Result<(), AppError> {
        if !root.is_dir() {
            return Err(AppError::NotADirectory(root));
        }

        self.catalog.set_root(root);
        self.refresh().await;

        Ok(())
    }

    /// Re-lists the current root's subfolders. Running preview lookups are
    /// cancelled; the rebuilt entry list requests fresh ones as needed.
    pub async fn refresh(&mut self) {
        let Some(root) = self.catalog.root() else {
            return;
        };

        let root = root.to_path_buf();
        self.tasks.cancel_previews();
        self.tasks.run(Task::ListSubfolders(root)).await;
    }

    /// Scans the folder's images for the preview pane, replacing a running
    /// scan.
    pub async fn preview_folder(&mut self, folder: PathBuf) {
        self.catalog.set_selected(Some(folder.clone()));
        self.tasks.run(Task::ScanImages(folder)).await;
    }

    /// Plans and starts a merge of every checked folder. Refuses before
    /// touching any file when the computed target name collides with a
    /// checked source; the target directory is created here, idempotently,
    /// before the engine runs.
    pub async fn merge_checked(&mut self) -> Result<(), AppError> {
        let root = match self.catalog.root() {
            Some(root) => root.to_path_buf(),
            None => return Err(AppError::NoSourcesSelected),
        };

        let sources: Vec<PathBuf> = self
            .catalog
            .checked_entries()
            .iter()
            .map(|entry| entry.path.clone())
            .collect();

        let plan = plan_merge(&root, &sources)?;
        tokio::fs::create_dir_all(&plan.target).await?;

        self.tasks
            .run(Task::Merge {
                sources: plan.sources,
                target: plan.target,
                delete_empty_sources: self.delete_empty_sources,
            })
            .await;

        Ok(())
    }

    /// Requests a preview image for the folder: answered from the validated
    /// cache when possible, otherwise scheduled on the bounded lookup pool.
    pub fn request_preview(&mut self, folder: PathBuf) {
        if let Some(image) = self.catalog.cached_preview(&folder) {
            self.catalog.record_preview(folder, image);
            return;
        }

        self.tasks.request_preview(folder);
    }

    pub fn toggle_sort(&mut self) -> SortMode {
        self.catalog.toggle_sort()
    }

    /// Applies a task envelope to catalog and scheduler state and hands the
    /// messages back for display. Notifications from superseded tasks are
    /// dropped.
    pub async fn handle(&mut self, envelope: Envelope) -> Vec<Message> {
        if !self.is_current(&envelope) {
            tracing::trace!("dropping stale notification: {:?}", envelope);
            return Vec::new();
        }

        for message in &envelope.messages {
            match message {
                Message::SubfoldersFound(paths) => {
                    let pending = self.catalog.rebuild(paths.clone());
                    for folder in pending {
                        self.request_preview(folder);
                    }
                }
                Message::PreviewFound(folder, image) => {
                    self.catalog.record_preview(folder.clone(), image.clone());
                }
                Message::TaskFinished(kind, success) => match kind {
                    TaskKind::FindPreview => self.tasks.preview_finished(envelope.task),
                    TaskKind::Merge => {
                        self.tasks.primary_finished(envelope.task);
                        if self.catalog.root().is_some() {
                            tracing::debug!("merge finished (success: {}), refreshing", success);
                            self.refresh().await;
                        }
                    }
                    TaskKind::ScanImages | TaskKind::ListSubfolders => {
                        self.tasks.primary_finished(envelope.task);
                    }
                },
                Message::Progress(_) | Message::Error(_) | Message::ImageBatch(_) => {}
            }
        }

        envelope.messages
    }

    /// Winds every background task down; call before dropping the session.
    pub async fn shutdown(&mut self) {
        self.tasks.shutdown().await;
    }

    fn is_current(&self, envelope: &Envelope) -> bool {
        match envelope.kind {
            TaskKind::FindPreview => self.tasks.is_preview(envelope.task),
            _ => self.tasks.primary_id() == Some(envelope.task),
        }
    }
}
