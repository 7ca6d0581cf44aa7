use std::path::PathBuf;

use tokio::sync::mpsc::Sender;

/// Opaque task identity, handed out as a monotonically increasing generation
/// counter. Consumers compare ids before applying partial results to guard
/// against notifications from superseded tasks.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TaskId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskKind {
    ScanImages,
    FindPreview,
    ListSubfolders,
    Merge,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub task: TaskId,
    pub kind: TaskKind,
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    Progress(String),
    Error(String),
    ImageBatch(Vec<PathBuf>),
    PreviewFound(PathBuf, PathBuf),
    SubfoldersFound(Vec<PathBuf>),
    TaskFinished(TaskKind, bool),
}

/// Sending half handed into a background task. Tasks communicate exclusively
/// through this sink; they never touch shared state.
#[derive(Clone, Debug)]
pub struct EventSink {
    task: TaskId,
    kind: TaskKind,
    sender: Sender<Envelope>,
}

impl EventSink {
    pub fn new(task: TaskId, kind: TaskKind, sender: Sender<Envelope>) -> Self {
        Self { task, kind, sender }
    }

    async fn send(&self, message: Message) {
        let envelope = Envelope {
            task: self.task,
            kind: self.kind,
            messages: vec![message],
        };

        if self.sender.send(envelope).await.is_err() {
            tracing::trace!("notification receiver dropped, message discarded");
        }
    }

    pub async fn progress(&self, text: String) {
        self.send(Message::Progress(text)).await;
    }

    pub async fn error(&self, text: String) {
        tracing::error!("task reported error: {}", text);
        self.send(Message::Error(text)).await;
    }

    pub async fn image_batch(&self, paths: Vec<PathBuf>) {
        self.send(Message::ImageBatch(paths)).await;
    }

    pub async fn preview_found(&self, folder: PathBuf, image: PathBuf) {
        self.send(Message::PreviewFound(folder, image)).await;
    }

    pub async fn subfolders_found(&self, paths: Vec<PathBuf>) {
        self.send(Message::SubfoldersFound(paths)).await;
    }

    pub async fn finished(&self, success: bool) {
        self.send(Message::TaskFinished(self.kind, success)).await;
    }
}
