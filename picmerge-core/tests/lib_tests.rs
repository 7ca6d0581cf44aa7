use std::{
    fs,
    path::{Path, PathBuf},
};

use tokio::sync::mpsc::{self, Receiver};
use tokio_util::sync::CancellationToken;

use picmerge_core::{
    error::AppError,
    event::{Envelope, EventSink, Message, TaskId, TaskKind},
    merge::{merge, plan_merge},
    scan::{find_preview, scan_images},
    session::{Session, Settings},
    task::{TaskManager, PREVIEW_POOL_SIZE},
};

fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sink(kind: TaskKind) -> (EventSink, Receiver<Envelope>, CancellationToken) {
    let (sender, receiver) = mpsc::channel(256);
    let events = EventSink::new(TaskId(1), kind, sender);

    (events, receiver, CancellationToken::new())
}

fn drain(receiver: &mut Receiver<Envelope>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Ok(envelope) = receiver.try_recv() {
        messages.extend(envelope.messages);
    }

    messages
}

#[tokio::test]
async fn merge_moves_all_files_and_renames_collisions() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("x/IMG_1.jpg"), b"one");
    write_file(&root.path().join("x/IMG_2.jpg"), b"two");
    write_file(&root.path().join("x/IMG_3.jpg"), b"three");
    write_file(&root.path().join("y/IMG_1.jpg"), b"collision");
    write_file(&root.path().join("y/IMG_9.jpg"), b"nine");

    let sources = vec![root.path().join("x"), root.path().join("y")];
    let plan = plan_merge(root.path(), &sources).unwrap();
    assert_eq!(root.path().join("x_merged"), plan.target);

    fs::create_dir_all(&plan.target).unwrap();

    let (events, _receiver, cancellation) = sink(TaskKind::Merge);
    let outcome = merge(&plan.sources, &plan.target, true, &cancellation, &events)
        .await
        .unwrap();

    assert_eq!(5, outcome.moved);
    assert_eq!(0, outcome.skipped);
    assert_eq!(2, outcome.deleted_source_dirs);
    assert!(outcome.is_success());
    assert!(!outcome.cancelled);

    assert!(plan.target.join("IMG_1.jpg").is_file());
    assert!(plan.target.join("IMG_1_1.jpg").is_file());
    assert!(plan.target.join("IMG_9.jpg").is_file());
    assert!(!root.path().join("x").exists());
    assert!(!root.path().join("y").exists());
}

#[tokio::test]
async fn merge_rerun_moves_and_skips_nothing() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("s1/a.jpg"), b"a");
    write_file(&root.path().join("s1/b.jpg"), b"b");

    let sources = vec![root.path().join("s1")];
    let target = root.path().join("s1_merged");
    fs::create_dir_all(&target).unwrap();

    let (events, _receiver, cancellation) = sink(TaskKind::Merge);
    let outcome = merge(&sources, &target, false, &cancellation, &events)
        .await
        .unwrap();
    assert_eq!(2, outcome.moved);
    assert_eq!(0, outcome.skipped);

    let outcome = merge(&sources, &target, false, &cancellation, &events)
        .await
        .unwrap();
    assert_eq!(0, outcome.moved);
    assert_eq!(0, outcome.skipped);

    assert!(root.path().join("s1").is_dir());
    assert_eq!(2, fs::read_dir(&target).unwrap().count());
}

#[tokio::test]
async fn merge_flattens_nested_sources_and_prunes_them() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("trip/day1/morning/a.jpg"), b"a");
    write_file(&root.path().join("trip/day1/b.jpg"), b"b");
    write_file(&root.path().join("trip/c.txt"), b"c");

    let sources = vec![root.path().join("trip")];
    let target = root.path().join("trip_merged");
    fs::create_dir_all(&target).unwrap();

    let (events, _receiver, cancellation) = sink(TaskKind::Merge);
    let outcome = merge(&sources, &target, true, &cancellation, &events)
        .await
        .unwrap();

    assert_eq!(3, outcome.moved);
    assert_eq!(0, outcome.skipped);
    assert_eq!(1, outcome.deleted_source_dirs);
    assert!(target.join("a.jpg").is_file());
    assert!(target.join("b.jpg").is_file());
    assert!(target.join("c.txt").is_file());
    assert!(!root.path().join("trip").exists());
}

#[tokio::test]
async fn merge_without_target_fails_fast() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("s1/a.jpg"), b"a");

    let sources = vec![root.path().join("s1")];
    let target = root.path().join("missing");

    let (events, _receiver, cancellation) = sink(TaskKind::Merge);
    let result = merge(&sources, &target, true, &cancellation, &events).await;

    assert!(matches!(result, Err(AppError::TargetMissing(_))));
    assert!(root.path().join("s1/a.jpg").is_file());
}

#[tokio::test]
async fn cancelled_merge_returns_partial_counts() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("s1/a.jpg"), b"a");

    let sources = vec![root.path().join("s1")];
    let target = root.path().join("s1_merged");
    fs::create_dir_all(&target).unwrap();

    let (events, _receiver, cancellation) = sink(TaskKind::Merge);
    cancellation.cancel();

    let outcome = merge(&sources, &target, true, &cancellation, &events)
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(0, outcome.moved);
    assert!(root.path().join("s1/a.jpg").is_file());
}

#[tokio::test]
async fn scan_emits_batches_of_fifty() {
    let root = tempfile::tempdir().unwrap();
    for index in 0..103 {
        write_file(&root.path().join(format!("nested/img_{}.png", index)), b"px");
    }
    write_file(&root.path().join("notes.txt"), b"not an image");

    let (events, mut receiver, cancellation) = sink(TaskKind::ScanImages);
    scan_images(root.path(), &cancellation, &events)
        .await
        .unwrap();

    let batches: Vec<usize> = drain(&mut receiver)
        .into_iter()
        .filter_map(|message| match message {
            Message::ImageBatch(paths) => Some(paths.len()),
            _ => None,
        })
        .collect();

    assert_eq!(vec![50, 50, 3], batches);
}

#[tokio::test]
async fn scan_rejects_non_directories() {
    let root = tempfile::tempdir().unwrap();
    let file = root.path().join("file.jpg");
    write_file(&file, b"px");

    let (events, _receiver, cancellation) = sink(TaskKind::ScanImages);
    let result = scan_images(&file, &cancellation, &events).await;

    assert!(matches!(result, Err(AppError::NotADirectory(_))));
}

#[tokio::test]
async fn cancelled_scan_stops_early() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("a.jpg"), b"px");

    let (events, mut receiver, cancellation) = sink(TaskKind::ScanImages);
    cancellation.cancel();

    let result = scan_images(root.path(), &cancellation, &events).await;

    assert!(matches!(result, Err(AppError::Cancelled)));
    let batches = drain(&mut receiver)
        .into_iter()
        .filter(|message| matches!(message, Message::ImageBatch(_)))
        .count();
    assert_eq!(0, batches);
}

#[tokio::test]
async fn preview_prefers_direct_files() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("direct.jpg"), b"px");
    write_file(&root.path().join("sub/deep.png"), b"px");

    let (events, mut receiver, cancellation) = sink(TaskKind::FindPreview);
    find_preview(root.path(), &cancellation, &events)
        .await
        .unwrap();

    let found = drain(&mut receiver).into_iter().find_map(|message| match message {
        Message::PreviewFound(_, image) => Some(image),
        _ => None,
    });

    assert_eq!(Some(root.path().join("direct.jpg")), found);
}

#[tokio::test]
async fn preview_skips_empty_candidates_and_descends() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("broken.jpg"), b"");
    write_file(&root.path().join("sub/good.png"), b"px");

    let (events, mut receiver, cancellation) = sink(TaskKind::FindPreview);
    find_preview(root.path(), &cancellation, &events)
        .await
        .unwrap();

    let messages = drain(&mut receiver);
    let found = messages.iter().find_map(|message| match message {
        Message::PreviewFound(_, image) => Some(image.clone()),
        _ => None,
    });

    assert_eq!(Some(root.path().join("sub/good.png")), found);
    assert!(messages.iter().any(|message| matches!(
        message,
        Message::Progress(text) if text.starts_with("Skipping inaccessible image")
    )));
}

#[tokio::test]
async fn preview_gives_up_below_depth_three() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("a/b/c/too_deep.png"), b"px");

    let (events, mut receiver, cancellation) = sink(TaskKind::FindPreview);
    find_preview(root.path(), &cancellation, &events)
        .await
        .unwrap();

    let messages = drain(&mut receiver);
    assert!(!messages
        .iter()
        .any(|message| matches!(message, Message::PreviewFound(_, _))));
    assert!(messages.iter().any(|message| matches!(
        message,
        Message::Progress(text) if text.starts_with("No preview image found")
    )));
}

#[tokio::test]
async fn preview_pool_is_bounded_and_drains_fifo() {
    let root = tempfile::tempdir().unwrap();
    let mut folders = Vec::new();
    for index in 0..5 {
        let folder = root.path().join(format!("folder{}", index));
        write_file(&folder.join("cover.jpg"), b"px");
        folders.push(folder);
    }

    let (sender, mut receiver) = mpsc::channel(256);
    let mut tasks = TaskManager::new(sender);

    for folder in folders {
        tasks.request_preview(folder);
    }

    assert_eq!(PREVIEW_POOL_SIZE, tasks.running_previews());
    assert_eq!(3, tasks.waiting_previews());

    let mut finished = 0;
    while finished < 5 {
        let envelope = receiver.recv().await.unwrap();
        for message in envelope.messages {
            if let Message::TaskFinished(TaskKind::FindPreview, success) = message {
                assert!(success);
                finished += 1;
                tasks.preview_finished(envelope.task);
            }
        }

        assert!(tasks.running_previews() <= PREVIEW_POOL_SIZE);
    }

    assert_eq!(0, tasks.running_previews());
    assert_eq!(0, tasks.waiting_previews());
}

#[tokio::test]
async fn duplicate_preview_requests_are_ignored() {
    let root = tempfile::tempdir().unwrap();
    let folder = root.path().join("folder");
    write_file(&folder.join("cover.jpg"), b"px");

    let (sender, _receiver) = mpsc::channel(256);
    let mut tasks = TaskManager::new(sender);

    tasks.request_preview(folder.clone());
    tasks.request_preview(folder.clone());
    tasks.request_preview(folder);

    assert_eq!(1, tasks.running_previews());
    assert_eq!(0, tasks.waiting_previews());

    tasks.shutdown().await;
}

async fn drive_until_idle(session: &mut Session) {
    while !session.is_idle() {
        let envelope = session
            .next_envelope()
            .await
            .expect("notification channel closed");
        session.handle(envelope).await;
    }
}

#[tokio::test]
async fn session_populates_merges_and_refreshes() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("x/IMG_1.jpg"), b"one");
    write_file(&root.path().join("x/IMG_2.jpg"), b"two");
    write_file(&root.path().join("x/IMG_3.jpg"), b"three");
    write_file(&root.path().join("y/IMG_1.jpg"), b"collision");
    write_file(&root.path().join("y/IMG_9.jpg"), b"nine");

    let mut session = Session::new(Settings::default());
    session.select_root(root.path().to_path_buf()).await.unwrap();
    drive_until_idle(&mut session).await;

    let names: Vec<_> = session
        .catalog
        .entries()
        .iter()
        .map(|entry| entry.display_name.clone())
        .collect();
    assert_eq!(vec!["x".to_string(), "y".to_string()], names);
    assert!(session
        .catalog
        .entries()
        .iter()
        .all(|entry| entry.preview.is_some()));

    session.catalog.set_checked(&root.path().join("x"), true);
    session.catalog.set_checked(&root.path().join("y"), true);
    session.merge_checked().await.unwrap();
    drive_until_idle(&mut session).await;

    let target = root.path().join("x_merged");
    assert!(target.is_dir());
    assert_eq!(5, fs::read_dir(&target).unwrap().count());
    assert!(target.join("IMG_1_1.jpg").is_file());
    assert!(!root.path().join("x").exists());
    assert!(!root.path().join("y").exists());

    let names: Vec<_> = session
        .catalog
        .entries()
        .iter()
        .map(|entry| entry.display_name.clone())
        .collect();
    assert_eq!(vec!["x_merged".to_string()], names);

    session.shutdown().await;
}

#[tokio::test]
async fn session_refuses_conflicting_merge_target() {
    let root = tempfile::tempdir().unwrap();
    write_file(&root.path().join("pics/a.jpg"), b"a");
    write_file(&root.path().join("pics_merged/b.jpg"), b"b");

    let mut session = Session::new(Settings::default());
    session.select_root(root.path().to_path_buf()).await.unwrap();
    drive_until_idle(&mut session).await;

    session.catalog.set_checked(&root.path().join("pics"), true);
    session
        .catalog
        .set_checked(&root.path().join("pics_merged"), true);

    let result = session.merge_checked().await;

    assert!(matches!(result, Err(AppError::MergeConflict(_))));
    assert!(root.path().join("pics/a.jpg").is_file());
    assert!(root.path().join("pics_merged/b.jpg").is_file());

    session.shutdown().await;
}

#[tokio::test]
async fn stale_notifications_are_dropped() {
    let mut session = Session::new(Settings::default());

    let stale = Envelope {
        task: TaskId(999),
        kind: TaskKind::ListSubfolders,
        messages: vec![Message::SubfoldersFound(vec![PathBuf::from("/nowhere")])],
    };

    let applied = session.handle(stale).await;

    assert!(applied.is_empty());
    assert!(session.catalog.entries().is_empty());
}
