use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::{catalog::display_name, error::AppError, event::EventSink};

pub const SUPPORTED_IMAGE_EXTENSIONS: [&str; 9] = [
    "png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp", "heic",
];

const BATCH_SIZE: usize = 50;
const PREVIEW_MAX_DEPTH: usize = 3;

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            SUPPORTED_IMAGE_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(extension))
        })
        .unwrap_or(false)
}

/// Walks the folder recursively and emits every image path in batches. Not
/// restartable: cancellation mid walk leaves already emitted batches behind.
#[tracing::instrument(skip(cancellation, events))]
pub async fn scan_images(
    folder: &Path,
    cancellation: &CancellationToken,
    events: &EventSink,
) -> Result<(), AppError> {
    if !folder.is_dir() {
        return Err(AppError::NotADirectory(folder.to_path_buf()));
    }

    events
        .progress(format!("Scanning '{}' for images...", display_name(folder)))
        .await;

    let mut batch = Vec::new();
    let mut count: usize = 0;
    for entry in WalkDir::new(folder) {
        if cancellation.is_cancelled() {
            events.progress("Scan cancelled.".to_string()).await;
            return Err(AppError::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!("skipping unreadable entry: {:?}", error);
                continue;
            }
        };

        if entry.file_type().is_file() && is_image(entry.path()) {
            batch.push(entry.into_path());
            count += 1;

            if batch.len() >= BATCH_SIZE {
                events.image_batch(std::mem::take(&mut batch)).await;
            }
        }
    }

    if !batch.is_empty() {
        events.image_batch(batch).await;
    }

    events
        .progress(format!(
            "Scan of '{}' complete. Found {} images.",
            display_name(folder),
            count
        ))
        .await;

    Ok(())
}

/// Searches direct children first, then exactly one and two levels deep, for
/// the first readable, non empty image to represent the folder.
#[tracing::instrument(skip(cancellation, events))]
pub async fn find_preview(
    folder: &Path,
    cancellation: &CancellationToken,
    events: &EventSink,
) -> Result<(), AppError> {
    if !folder.is_dir() {
        return Err(AppError::NotADirectory(folder.to_path_buf()));
    }

    events
        .progress(format!(
            "Finding preview image for '{}'...",
            display_name(folder)
        ))
        .await;

    for depth in 1..=PREVIEW_MAX_DEPTH {
        let walker = WalkDir::new(folder).min_depth(depth).max_depth(depth);
        for entry in walker.into_iter().filter_map(|entry| entry.ok()) {
            if cancellation.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            if !entry.file_type().is_file() || !is_image(entry.path()) {
                continue;
            }

            match probe_candidate(entry.path()) {
                Ok(true) => {
                    events
                        .preview_found(folder.to_path_buf(), entry.into_path())
                        .await;
                    return Ok(());
                }
                Ok(false) | Err(_) => {
                    tracing::warn!("skipping inaccessible image: {:?}", entry.path());
                    events
                        .progress(format!(
                            "Skipping inaccessible image: {}",
                            display_name(entry.path())
                        ))
                        .await;
                }
            }
        }
    }

    events
        .progress(format!(
            "No preview image found for '{}'",
            display_name(folder)
        ))
        .await;

    Ok(())
}

/// Lists immediate subdirectories of the folder, non recursive.
#[tracing::instrument(skip(cancellation, events))]
pub async fn list_subdirs(
    folder: &Path,
    cancellation: &CancellationToken,
    events: &EventSink,
) -> Result<(), AppError> {
    if !folder.is_dir() {
        return Err(AppError::NotADirectory(folder.to_path_buf()));
    }

    let mut subdirs: Vec<PathBuf> = Vec::new();
    let mut read_dir = tokio::fs::read_dir(folder).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        if cancellation.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(error) => {
                tracing::warn!("skipping unreadable entry: {:?}", error);
                continue;
            }
        };

        if file_type.is_dir() {
            subdirs.push(entry.path());
        }
    }

    events
        .progress(format!("Found {} subfolders.", subdirs.len()))
        .await;
    events.subfolders_found(subdirs).await;

    Ok(())
}

fn probe_candidate(path: &Path) -> Result<bool, std::io::Error> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() == 0 {
        return Ok(false);
    }

    std::fs::File::open(path)?;

    Ok(true)
}
