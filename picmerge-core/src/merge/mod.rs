use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::{catalog::display_name, error::AppError, event::EventSink};

mod unique;

pub use unique::unique_target_path;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MergeOutcome {
    pub moved: usize,
    pub skipped: usize,
    pub deleted_source_dirs: usize,
    pub processed_sources: Vec<PathBuf>,
    pub cancelled: bool,
}

impl MergeOutcome {
    /// A merge only counts as successful when nothing was skipped; silent
    /// partial merges must stay visible to the caller.
    pub fn is_success(&self) -> bool {
        self.skipped == 0
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MergePlan {
    pub sources: Vec<PathBuf>,
    pub target: PathBuf,
}

/// Determines the target folder for merging the given sources below `root`:
/// `<first checked name sorted ascending>_merged`, or `<name>1` when that
/// name already contains `_merged`. Refuses when the computed target is one
/// of the sources.
pub fn plan_merge(root: &Path, sources: &[PathBuf]) -> Result<MergePlan, AppError> {
    let mut names: Vec<String> = sources.iter().map(|source| display_name(source)).collect();
    names.sort();

    let first = names.first().ok_or(AppError::NoSourcesSelected)?;
    let target_name = if first.to_lowercase().contains("_merged") {
        format!("{}1", first)
    } else {
        format!("{}_merged", first)
    };

    let target = root.join(&target_name);
    if sources.iter().any(|source| source == &target) {
        return Err(AppError::MergeConflict(target_name));
    }

    Ok(MergePlan {
        sources: sources.to_vec(),
        target,
    })
}

/// Moves every file below every source folder into the target folder,
/// resolving name collisions and recovering per file failures, then prunes
/// emptied source trees bottom up. The target must already exist.
#[tracing::instrument(skip(sources, cancellation, events))]
pub async fn merge(
    sources: &[PathBuf],
    target: &Path,
    delete_empty_sources: bool,
    cancellation: &CancellationToken,
    events: &EventSink,
) -> Result<MergeOutcome, AppError> {
    if !target.exists() {
        return Err(AppError::TargetMissing(target.to_path_buf()));
    }

    events
        .progress(format!(
            "Starting merge into target: {}",
            display_name(target)
        ))
        .await;

    let mut outcome = MergeOutcome::default();
    for source in sources {
        if cancellation.is_cancelled() {
            events
                .progress("Merge cancelled during source folder processing.".to_string())
                .await;
            outcome.cancelled = true;
            return Ok(outcome);
        }

        if !source.is_dir() {
            events
                .error(format!(
                    "Source '{}' is not a valid directory. Skipping.",
                    display_name(source)
                ))
                .await;
            outcome.skipped += 1;
            continue;
        }

        events
            .progress(format!("Processing source: {}...", display_name(source)))
            .await;

        let files: Vec<PathBuf> = WalkDir::new(source)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        for file in files {
            if cancellation.is_cancelled() {
                events
                    .progress("Merge cancelled during file processing.".to_string())
                    .await;
                outcome.cancelled = true;
                return Ok(outcome);
            }

            let file_name = display_name(&file);
            let resolved = match unique_target_path(&file_name, target) {
                Ok(resolved) => resolved,
                Err(error) => {
                    events.error(format!("{}. Skipping.", error)).await;
                    outcome.skipped += 1;
                    continue;
                }
            };

            match move_file(&file, &resolved).await {
                Ok(()) => {
                    events
                        .progress(format!(
                            "Moved: {} -> {} (into {})",
                            file_name,
                            display_name(&resolved),
                            display_name(target)
                        ))
                        .await;
                    outcome.moved += 1;
                }
                Err(cause) => {
                    let error = AppError::MoveFailed(file.clone(), cause);
                    events.error(error.to_string()).await;
                    outcome.skipped += 1;
                }
            }
        }

        outcome.processed_sources.push(source.clone());
    }

    if delete_empty_sources {
        events
            .progress("Checking source folders for deletion...".to_string())
            .await;
        prune_sources(&mut outcome, cancellation, events).await;
    }

    if outcome.skipped > 0 {
        events
            .progress(format!(
                "Merge partially complete. Moved {} files, skipped {} due to errors/naming conflicts. \
                 Processed {} sources, deleted {} empty source folders.",
                outcome.moved,
                outcome.skipped,
                outcome.processed_sources.len(),
                outcome.deleted_source_dirs
            ))
            .await;
    } else {
        events
            .progress(format!(
                "Merge complete. Moved {} files. Processed {} sources, deleted {} empty source folders.",
                outcome.moved,
                outcome.processed_sources.len(),
                outcome.deleted_source_dirs
            ))
            .await;
    }

    Ok(outcome)
}

/// Deletes every directory in the processed source trees that holds neither
/// files nor non empty subdirectories, deepest first, the source root
/// included. Failures are logged and non fatal.
async fn prune_sources(
    outcome: &mut MergeOutcome,
    cancellation: &CancellationToken,
    events: &EventSink,
) {
    for source in outcome.processed_sources.clone() {
        if cancellation.is_cancelled() {
            outcome.cancelled = true;
            return;
        }

        let directories = WalkDir::new(&source)
            .contents_first(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir());

        for entry in directories {
            if cancellation.is_cancelled() {
                outcome.cancelled = true;
                return;
            }

            let dir = entry.path();
            if !is_empty_dir(dir) {
                continue;
            }

            match tokio::fs::remove_dir(dir).await {
                Ok(()) => {
                    events
                        .progress(format!("Deleted empty directory: {}", dir.display()))
                        .await;
                    if dir == source {
                        outcome.deleted_source_dirs += 1;
                    }
                }
                Err(cause) => {
                    let error = AppError::DeleteFailed(dir.to_path_buf(), cause);
                    tracing::warn!("{}", error);
                    events
                        .progress(format!("Could not delete dir {}: {}", display_name(dir), error))
                        .await;
                }
            }
        }
    }
}

async fn move_file(source: &Path, target: &Path) -> Result<(), std::io::Error> {
    match tokio::fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(_) => {
            // rename does not cross devices; fall back to copy and remove
            tokio::fs::copy(source, target).await?;
            tokio::fs::remove_file(source).await
        }
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => false,
    }
}
