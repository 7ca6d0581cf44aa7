use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Task was cancelled")]
    Cancelled,
    #[error("Deleting directory {0:?} failed: {1}")]
    DeleteFailed(PathBuf, std::io::Error),
    #[error("File operation failed")]
    FileOperationFailed(#[from] std::io::Error),
    #[error("Target folder name '{0}' conflicts with a selected source folder")]
    MergeConflict(String),
    #[error("Moving {0:?} failed: {1}")]
    MoveFailed(PathBuf, std::io::Error),
    #[error("No source folders selected")]
    NoSourcesSelected,
    #[error("Could not generate unique name for '{0}' in target")]
    NoUniqueNameFound(String),
    #[error("{0:?} is not a valid directory")]
    NotADirectory(PathBuf),
    #[error("Merge target folder {0:?} does not exist")]
    TargetMissing(PathBuf),
    #[error("Unexpected task failure: {0}")]
    Unexpected(String),
}
