use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::error::AppError;

const MAX_COUNTER: u32 = 1000;

/// Resolves a destination path for `file_name` inside `target_dir` that does
/// not collide with an existing entry. Pure function of the target
/// directory's current contents; the counter only advances for names that
/// actually exist on disk.
pub fn unique_target_path(file_name: &str, target_dir: &Path) -> Result<PathBuf, AppError> {
    let candidate = target_dir.join(file_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let (stem, extension) = split_file_name(file_name);
    for counter in 1..=MAX_COUNTER {
        let candidate = target_dir.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();

    let candidate = target_dir.join(format!("{}_{}{}", stem, millis, extension));
    if candidate.exists() {
        return Err(AppError::NoUniqueNameFound(file_name.to_string()));
    }

    Ok(candidate)
}

fn split_file_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(index) if index > 0 => file_name.split_at(index),
        _ => (file_name, ""),
    }
}
