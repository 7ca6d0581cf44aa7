use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

mod sort;

pub use sort::SortMode;

pub(crate) fn display_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => path.display().to_string(),
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FolderEntry {
    pub path: PathBuf,
    pub display_name: String,
    pub checked: bool,
    pub preview: Option<PathBuf>,
}

/// Authoritative in memory list of the current root's subfolders plus the
/// preview image cache. Mutated only by the single threaded orchestrating
/// layer; background tasks never see it.
#[derive(Debug, Default)]
pub struct FolderCatalog {
    root: Option<PathBuf>,
    entries: Vec<FolderEntry>,
    preview_cache: HashMap<PathBuf, PathBuf>,
    sort_mode: SortMode,
    selected: Option<PathBuf>,
}

impl FolderCatalog {
    /// Selecting a different root clears all carried state; re-selecting the
    /// current root keeps it for the following refresh.
    pub fn set_root(&mut self, root: PathBuf) {
        if self.root.as_deref() != Some(root.as_path()) {
            self.entries.clear();
            self.preview_cache.clear();
            self.selected = None;
        }

        self.root = Some(root);
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn entries(&self) -> &[FolderEntry] {
        &self.entries
    }

    /// Replaces the entry list with freshly listed subdirectories. Checked
    /// state carries over by folder name; cached previews carry over by
    /// folder name after re-validation against disk. Returns the folders
    /// still lacking a valid preview, in display order.
    pub fn rebuild(&mut self, subdirs: Vec<PathBuf>) -> Vec<PathBuf> {
        let checked_names: HashSet<String> = self
            .entries
            .iter()
            .filter(|entry| entry.checked)
            .map(|entry| entry.display_name.clone())
            .collect();

        let cached_by_name: HashMap<String, PathBuf> = self
            .preview_cache
            .iter()
            .map(|(folder, image)| (display_name(folder), image.clone()))
            .collect();

        let mut cache = HashMap::new();
        let mut entries = Vec::new();
        for subdir in subdirs {
            let name = display_name(&subdir);
            let preview = cached_by_name
                .get(&name)
                .filter(|image| is_valid_preview(image))
                .cloned();

            if let Some(image) = &preview {
                cache.insert(subdir.clone(), image.clone());
            }

            entries.push(FolderEntry {
                checked: checked_names.contains(&name),
                display_name: name,
                path: subdir,
                preview,
            });
        }

        self.entries = entries;
        self.preview_cache = cache;
        self.sort_entries();

        self.entries
            .iter()
            .filter(|entry| entry.preview.is_none())
            .map(|entry| entry.path.clone())
            .collect()
    }

    pub fn set_checked(&mut self, path: &Path, checked: bool) -> bool {
        match self.entries.iter_mut().find(|entry| entry.path == path) {
            Some(entry) => {
                entry.checked = checked;
                true
            }
            None => false,
        }
    }

    pub fn set_checked_by_name(&mut self, name: &str, checked: bool) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.display_name == name)
        {
            Some(entry) => {
                entry.checked = checked;
                true
            }
            None => false,
        }
    }

    pub fn checked_entries(&self) -> Vec<&FolderEntry> {
        self.entries.iter().filter(|entry| entry.checked).collect()
    }

    pub fn record_preview(&mut self, folder: PathBuf, image: PathBuf) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.path == folder) {
            entry.preview = Some(image.clone());
        }

        self.preview_cache.insert(folder, image);
    }

    /// Returns the cached preview for the folder, re-validated against disk
    /// at use time. A stale entry is dropped and None returned.
    pub fn cached_preview(&mut self, folder: &Path) -> Option<PathBuf> {
        let image = self.preview_cache.get(folder)?;
        if is_valid_preview(image) {
            return Some(image.clone());
        }

        tracing::debug!("dropping stale preview cache entry for {:?}", folder);
        self.preview_cache.remove(folder);
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.path == folder) {
            entry.preview = None;
        }

        None
    }

    pub fn selected(&self) -> Option<&Path> {
        self.selected.as_deref()
    }

    pub fn set_selected(&mut self, path: Option<PathBuf>) {
        self.selected = path;
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.sort_mode = mode;
        self.sort_entries();
    }

    /// Flips between natural and alphabetical ordering and re-sorts in
    /// place. Checked state and the current selection ride along with their
    /// entries.
    pub fn toggle_sort(&mut self) -> SortMode {
        self.set_sort_mode(self.sort_mode.toggled());
        self.sort_mode
    }

    fn sort_entries(&mut self) {
        let mode = self.sort_mode;
        self.entries
            .sort_by(|left, right| sort::compare(mode, &left.display_name, &right.display_name));
    }
}

fn is_valid_preview(image: &Path) -> bool {
    match std::fs::metadata(image) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => {
            std::fs::File::open(image).is_ok()
        }
        _ => false,
    }
}
