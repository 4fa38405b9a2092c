use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::builtin;

/// Where a catalog entry's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    Builtin,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub origin: ImageOrigin,
    /// Failing to load a mandatory entry is fatal.
    pub mandatory: bool,
}

impl CatalogEntry {
    pub fn builtin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            origin: ImageOrigin::Builtin,
            mandatory: false,
        }
    }

    pub fn file(path: PathBuf, mandatory: bool) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            origin: ImageOrigin::File(path),
            mandatory,
        }
    }

    /// Same pixels source, regardless of the mandatory flag. Names alone are
    /// ambiguous: a discovered file may share a built-in scene's name.
    pub fn same_image(&self, other: &CatalogEntry) -> bool {
        self.origin == other.origin && self.name == other.name
    }
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Files in `folder` (not its subfolders) with `extension`, in natural name order.
pub fn discover(folder: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && has_extension(path, extension))
        .collect();

    files.sort_by(|a, b| {
        let a_name = a
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let b_name = b
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        natord::compare(&a_name, &b_name)
    });
    files
}

/// Ordered, selectable list of source images.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    selected: usize,
}

impl Catalog {
    /// Only the compiled-in scenes.
    pub fn builtin() -> Self {
        Self {
            entries: builtin::SCENES.iter().map(|scene| CatalogEntry::builtin(scene.name)).collect(),
            selected: 0,
        }
    }

    /// Compiled-in scenes followed by the images found in `folder`.
    pub fn with_folder(folder: &Path, extension: &str) -> Self {
        let mut catalog = Self::builtin();
        let found = discover(folder, extension);
        tracing::debug!(folder = %folder.display(), count = found.len(), "discovered images");
        catalog
            .entries
            .extend(found.into_iter().map(|path| CatalogEntry::file(path, false)));
        catalog
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries, selected: 0 }
    }

    /// Appends a file and selects it.
    pub fn push_file(&mut self, path: PathBuf, mandatory: bool) -> usize {
        self.entries.push(CatalogEntry::file(path, mandatory));
        self.selected = self.entries.len() - 1;
        self.selected
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&CatalogEntry> {
        self.entries.get(self.selected)
    }

    /// First entry displayed as `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    pub fn position_of(&self, target: &CatalogEntry) -> Option<usize> {
        self.entries.iter().position(|entry| entry.same_image(target))
    }

    /// Selects `index`, clamped to the catalog. Returns true if the selection changed.
    pub fn select(&mut self, index: usize) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let index = index.min(self.entries.len() - 1);
        let changed = index != self.selected;
        self.selected = index;
        changed
    }

    pub fn select_previous(&mut self) -> bool {
        self.select(self.selected.saturating_sub(1))
    }

    pub fn select_next(&mut self) -> bool {
        self.select(self.selected.saturating_add(1))
    }

    /// Removes the entry at `index`, keeping the selection on the same entry
    /// when possible and clamped otherwise.
    pub fn remove(&mut self, index: usize) -> Option<CatalogEntry> {
        if index >= self.entries.len() {
            return None;
        }
        let entry = self.entries.remove(index);
        if index < self.selected {
            self.selected -= 1;
        }
        self.selected = self.selected.min(self.entries.len().saturating_sub(1));
        Some(entry)
    }
}
