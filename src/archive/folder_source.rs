//! Unpacked mod folders as mod sources.

use super::{ArchiveEntry, ArchiveReader};
use crate::filesystem::FileSystem;
use crate::paths;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A directory on disk read as if it were an archive.
pub struct FolderSource {
    root: PathBuf,
}

impl FolderSource {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("Not a directory: {}", root.display());
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

impl ArchiveReader for FolderSource {
    fn source_path(&self) -> &Path {
        &self.root
    }

    fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", self.root.display()))?;
            let Some(path) = paths::relative_to(&self.root, entry.path()) else {
                continue;
            };
            let is_dir = entry.file_type().is_dir();
            let size = if is_dir {
                0
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            };
            entries.push(ArchiveEntry { path, size, is_dir });
        }
        Ok(entries)
    }

    fn extract_to(&mut self, entry: &str, fs: &dyn FileSystem, destination: &str) -> Result<u64> {
        if !paths::is_contained(entry) {
            bail!("Entry '{}' escapes {}", entry, self.root.display());
        }
        let source = paths::resolve_case_insensitive(&self.root, entry)
            .with_context(|| format!("File '{}' not found in {}", entry, self.root.display()))?;
        let size = std::fs::metadata(&source)
            .with_context(|| format!("Failed to stat {}", source.display()))?
            .len();
        fs.copy_file(&source, destination)?;
        Ok(size)
    }
}
