//! ZIP archives as mod sources (zip crate).

use super::{ArchiveEntry, ArchiveReader};
use crate::filesystem::FileSystem;
use crate::paths;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::ZipArchive;

/// An opened ZIP archive with a case-insensitive entry lookup.
pub struct ZipSource {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    lookup: HashMap<String, usize>,
}

impl ZipSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open ZIP: {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut archive = ZipArchive::new(reader)
            .with_context(|| format!("Failed to read ZIP: {}", path.display()))?;

        let mut lookup = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            lookup.insert(paths::normalize_for_lookup(file.name()), i);
        }

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            lookup,
        })
    }
}

impl ArchiveReader for ZipSource {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for i in 0..self.archive.len() {
            let file = self.archive.by_index_raw(i)?;
            let name = paths::clean_relative(file.name());
            if name.is_empty() {
                continue;
            }
            if !paths::is_contained(&name) {
                warn!("Skipping unsafe entry '{}' in {}", file.name(), self.path.display());
                continue;
            }
            entries.push(ArchiveEntry {
                path: name,
                size: file.size(),
                is_dir: file.is_dir(),
            });
        }
        Ok(entries)
    }

    fn extract_to(&mut self, entry: &str, fs: &dyn FileSystem, destination: &str) -> Result<u64> {
        let Some(&index) = self.lookup.get(&paths::normalize_for_lookup(entry)) else {
            bail!(
                "File '{}' not found in ZIP archive '{}'",
                entry,
                self.path.display()
            );
        };
        let mut file = self.archive.by_index(index)?;
        let written = fs.write_file(destination, &mut file)?;
        Ok(written)
    }
}
