//! Mod sources: ZIP archives and unpacked folders.
//!
//! A source is read twice in a mod's life: once when the mod is added, to
//! seed its node tree from the entry list, and again by the install
//! executor, which extracts single entries to their destinations.

mod builder;
mod folder_source;
mod zip_source;

pub use builder::build_mod_subtree;
pub(crate) use builder::file_count;
pub use folder_source::FolderSource;
pub use zip_source::ZipSource;

use crate::filesystem::FileSystem;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Source type detected by magic bytes (or a directory).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    /// ZIP archive (PK signature)
    Zip,
    /// Unpacked directory
    Folder,
    /// Unknown/unsupported format
    Unknown,
}

/// Detect the source type of a path.
///
/// Uses magic bytes rather than the extension so renamed archives still
/// open.
pub fn detect_archive_type(path: &Path) -> Result<ArchiveType> {
    if path.is_dir() {
        return Ok(ArchiveType::Folder);
    }
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let mut magic = [0u8; 4];
    let bytes_read = file.read(&mut magic).unwrap_or(0);
    if bytes_read < 4 {
        return Ok(ArchiveType::Unknown);
    }

    // ZIP: PK\x03\x04 or PK\x05\x06 (empty)
    if &magic == b"PK\x03\x04" || &magic == b"PK\x05\x06" {
        return Ok(ArchiveType::Zip);
    }
    Ok(ArchiveType::Unknown)
}

/// Information about an entry in a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path within the source (forward slashes, case-preserved)
    pub path: String,
    /// Uncompressed size in bytes
    pub size: u64,
    pub is_dir: bool,
}

/// Read access to one mod source.
pub trait ArchiveReader: Send {
    fn source_path(&self) -> &Path;

    /// All entries, directories included.
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>>;

    /// Extract one entry (matched case-insensitively) to an
    /// install-root-relative destination. Returns bytes written.
    fn extract_to(&mut self, entry: &str, fs: &dyn FileSystem, destination: &str) -> Result<u64>;
}

/// Open a ZIP archive or folder.
pub fn open_archive(path: &Path) -> Result<Box<dyn ArchiveReader>> {
    match detect_archive_type(path)? {
        ArchiveType::Zip => Ok(Box::new(ZipSource::open(path)?)),
        ArchiveType::Folder => Ok(Box::new(FolderSource::open(path)?)),
        ArchiveType::Unknown => anyhow::bail!("Unsupported mod source: {}", path.display()),
    }
}

/// Maps a mod root key to an opened source.
pub trait SourceProvider: Send + Sync {
    fn open(&self, source: &str) -> Result<Box<dyn ArchiveReader>>;
}

/// Opens sources from disk. Relative keys resolve against `base` (the
/// download directory) when one is set.
#[derive(Debug, Clone, Default)]
pub struct ArchiveSources {
    base: Option<PathBuf>,
}

impl ArchiveSources {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    pub fn locate(&self, source: &str) -> PathBuf {
        let path = PathBuf::from(source);
        match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

impl SourceProvider for ArchiveSources {
    fn open(&self, source: &str) -> Result<Box<dyn ArchiveReader>> {
        open_archive(&self.locate(source))
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use anyhow::Result;
    use std::io::Write;
    use std::path::Path;

    /// Write a ZIP with the given `(name, content)` pairs. Names ending in
    /// `/` become directory entries.
    pub fn write_zip(path: &Path, files: &[(&str, &str)]) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in files {
            if name.ends_with('/') {
                zip.add_directory(*name, options)?;
            } else {
                zip.start_file(*name, options)?;
                zip.write_all(content.as_bytes())?;
            }
        }
        zip.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::write_zip;
    use super::*;
    use crate::filesystem::LocalFs;
    use tempfile::tempdir;

    #[test]
    fn test_detect_archive_type() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("renamed.bin");
        write_zip(&zip_path, &[("a.txt", "a")])?;
        std::fs::write(dir.path().join("notes.txt"), "plain text")?;

        assert_eq!(detect_archive_type(&zip_path)?, ArchiveType::Zip);
        assert_eq!(detect_archive_type(dir.path())?, ArchiveType::Folder);
        assert_eq!(detect_archive_type(&dir.path().join("notes.txt"))?, ArchiveType::Unknown);
        Ok(())
    }

    #[test]
    fn test_zip_entries_and_extract() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("mod.zip");
        write_zip(
            &zip_path,
            &[("GameData/", ""), ("GameData/Foo/part.cfg", "PART {}"), ("readme.txt", "hi")],
        )?;

        let mut source = open_archive(&zip_path)?;
        let entries = source.entries()?;
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().any(|e| e.path == "GameData" && e.is_dir));
        assert!(entries.iter().any(|e| e.path == "GameData/Foo/part.cfg" && !e.is_dir));

        let root = dir.path().join("ksp");
        std::fs::create_dir_all(&root)?;
        let lfs = LocalFs::new(&root);
        let written = source.extract_to("gamedata\\foo\\PART.cfg", &lfs, "GameData/Foo/part.cfg")?;
        assert_eq!(written, 7);
        assert_eq!(std::fs::read_to_string(root.join("GameData/Foo/part.cfg"))?, "PART {}");

        assert!(source.extract_to("missing.cfg", &lfs, "GameData/missing.cfg").is_err());
        Ok(())
    }

    #[test]
    fn test_folder_source() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("MyMod");
        std::fs::create_dir_all(src.join("GameData/MyMod"))?;
        std::fs::write(src.join("GameData/MyMod/a.cfg"), "abc")?;

        let mut source = open_archive(&src)?;
        let paths: Vec<_> = source.entries()?.into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["GameData", "GameData/MyMod", "GameData/MyMod/a.cfg"]);

        let root = dir.path().join("ksp");
        std::fs::create_dir_all(&root)?;
        let lfs = LocalFs::new(&root);
        assert_eq!(source.extract_to("GameData/MyMod/a.cfg", &lfs, "GameData/MyMod/a.cfg")?, 3);
        assert!(root.join("GameData/MyMod/a.cfg").exists());
        Ok(())
    }

    #[test]
    fn test_archive_sources_resolve_relative_keys() {
        let sources = ArchiveSources::new(Some(PathBuf::from("/downloads")));
        assert_eq!(sources.locate("mod.zip"), PathBuf::from("/downloads/mod.zip"));
        assert_eq!(sources.locate("/abs/mod.zip"), PathBuf::from("/abs/mod.zip"));
    }
}
