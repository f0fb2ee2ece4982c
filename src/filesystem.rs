//! Filesystem access rooted at the game install directory.
//!
//! All paths handed to a [`FileSystem`] are install-root-relative
//! destinations as stored on mod nodes. [`LocalFs`] maps them onto the real
//! disk, falling back to a case-insensitive lookup so catalogs written on a
//! case-insensitive host keep matching.

use crate::paths;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Filesystem failures, recorded per node by the reconciler and executor.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("{op} failed for {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Directory is not empty: {}", .0.display())]
    DirectoryNotEmpty(PathBuf),

    #[error("Path escapes the install root: {0}")]
    OutsideRoot(String),
}

impl FsError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        FsError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// A single directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Operations the engine needs from the install tree.
pub trait FileSystem: Send + Sync {
    /// The install root all relative paths are resolved against.
    fn root(&self) -> &Path;

    /// Absolute location of a relative destination.
    fn absolute(&self, relative: &str) -> Result<PathBuf, FsError>;

    /// Whether a file or directory exists at the destination.
    fn exists(&self, relative: &str) -> Result<bool, FsError>;

    /// Entries directly inside a directory.
    fn list_entries(&self, relative: &str) -> Result<Vec<DirEntry>, FsError>;

    /// Copy a file from an absolute source path to a destination.
    fn copy_file(&self, source: &Path, relative: &str) -> Result<(), FsError>;

    /// Write bytes to a destination, creating parent directories.
    fn write_file(&self, relative: &str, data: &mut dyn io::Read) -> Result<u64, FsError>;

    fn delete_file(&self, relative: &str) -> Result<(), FsError>;

    /// Remove a directory that has no entries left.
    fn delete_empty_dir(&self, relative: &str) -> Result<(), FsError>;

    /// Create a directory and any missing parents.
    fn create_dir(&self, relative: &str) -> Result<(), FsError>;
}

/// The real filesystem below an install root.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an existing entry case-insensitively, or fall back to the
    /// literal joined path for entries that are about to be created.
    fn locate(&self, relative: &str) -> Result<PathBuf, FsError> {
        if !paths::is_contained(relative) {
            return Err(FsError::OutsideRoot(relative.to_string()));
        }
        let literal = self.root.join(paths::clean_relative(relative));
        if literal.exists() {
            return Ok(literal);
        }
        Ok(paths::resolve_case_insensitive(&self.root, relative).unwrap_or(literal))
    }
}

impl FileSystem for LocalFs {
    fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, relative: &str) -> Result<PathBuf, FsError> {
        self.locate(relative)
    }

    fn exists(&self, relative: &str) -> Result<bool, FsError> {
        let path = self.locate(relative)?;
        path.try_exists().map_err(|e| FsError::io("probe", path, e))
    }

    fn list_entries(&self, relative: &str) -> Result<Vec<DirEntry>, FsError> {
        let dir = self.locate(relative)?;
        let read_dir = fs::read_dir(&dir).map_err(|e| FsError::io("list", &dir, e))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| FsError::io("list", &dir, e))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| FsError::io("stat", entry.path(), e))?
                .is_dir();
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn copy_file(&self, source: &Path, relative: &str) -> Result<(), FsError> {
        let target = self.locate(relative)?;
        paths::ensure_parent_dirs(&target).map_err(|e| FsError::io("create parent", &target, e))?;
        if target.exists() {
            fs::remove_file(&target).map_err(|e| FsError::io("replace", &target, e))?;
        }
        reflink_copy::reflink_or_copy(source, &target)
            .map_err(|e| FsError::io("copy", &target, e))?;
        Ok(())
    }

    fn write_file(&self, relative: &str, data: &mut dyn io::Read) -> Result<u64, FsError> {
        let target = self.locate(relative)?;
        paths::ensure_parent_dirs(&target).map_err(|e| FsError::io("create parent", &target, e))?;
        let mut file = fs::File::create(&target).map_err(|e| FsError::io("create", &target, e))?;
        io::copy(data, &mut file).map_err(|e| FsError::io("write", &target, e))
    }

    fn delete_file(&self, relative: &str) -> Result<(), FsError> {
        let target = self.locate(relative)?;
        fs::remove_file(&target).map_err(|e| FsError::io("delete", target, e))
    }

    fn delete_empty_dir(&self, relative: &str) -> Result<(), FsError> {
        let target = self.locate(relative)?;
        let is_empty = fs::read_dir(&target)
            .map_err(|e| FsError::io("list", &target, e))?
            .next()
            .is_none();
        if !is_empty {
            return Err(FsError::DirectoryNotEmpty(target));
        }
        fs::remove_dir(&target).map_err(|e| FsError::io("remove dir", target, e))
    }

    fn create_dir(&self, relative: &str) -> Result<(), FsError> {
        let target = self.locate(relative)?;
        fs::create_dir_all(&target).map_err(|e| FsError::io("create dir", target, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_exists_case_insensitive() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("GameData/MyMod")).unwrap();
        let lfs = LocalFs::new(temp.path());

        assert!(lfs.exists("GameData/MyMod").unwrap());
        assert!(lfs.exists("gamedata\\mymod").unwrap());
        assert!(!lfs.exists("GameData/Other").unwrap());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let temp = tempdir().unwrap();
        let lfs = LocalFs::new(temp.path());
        assert!(matches!(lfs.exists("../etc"), Err(FsError::OutsideRoot(_))));
    }

    #[test]
    fn test_write_and_delete_file() {
        let temp = tempdir().unwrap();
        let lfs = LocalFs::new(temp.path());

        let written = lfs
            .write_file("GameData/MyMod/a.cfg", &mut &b"hello"[..])
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(fs::read(temp.path().join("GameData/MyMod/a.cfg")).unwrap(), b"hello");

        lfs.delete_file("GameData/MyMod/a.cfg").unwrap();
        assert!(!temp.path().join("GameData/MyMod/a.cfg").exists());
    }

    #[test]
    fn test_delete_empty_dir_refuses_content() {
        let temp = tempdir().unwrap();
        let lfs = LocalFs::new(temp.path());
        lfs.create_dir("GameData/MyMod").unwrap();
        fs::write(temp.path().join("GameData/MyMod/keep.txt"), "x").unwrap();

        assert!(matches!(
            lfs.delete_empty_dir("GameData/MyMod"),
            Err(FsError::DirectoryNotEmpty(_))
        ));

        fs::remove_file(temp.path().join("GameData/MyMod/keep.txt")).unwrap();
        lfs.delete_empty_dir("GameData/MyMod").unwrap();
        assert!(!temp.path().join("GameData/MyMod").exists());
    }

    #[test]
    fn test_list_entries_sorted() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("GameData/B")).unwrap();
        fs::write(temp.path().join("GameData/a.txt"), "x").unwrap();
        let lfs = LocalFs::new(temp.path());

        let entries = lfs.list_entries("GameData").unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry { name: "B".into(), is_dir: true },
                DirEntry { name: "a.txt".into(), is_dir: false },
            ]
        );
    }

    #[test]
    fn test_copy_file_overwrites() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src.txt");
        fs::write(&src, "new").unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("GameData")).unwrap();
        fs::write(root.join("GameData/dst.txt"), "old").unwrap();

        let lfs = LocalFs::new(&root);
        lfs.copy_file(&src, "GameData/dst.txt").unwrap();
        assert_eq!(fs::read_to_string(root.join("GameData/dst.txt")).unwrap(), "new");
    }
}
