//! Game install layout: which directories belong to the game itself.
//!
//! Folder nodes are reconciled differently depending on where they land:
//! - A recognized game directory (GameData, Ships/VAB, ...) only counts as
//!   installed when it exists *and* holds at least one installed child.
//! - Any other directory counts as installed when it exists or holds an
//!   installed child.

mod patterns;

pub use patterns::{is_scan_ignored, placement_for, GAME_DIRECTORIES};

use crate::paths;
use std::collections::HashSet;
use std::path::Path;

/// Classification of an absolute directory path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirClass {
    /// One of the game's own top-level data directories.
    RecognizedGameDir,
    /// Any other directory (usually a mod's own folder).
    ArbitraryDir,
}

impl DirClass {
    /// Returns true for recognized game directories.
    pub fn is_recognized(&self) -> bool {
        matches!(self, DirClass::RecognizedGameDir)
    }
}

/// The set of recognized game directories for one install root.
#[derive(Debug, Clone)]
pub struct GameLayout {
    recognized: HashSet<String>,
}

impl Default for GameLayout {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

impl GameLayout {
    /// Creates a layout from the stock directory table plus `extra` relative
    /// directories from the settings.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let recognized = GAME_DIRECTORIES
            .iter()
            .map(|dir| paths::normalize_for_lookup(dir))
            .chain(extra.into_iter().map(|dir| paths::normalize_for_lookup(dir.as_ref())))
            .collect();
        Self { recognized }
    }

    /// Classifies an absolute directory path below `root`.
    /// Paths outside the root are never recognized.
    pub fn classify_directory(&self, root: &Path, absolute: &Path) -> DirClass {
        match paths::relative_to(root, absolute) {
            Some(rel) => self.classify_relative(&rel),
            None => DirClass::ArbitraryDir,
        }
    }

    /// Classifies an install-root-relative directory.
    pub fn classify_relative(&self, relative: &str) -> DirClass {
        if self.recognized.contains(&paths::normalize_for_lookup(relative)) {
            DirClass::RecognizedGameDir
        } else {
            DirClass::ArbitraryDir
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_stock_dirs() {
        let layout = GameLayout::default();
        let root = Path::new("/games/ksp");
        assert_eq!(
            layout.classify_directory(root, &root.join("GameData")),
            DirClass::RecognizedGameDir
        );
        assert_eq!(
            layout.classify_directory(root, &root.join("Ships").join("VAB")),
            DirClass::RecognizedGameDir
        );
        assert_eq!(layout.classify_directory(root, root), DirClass::RecognizedGameDir);
        assert_eq!(
            layout.classify_directory(root, &root.join("GameData").join("MechJeb2")),
            DirClass::ArbitraryDir
        );
    }

    #[test]
    fn test_classify_case_insensitive() {
        let layout = GameLayout::default();
        assert!(layout.classify_relative("gamedata").is_recognized());
        assert!(layout.classify_relative("SHIPS\\sph").is_recognized());
    }

    #[test]
    fn test_classify_outside_root() {
        let layout = GameLayout::default();
        assert_eq!(
            layout.classify_directory(Path::new("/games/ksp"), Path::new("/tmp/GameData")),
            DirClass::ArbitraryDir
        );
    }

    #[test]
    fn test_extra_directories() {
        let layout = GameLayout::new(["GameData/Stock Overrides"]);
        assert!(layout.classify_relative("GameData/Stock Overrides").is_recognized());
        assert!(!GameLayout::default()
            .classify_relative("GameData/Stock Overrides")
            .is_recognized());
    }
}
