//! Settings management
//!
//! Stores user preferences in ~/.config/modkeeper/settings.json

use crate::update::UpdateBehavior;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Catalog file name used when none is configured.
pub const DEFAULT_CATALOG_NAME: &str = "ModCatalog.xml";

fn default_true() -> bool {
    true
}

/// User settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Game installation directory
    #[serde(default)]
    pub install_root: String,

    /// Catalog file (empty = ModCatalog.xml inside the install root)
    #[serde(default)]
    pub catalog_file: String,

    /// Where downloaded mod archives go
    #[serde(default)]
    pub download_path: String,

    /// Overwrite files that already exist at a destination
    #[serde(default)]
    pub override_existing: bool,

    #[serde(default)]
    pub update_behavior: UpdateBehavior,

    /// Print collisions before processing
    #[serde(default = "default_true")]
    pub warn_on_collisions: bool,

    /// Additional directories treated like the game's own (relative to the
    /// install root)
    #[serde(default)]
    pub extra_game_dirs: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            install_root: String::new(),
            catalog_file: String::new(),
            download_path: String::new(),
            override_existing: false,
            update_behavior: UpdateBehavior::default(),
            warn_on_collisions: true,
            extra_game_dirs: Vec::new(),
        }
    }
}

impl Settings {
    /// Get the config directory path (~/.config/modkeeper)
    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("modkeeper");

        Ok(config_dir)
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path().and_then(|path| Self::try_load(&path)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not load settings: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load settings from a specific file, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_else(|e| {
            warn!("Could not load settings: {:#}. Using defaults.", e);
            Self::default()
        })
    }

    /// Try to load settings, returning error on failure
    fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;

        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path()?)
    }

    /// Save settings to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    /// Resolved catalog location.
    pub fn catalog_path(&self) -> PathBuf {
        if self.catalog_file.is_empty() {
            Path::new(&self.install_root).join(DEFAULT_CATALOG_NAME)
        } else {
            PathBuf::from(&self.catalog_file)
        }
    }

    /// Download directory, if configured.
    pub fn download_dir(&self) -> Option<PathBuf> {
        (!self.download_path.is_empty()).then(|| PathBuf::from(&self.download_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"install_root": "/games/ksp"}"#).unwrap();
        assert_eq!(settings.install_root, "/games/ksp");
        assert!(settings.warn_on_collisions);
        assert_eq!(settings.update_behavior, UpdateBehavior::RemoveAndAdd);
        assert_eq!(settings.catalog_path(), PathBuf::from("/games/ksp/ModCatalog.xml"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg").join("settings.json");
        let settings = Settings {
            install_root: "/games/ksp".into(),
            update_behavior: UpdateBehavior::Manual,
            extra_game_dirs: vec!["GameData/Stock".into()],
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }
}
