//! Persistent mod catalog.
//!
//! The catalog is an XML document holding a version tag, a small settings
//! block and the full mod forest. `<Version>` selects the parser; a
//! document with an unknown version, malformed XML, or an unreadable file
//! loads as an empty catalog plus the error, never a panic.

mod encoding;
mod fields;
mod v1;

pub use encoding::decode_xml_bytes;
pub use v1::VERSION as CURRENT_VERSION;

use crate::tree::{ModForest, ModSubtree};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Malformed catalog at byte {position}: {message}")]
    Parse { position: u64, message: String },

    #[error("Unsupported catalog version '{0}'")]
    UnsupportedVersion(String),

    #[error("Catalog I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The flat `<General>` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSettings {
    pub download_path: String,
}

/// Catalog contents: settings plus detached mod trees in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub settings: CatalogSettings,
    pub mods: Vec<ModSubtree>,
}

impl Catalog {
    /// Snapshot of a forest for saving.
    pub fn from_forest(forest: &ModForest, settings: CatalogSettings) -> Self {
        Self {
            settings,
            mods: forest.export_all(),
        }
    }
}

/// What a load produced. `errors` is empty on a clean load.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub catalog: Catalog,
    pub errors: Vec<CatalogError>,
}

impl LoadOutcome {
    fn failed(error: CatalogError) -> Self {
        warn!("{}", error);
        Self {
            catalog: Catalog::default(),
            errors: vec![error],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Load a catalog file. A missing file is an empty catalog, not an error.
pub fn load(path: &Path) -> LoadOutcome {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No catalog at {}, starting empty", path.display());
            return LoadOutcome::default();
        }
        Err(source) => {
            return LoadOutcome::failed(CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    load_bytes(&bytes)
}

/// Load a catalog from raw bytes (UTF-8, UTF-8 with BOM, or UTF-16).
pub fn load_bytes(bytes: &[u8]) -> LoadOutcome {
    match decode_xml_bytes(bytes) {
        Ok(xml) => load_str(&xml),
        Err(e) => LoadOutcome::failed(CatalogError::Parse {
            position: 0,
            message: format!("{e:#}"),
        }),
    }
}

/// Load a catalog from a document string.
pub fn load_str(xml: &str) -> LoadOutcome {
    let version = match v1::read_version(xml) {
        Ok(version) => version.unwrap_or_default(),
        Err(e) => return LoadOutcome::failed(e),
    };
    let parsed = match version.to_ascii_lowercase().as_str() {
        v1::VERSION => v1::parse(xml),
        _ => Err(CatalogError::UnsupportedVersion(version)),
    };
    match parsed {
        Ok(catalog) => {
            info!("Loaded catalog with {} mods", catalog.mods.len());
            LoadOutcome {
                catalog,
                errors: Vec::new(),
            }
        }
        Err(e) => LoadOutcome::failed(e),
    }
}

/// Serialize a catalog to a string in the current format.
pub fn to_xml_string(catalog: &Catalog) -> String {
    let mut out = Vec::new();
    // Writing to a Vec cannot fail.
    let _ = v1::write(&mut out, catalog);
    String::from_utf8_lossy(&out).into_owned()
}

/// Write a catalog atomically: the document goes to a temp file next to
/// `path` and replaces it in one rename.
pub fn save(path: &Path, catalog: &Catalog) -> Result<(), CatalogError> {
    let io_err = |source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err)?;

    let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    v1::write(&mut temp, catalog).map_err(io_err)?;
    temp.flush().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    info!("Saved catalog with {} mods to {}", catalog.mods.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CollisionIndex;
    use crate::tree::{ModNode, NodeType};
    use tempfile::tempdir;

    fn sample_catalog() -> Catalog {
        let mut root = ModNode::folder("/dl/Foo.zip", "Foo").with_identity("1234", "CurseForge");
        root.metadata.version = "1.2.0".into();
        root.metadata.game_version = "1.12.5".into();
        root.metadata.author = "Jeb".into();
        root.metadata.note = "needs <ModuleManager> & friends".into();

        let game_data = ModNode::folder("GameData", "GameData").with_destination("GameData").with_checked(true);
        Catalog {
            settings: CatalogSettings {
                download_path: "/dl".into(),
            },
            mods: vec![ModSubtree::new(root).with_children(vec![
                ModSubtree::new(game_data).with_children(vec![ModSubtree::new(
                    ModNode::file("GameData/foo.cfg", "foo.cfg").with_checked(true),
                )]),
                ModSubtree::new(ModNode::file("readme.txt", "readme.txt")),
            ])],
        }
    }

    #[test]
    fn test_round_trip() {
        let catalog = sample_catalog();
        let outcome = load_str(&to_xml_string(&catalog));
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        assert_eq!(outcome.catalog, catalog);
    }

    #[test]
    fn test_save_and_load_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("catalog.xml");
        save(&path, &sample_catalog())?;
        let outcome = load(&path);
        assert!(outcome.is_ok());
        assert_eq!(outcome.catalog, sample_catalog());
        Ok(())
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let outcome = load(&dir.path().join("nope.xml"));
        assert!(outcome.is_ok());
        assert!(outcome.catalog.mods.is_empty());
    }

    #[test]
    fn test_unknown_version() {
        let xml = r#"<ModCatalog><Version>v9.9</Version><Mods><Mod Key="a" Name="a" NodeType="1" Checked="False"/></Mods></ModCatalog>"#;
        let outcome = load_str(xml);
        assert!(outcome.catalog.mods.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(&outcome.errors[0], CatalogError::UnsupportedVersion(v) if v == "v9.9"));
    }

    #[test]
    fn test_version_tag_ignores_case() {
        let xml = r#"<ModCatalog><Version> V1.0 </Version><Mods><Mod Key="a" Name="a" NodeType="1" Checked="False"/></Mods></ModCatalog>"#;
        let outcome = load_str(xml);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.catalog.mods.len(), 1);
    }

    #[test]
    fn test_malformed_xml() {
        let outcome = load_str("<ModCatalog><Version>v1.0</Version><Mods></Wrong></ModCatalog>");
        assert!(outcome.catalog.mods.is_empty());
        assert!(matches!(outcome.errors.as_slice(), [CatalogError::Parse { .. }]));
    }

    #[test]
    fn test_utf16_catalog() {
        let xml = to_xml_string(&sample_catalog());
        let mut bytes = vec![0xFF, 0xFE];
        for unit in xml.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let outcome = load_bytes(&bytes);
        assert!(outcome.is_ok());
        assert_eq!(outcome.catalog.mods.len(), 1);
    }

    #[test]
    fn test_collision_scenario_from_catalog() {
        let xml = r#"<ModCatalog>
  <Version>v1.0</Version>
  <Mods>
    <Mod Key="a.zip" Name="A" NodeType="1" Checked="True">
      <ModEntry Key="foo.cfg" Name="foo.cfg" NodeType="0" Checked="True" Destination="GameData/Foo"/>
    </Mod>
    <Mod Key="b.zip" Name="B" NodeType="1" Checked="True">
      <ModEntry Key="foo.cfg" Name="foo.cfg" NodeType="0" Checked="True" Destination="GameData\foo"/>
    </Mod>
  </Mods>
</ModCatalog>"#;
        let outcome = load_str(xml);
        assert!(outcome.is_ok());
        let forest = ModForest::from_subtrees(outcome.catalog.mods).unwrap();
        let index = CollisionIndex::build(&forest);
        let a = forest.find_root_by_key("a.zip").unwrap();
        let b = forest.find_root_by_key("b.zip").unwrap();
        assert!(index.has_child_collision(&forest, a));
        assert!(index.has_child_collision(&forest, b));
        assert_eq!(forest[forest.children(a)[0]].node_type(), NodeType::File);
    }
}
