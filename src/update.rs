//! Mod update handling.
//!
//! Remote mod sites are reached through [`SiteHandler`]s registered by
//! name; a mod names its handler in `site_handler_name`. The engine only
//! asks a handler whether a newer release exists and to download it. What
//! happens to the installed copy is decided by [`UpdateBehavior`].

use crate::destination::derive_children;
use crate::tree::{DestinationSource, ModForest, ModNode, ModSubtree, NodeId, TreeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// What a site knows about a mod release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModInfo {
    pub name: String,
    pub product_id: String,
    pub site_handler_name: String,
    pub version: String,
    pub game_version: String,
    pub author: String,
    pub creation_date: String,
    pub change_date: String,
    pub mod_url: String,
    pub additional_url: String,
    pub rating: String,
    pub downloads: String,
    /// Local archive, once downloaded.
    pub local_path: Option<PathBuf>,
}

impl ModInfo {
    pub fn from_node(node: &ModNode) -> Self {
        let m = &node.metadata;
        Self {
            name: node.name.clone(),
            product_id: node.product_id().to_string(),
            site_handler_name: node.site_handler_name().to_string(),
            version: m.version.clone(),
            game_version: m.game_version.clone(),
            author: m.author.clone(),
            creation_date: m.creation_date.clone(),
            change_date: m.change_date.clone(),
            mod_url: m.mod_url.clone(),
            additional_url: m.additional_url.clone(),
            rating: m.rating.clone(),
            downloads: m.downloads.clone(),
            local_path: None,
        }
    }

    /// Copies release metadata onto a detached node, including identity.
    pub fn apply_to(&self, node: &mut ModNode) {
        if !self.name.is_empty() {
            node.name = self.name.clone();
        }
        let m = &mut node.metadata;
        m.version = self.version.clone();
        m.game_version = self.game_version.clone();
        m.author = self.author.clone();
        m.creation_date = self.creation_date.clone();
        m.change_date = self.change_date.clone();
        m.mod_url = self.mod_url.clone();
        m.additional_url = self.additional_url.clone();
        m.rating = self.rating.clone();
        m.downloads = self.downloads.clone();
        node.set_identity_fields(self.product_id.clone(), self.site_handler_name.clone());
    }
}

/// Client for one mod hosting site.
pub trait SiteHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the newer release if `info` is outdated.
    fn check_for_updates(&self, info: &ModInfo) -> anyhow::Result<Option<ModInfo>>;

    /// Downloads a release into `download_dir` and returns the archive path.
    fn download_mod(&self, info: &ModInfo, download_dir: &Path) -> anyhow::Result<PathBuf>;
}

/// Site handlers by name.
#[derive(Clone, Default)]
pub struct SiteHandlerRegistry {
    handlers: HashMap<String, Arc<dyn SiteHandler>>,
}

impl SiteHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn SiteHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SiteHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for SiteHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteHandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// How an outdated mod is brought up to date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateBehavior {
    /// Uninstall the old mod, add the new one fresh and install it.
    #[default]
    RemoveAndAdd,
    /// Uninstall the old mod, then carry its destinations and checked
    /// state over to matching entries of the new one.
    CopyDestination,
    /// Only flag the mod as outdated.
    Manual,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("No site handler named '{0}' is registered")]
    UnknownHandler(String),

    #[error("'{0}' is not linked to a mod site")]
    NotTracked(String),

    #[error("Update check for '{name}' failed: {source:#}")]
    Check {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Download of '{name}' failed: {source:#}")]
    Download {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Reading the new release of '{name}' failed: {source:#}")]
    Read {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("No placed entry of '{0}' exists in the new release; update it manually")]
    NoMatchingEntries(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// A mod found to be outdated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    pub node: NodeId,
    pub latest: ModInfo,
}

/// Asks the mod's handler for a newer release.
pub fn check_mod(
    registry: &SiteHandlerRegistry,
    node: &ModNode,
) -> Result<Option<ModInfo>, UpdateError> {
    if node.site_handler_name().is_empty() || node.product_id().is_empty() {
        return Err(UpdateError::NotTracked(node.to_string()));
    }
    let handler = registry
        .get(node.site_handler_name())
        .ok_or_else(|| UpdateError::UnknownHandler(node.site_handler_name().to_string()))?;
    handler
        .check_for_updates(&ModInfo::from_node(node))
        .map_err(|source| UpdateError::Check {
            name: node.to_string(),
            source,
        })
}

/// Carries explicit destinations and checked flags from an old mod tree
/// onto entries of `new_root` with the same key. Returns the number of
/// entries that received a destination.
pub fn copy_destinations(forest: &mut ModForest, old: &ModSubtree, new_root: NodeId) -> usize {
    let mut carried = Vec::new();
    collect_placed(old, &mut carried);

    let mut copied = 0;
    for (key, destination, checked) in carried {
        let Some(id) = forest.find_in_subtree(new_root, &key) else {
            debug!("No entry '{}' in the new release", key);
            continue;
        };
        if let Some(node) = forest.get_mut(id) {
            node.set_destination(destination, DestinationSource::Explicit);
            node.set_checked_flag(checked);
        }
        derive_children(forest, id);
        copied += 1;
    }

    // Checked flags of derived entries follow by key too.
    let mut checked_keys = Vec::new();
    old.walk(&mut |n| {
        if n.checked() {
            checked_keys.push(n.key.clone());
        }
    });
    for key in checked_keys {
        if let Some(id) = forest.find_in_subtree(new_root, &key) {
            if let Some(node) = forest.get_mut(id) {
                node.set_checked_flag(true);
            }
        }
    }
    copied
}

/// Whether any explicitly placed entry of `old` exists in `new` by key.
pub fn has_matching_entries(old: &ModSubtree, new: &ModSubtree) -> bool {
    let mut placed = Vec::new();
    collect_placed(old, &mut placed);
    let mut keys = std::collections::HashSet::new();
    new.walk(&mut |n| {
        keys.insert(n.key.clone());
    });
    placed.iter().any(|(key, _, _)| keys.contains(key))
}

fn collect_placed(tree: &ModSubtree, out: &mut Vec<(String, String, bool)>) {
    let node = &tree.node;
    if node.has_destination() && node.destination_source() == DestinationSource::Explicit {
        out.push((node.key.clone(), node.destination().to_string(), node.checked()));
    }
    for child in &tree.children {
        collect_placed(child, out);
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::FakeSite;
    use super::*;
    use std::sync::Mutex;

    fn registry_with(latest: &str) -> SiteHandlerRegistry {
        let mut registry = SiteHandlerRegistry::new();
        registry.register(Arc::new(FakeSite {
            latest: ModInfo {
                version: latest.into(),
                product_id: "42".into(),
                site_handler_name: "FakeSite".into(),
                ..Default::default()
            },
            archive: PathBuf::from("unused.zip"),
            checks: Mutex::new(0),
        }));
        registry
    }

    #[test]
    fn test_check_mod() {
        let registry = registry_with("2.0");
        let mut node = ModNode::folder("m.zip", "M").with_identity("42", "FakeSite");
        node.metadata.version = "1.0".into();
        let latest = check_mod(&registry, &node).unwrap().unwrap();
        assert_eq!(latest.version, "2.0");

        node.metadata.version = "2.0".into();
        assert_eq!(check_mod(&registry, &node).unwrap(), None);
    }

    #[test]
    fn test_check_mod_requires_tracking() {
        let registry = registry_with("2.0");
        let untracked = ModNode::folder("m.zip", "M");
        assert!(matches!(check_mod(&registry, &untracked), Err(UpdateError::NotTracked(_))));

        let unknown = ModNode::folder("m.zip", "M").with_identity("1", "Elsewhere");
        assert!(matches!(check_mod(&registry, &unknown), Err(UpdateError::UnknownHandler(_))));
    }

    #[test]
    fn test_copy_destinations_by_key() {
        let old = ModSubtree::new(ModNode::folder("old.zip", "Foo")).with_children(vec![
            ModSubtree::new(ModNode::folder("Foo", "Foo").with_destination("GameData/Foo").with_checked(true))
                .with_children(vec![ModSubtree::new(ModNode::file("Foo/a.cfg", "a.cfg").with_checked(true))]),
        ]);
        let new = ModSubtree::new(ModNode::folder("new.zip", "Foo")).with_children(vec![
            ModSubtree::new(ModNode::folder("Foo", "Foo")).with_children(vec![
                ModSubtree::new(ModNode::file("Foo/a.cfg", "a.cfg")),
                ModSubtree::new(ModNode::file("Foo/b.cfg", "b.cfg")),
            ]),
        ]);
        let mut forest = ModForest::new();
        let root = forest.add_mod(new).unwrap();

        assert_eq!(copy_destinations(&mut forest, &old, root), 1);
        let foo = forest.find_child_by_key(root, "Foo").unwrap();
        let a = forest.find_in_subtree(root, "Foo/a.cfg").unwrap();
        let b = forest.find_in_subtree(root, "Foo/b.cfg").unwrap();
        assert_eq!(forest[foo].destination(), "GameData/Foo");
        assert_eq!(forest[b].destination(), "GameData/Foo/b.cfg");
        assert!(forest[a].checked());
        assert!(!forest[b].checked());
    }

    #[test]
    fn test_has_matching_entries() {
        let old = ModSubtree::new(ModNode::folder("old.zip", "Foo")).with_children(vec![
            ModSubtree::new(ModNode::folder("Foo", "Foo").with_destination("GameData/Foo")),
        ]);
        let renamed = ModSubtree::new(ModNode::folder("new.zip", "Foo"))
            .with_children(vec![ModSubtree::new(ModNode::folder("FooRedux", "FooRedux"))]);
        let same = ModSubtree::new(ModNode::folder("new.zip", "Foo"))
            .with_children(vec![ModSubtree::new(ModNode::folder("Foo", "Foo"))]);

        assert!(!has_matching_entries(&old, &renamed));
        assert!(has_matching_entries(&old, &same));
    }

    #[test]
    fn test_update_behavior_serde() {
        let json = serde_json::to_string(&UpdateBehavior::CopyDestination).unwrap();
        assert_eq!(json, "\"CopyDestination\"");
        let parsed: UpdateBehavior = serde_json::from_str("\"Manual\"").unwrap();
        assert_eq!(parsed, UpdateBehavior::Manual);
    }
}
