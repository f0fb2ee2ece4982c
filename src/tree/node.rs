//! Mod node data: one node per archive entry or per mod package.

use std::fmt;

/// File/folder kind of a node, combined with whether it lands in a game
/// directory and whether it was last seen installed.
///
/// The discriminants are the integer codes stored in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeType {
    #[default]
    File = 0,
    Folder = 1,
    KspFile = 2,
    KspFolder = 3,
    UnknownFile = 4,
    UnknownFolder = 5,
    UnknownFileInstalled = 6,
    UnknownFolderInstalled = 7,
    KspFolderInstalled = 8,
}

impl NodeType {
    const ALL: [NodeType; 9] = [
        NodeType::File,
        NodeType::Folder,
        NodeType::KspFile,
        NodeType::KspFolder,
        NodeType::UnknownFile,
        NodeType::UnknownFolder,
        NodeType::UnknownFileInstalled,
        NodeType::UnknownFolderInstalled,
        NodeType::KspFolderInstalled,
    ];

    /// Catalog code of this type.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parses a catalog code.
    pub fn from_code(code: i32) -> Option<Self> {
        let index = usize::try_from(code).ok()?;
        Self::ALL.get(index).copied()
    }

    pub fn is_file(self) -> bool {
        matches!(
            self,
            NodeType::File | NodeType::KspFile | NodeType::UnknownFile | NodeType::UnknownFileInstalled
        )
    }

    /// Returns true for the variants only the reconciler hands out.
    pub fn is_installed(self) -> bool {
        matches!(
            self,
            NodeType::UnknownFileInstalled
                | NodeType::UnknownFolderInstalled
                | NodeType::KspFolderInstalled
        )
    }

    /// Returns true if the node maps onto a recognized game directory.
    pub fn is_game_dir(self) -> bool {
        matches!(
            self,
            NodeType::KspFile | NodeType::KspFolder | NodeType::KspFolderInstalled
        )
    }

    /// The type the reconciler assigns for the observed state.
    pub(crate) fn reconciled(is_file: bool, game_dir: bool, installed: bool) -> Self {
        match (is_file, game_dir, installed) {
            (true, _, true) => NodeType::UnknownFileInstalled,
            (true, _, false) => NodeType::UnknownFile,
            (false, true, true) => NodeType::KspFolderInstalled,
            (false, true, false) => NodeType::KspFolder,
            (false, false, true) => NodeType::UnknownFolderInstalled,
            (false, false, false) => NodeType::UnknownFolder,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "File",
            NodeType::Folder => "Folder",
            NodeType::KspFile => "KSP File",
            NodeType::KspFolder => "KSP Folder",
            NodeType::UnknownFile => "File",
            NodeType::UnknownFolder => "Folder",
            NodeType::UnknownFileInstalled => "File (installed)",
            NodeType::UnknownFolderInstalled => "Folder (installed)",
            NodeType::KspFolderInstalled => "KSP Folder (installed)",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a node's destination came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DestinationSource {
    /// Computed from an ancestor's destination; re-derived when it changes.
    #[default]
    Derived,
    /// Set directly on this node; never overwritten by re-derivation.
    Explicit,
}

/// Provenance and update-tracking fields. Opaque to the tree engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModMetadata {
    pub version: String,
    pub game_version: String,
    pub author: String,
    pub creation_date: String,
    pub change_date: String,
    pub add_date: String,
    pub note: String,
    pub mod_url: String,
    pub additional_url: String,
    pub rating: String,
    pub downloads: String,
}

/// A node of the mod forest.
///
/// State that has tree-wide consequences (checked, destination, node type,
/// installed flag, identity) is only changed through `ModForest` so that
/// cascades and the identity index stay consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModNode {
    /// Archive entry path, or the archive path for a mod root.
    pub key: String,
    /// Display name.
    pub name: String,
    pub metadata: ModMetadata,
    /// Set by an update check that found a newer release.
    pub is_outdated: bool,
    node_type: NodeType,
    destination: String,
    destination_source: DestinationSource,
    checked: bool,
    is_installed: bool,
    product_id: String,
    site_handler_name: String,
}

impl ModNode {
    /// Creates a file node.
    pub fn file(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            node_type: NodeType::File,
            ..Default::default()
        }
    }

    /// Creates a folder node (also used for mod roots).
    pub fn folder(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            node_type: NodeType::Folder,
            ..Default::default()
        }
    }

    /// Sets the secondary identity of a detached node.
    pub fn with_identity(mut self, product_id: impl Into<String>, site_handler: impl Into<String>) -> Self {
        self.product_id = product_id.into();
        self.site_handler_name = site_handler.into();
        self
    }

    /// Sets an explicit destination on a detached node.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = crate::paths::clean_relative(&destination.into());
        self.destination_source = DestinationSource::Explicit;
        self
    }

    /// Sets the checked flag on a detached node.
    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn is_file(&self) -> bool {
        self.node_type.is_file()
    }

    /// The node's own destination (may be empty; see `resolve_destination`).
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn destination_source(&self) -> DestinationSource {
        self.destination_source
    }

    pub fn has_destination(&self) -> bool {
        !self.destination.is_empty()
    }

    pub fn checked(&self) -> bool {
        self.checked
    }

    /// Last reconciled filesystem state.
    pub fn is_installed(&self) -> bool {
        self.is_installed
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn site_handler_name(&self) -> &str {
        &self.site_handler_name
    }

    pub(crate) fn set_node_type(&mut self, node_type: NodeType) {
        self.node_type = node_type;
    }

    pub(crate) fn set_destination(&mut self, destination: String, source: DestinationSource) {
        self.destination = destination;
        self.destination_source = source;
    }

    pub(crate) fn set_checked_flag(&mut self, checked: bool) {
        self.checked = checked;
    }

    pub(crate) fn set_installed(&mut self, installed: bool) {
        self.is_installed = installed;
    }

    pub(crate) fn set_identity_fields(&mut self, product_id: String, site_handler: String) {
        self.product_id = product_id;
        self.site_handler_name = site_handler;
    }
}

impl fmt::Display for ModNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// A detached, owned tree of nodes: what archives and catalogs produce and
/// what the forest hands back when a mod is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModSubtree {
    pub node: ModNode,
    pub children: Vec<ModSubtree>,
}

impl ModSubtree {
    pub fn new(node: ModNode) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ModSubtree>) -> Self {
        self.children = children;
        self
    }

    /// Number of nodes including this one.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(ModSubtree::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn child(&self, key: &str) -> Option<&ModSubtree> {
        self.children.iter().find(|c| c.node.key == key)
    }

    pub(crate) fn child_mut(&mut self, key: &str) -> Option<&mut ModSubtree> {
        self.children.iter_mut().find(|c| c.node.key == key)
    }

    /// Visits every node depth-first.
    pub fn walk(&self, visit: &mut dyn FnMut(&ModNode)) {
        visit(&self.node);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Visits every node depth-first, mutably.
    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut ModNode)) {
        visit(&mut self.node);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}
