//! Arena storage for the mod forest.
//!
//! Nodes live in a slot vector addressed by [`NodeId`]. Each slot carries a
//! generation so an id kept across a removal never aliases a node inserted
//! later into the same slot.

use super::node::{ModNode, ModSubtree};
use super::TreeError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Index;

/// Handle to a node in a [`ModForest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    node: ModNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
struct Entry {
    generation: u32,
    slot: Option<Slot>,
}

type IdentityKey = (String, String);

fn identity_of(node: &ModNode) -> Option<IdentityKey> {
    if node.product_id().is_empty() {
        None
    } else {
        Some((node.product_id().to_string(), node.site_handler_name().to_string()))
    }
}

/// All mods known to a session: an ordered list of root mods, each owning
/// its archive entries as children.
#[derive(Debug, Clone, Default)]
pub struct ModForest {
    entries: Vec<Entry>,
    free: Vec<u32>,
    roots: Vec<NodeId>,
    identity: HashMap<IdentityKey, NodeId>,
}

impl ModForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a forest from detached mods, stopping at the first conflict.
    pub fn from_subtrees(mods: Vec<ModSubtree>) -> Result<Self, TreeError> {
        let mut forest = Self::new();
        for m in mods {
            forest.add_mod(m)?;
        }
        Ok(forest)
    }

    /// Number of attached nodes.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        let entry = self.entries.get(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.slot.as_ref()
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.slot.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&ModNode> {
        self.slot(id).map(|s| &s.node)
    }

    /// Mutable access for display and metadata fields. Tree-wide state goes
    /// through the forest's own operations.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut ModNode> {
        self.slot_mut(id).map(|s| &mut s.node)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|s| s.parent)
    }

    /// Children in order; empty for leaves and stale ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.contains(id) && self.parent(id).is_none()
    }

    /// Parent, grandparent, … up to the root mod.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            forest: self,
            next: self.parent(id),
        }
    }

    /// The root mod the node belongs to (the node itself for a root).
    pub fn zip_root(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().unwrap_or(id)
    }

    /// Pre-order traversal of the subtree rooted at `start`.
    pub fn depth_first(&self, start: NodeId) -> DepthFirst<'_> {
        let stack = if self.contains(start) { vec![start] } else { Vec::new() };
        DepthFirst { forest: self, stack }
    }

    /// Pre-order traversal of every mod in root order.
    pub fn iter(&self) -> DepthFirst<'_> {
        DepthFirst {
            forest: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }

    /// Post-order id list of a subtree (children before parents).
    pub fn post_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_post_order(start, &mut out);
        out
    }

    fn collect_post_order(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in self.children(id) {
            self.collect_post_order(child, out);
        }
        if self.contains(id) {
            out.push(id);
        }
    }

    /// Descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.depth_first(id).skip(1)
    }

    pub fn find_root_by_key(&self, key: &str) -> Option<NodeId> {
        self.roots.iter().copied().find(|&r| self[r].key == key)
    }

    pub fn find_child_by_key(&self, parent: NodeId, key: &str) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|&c| self[c].key == key)
    }

    /// First node below (or at) `start` with the given key.
    pub fn find_in_subtree(&self, start: NodeId, key: &str) -> Option<NodeId> {
        self.depth_first(start).find(|&id| self[id].key == key)
    }

    /// O(1) lookup by product id and site handler.
    pub fn find_by_identity(&self, product_id: &str, site_handler: &str) -> Option<NodeId> {
        self.identity
            .get(&(product_id.to_string(), site_handler.to_string()))
            .copied()
    }

    /// Slash-joined names from `ancestor` (exclusive) down to `id`
    /// (inclusive). `None` if `ancestor` is not above `id`.
    pub fn relative_path(&self, ancestor: NodeId, id: NodeId) -> Option<String> {
        let mut names = vec![self.get(id)?.name.as_str()];
        let mut current = self.parent(id)?;
        while current != ancestor {
            names.push(self.get(current)?.name.as_str());
            current = self.parent(current)?;
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Appends a root mod.
    pub fn add_mod(&mut self, subtree: ModSubtree) -> Result<NodeId, TreeError> {
        let position = self.roots.len();
        self.insert_root_at(position, subtree)
    }

    /// Appends a subtree below an attached node.
    pub fn add_child(&mut self, parent: NodeId, subtree: ModSubtree) -> Result<NodeId, TreeError> {
        if !self.contains(parent) {
            return Err(TreeError::UnknownNode(parent));
        }
        let siblings: Vec<&str> = self
            .children(parent)
            .iter()
            .map(|&c| self[c].key.as_str())
            .collect();
        self.validate(&subtree, &siblings, &HashSet::new())?;
        let id = self.insert(Some(parent), subtree);
        if let Some(slot) = self.slot_mut(parent) {
            slot.children.push(id);
        }
        Ok(id)
    }

    fn insert_root_at(&mut self, position: usize, subtree: ModSubtree) -> Result<NodeId, TreeError> {
        let siblings: Vec<&str> = self.roots.iter().map(|&r| self[r].key.as_str()).collect();
        self.validate(&subtree, &siblings, &HashSet::new())?;
        let id = self.insert(None, subtree);
        let position = position.min(self.roots.len());
        self.roots.insert(position, id);
        Ok(id)
    }

    /// Checks keys and identities of a detached subtree against the
    /// insertion point and the identity index, ignoring identities in
    /// `released` (held by nodes about to be removed).
    fn validate(
        &self,
        subtree: &ModSubtree,
        siblings: &[&str],
        released: &HashSet<IdentityKey>,
    ) -> Result<(), TreeError> {
        if siblings.contains(&subtree.node.key.as_str()) {
            return Err(TreeError::DuplicateKey {
                key: subtree.node.key.clone(),
            });
        }
        let mut seen = HashSet::new();
        self.validate_node(subtree, released, &mut seen)
    }

    fn validate_node(
        &self,
        subtree: &ModSubtree,
        released: &HashSet<IdentityKey>,
        seen: &mut HashSet<IdentityKey>,
    ) -> Result<(), TreeError> {
        let node = &subtree.node;
        if node.key.is_empty() {
            return Err(TreeError::MissingIdentity);
        }
        if let Some(identity) = identity_of(node) {
            let taken = self.identity.contains_key(&identity) && !released.contains(&identity);
            if taken || !seen.insert(identity.clone()) {
                return Err(TreeError::DuplicateIdentity {
                    product_id: identity.0,
                    site_handler: identity.1,
                });
            }
        }

        let mut keys = HashSet::new();
        for child in &subtree.children {
            if !keys.insert(child.node.key.as_str()) {
                return Err(TreeError::DuplicateKey {
                    key: child.node.key.clone(),
                });
            }
            self.validate_node(child, released, seen)?;
        }
        Ok(())
    }

    fn alloc(&mut self, slot: Slot) -> NodeId {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.slot = Some(slot);
            NodeId {
                index,
                generation: entry.generation,
            }
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Entry {
                generation: 0,
                slot: Some(slot),
            });
            NodeId { index, generation: 0 }
        }
    }

    /// Attaches a validated subtree; the caller links the returned id into
    /// the parent's child list or the root list.
    fn insert(&mut self, parent: Option<NodeId>, subtree: ModSubtree) -> NodeId {
        let ModSubtree { node, children } = subtree;
        let identity = identity_of(&node);
        let id = self.alloc(Slot {
            node,
            parent,
            children: Vec::with_capacity(children.len()),
        });
        if let Some(identity) = identity {
            self.identity.insert(identity, id);
        }
        for child in children {
            let child_id = self.insert(Some(id), child);
            if let Some(slot) = self.slot_mut(id) {
                slot.children.push(child_id);
            }
        }
        id
    }

    /// Detaches a node (root mod or entry) with its subtree and hands it
    /// back. Stale ids are a no-op.
    pub fn remove_mod(&mut self, id: NodeId) -> Option<ModSubtree> {
        let parent = self.slot(id)?.parent;
        match parent {
            Some(p) => {
                if let Some(slot) = self.slot_mut(p) {
                    slot.children.retain(|&c| c != id);
                }
            }
            None => self.roots.retain(|&r| r != id),
        }
        self.take(id)
    }

    fn take(&mut self, id: NodeId) -> Option<ModSubtree> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let slot = entry.slot.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);

        if let Some(identity) = identity_of(&slot.node) {
            if self.identity.get(&identity) == Some(&id) {
                self.identity.remove(&identity);
            }
        }
        let children = slot
            .children
            .into_iter()
            .filter_map(|c| self.take(c))
            .collect();
        Some(ModSubtree {
            node: slot.node,
            children,
        })
    }

    /// Swaps a root mod for a new subtree at the same position. On error the
    /// forest is unchanged.
    pub fn replace_mod(&mut self, old: NodeId, new: ModSubtree) -> Result<NodeId, TreeError> {
        let position = self
            .roots
            .iter()
            .position(|&r| r == old)
            .ok_or(TreeError::UnknownNode(old))?;

        let released: HashSet<IdentityKey> = self
            .depth_first(old)
            .filter_map(|id| identity_of(&self[id]))
            .collect();
        let siblings: Vec<&str> = self
            .roots
            .iter()
            .filter(|&&r| r != old)
            .map(|&r| self[r].key.as_str())
            .collect();
        self.validate(&new, &siblings, &released)?;

        self.remove_mod(old);
        let id = self.insert(None, new);
        self.roots.insert(position, id);
        Ok(id)
    }

    /// Re-parents a node (`None` makes it a root mod). The node is detached
    /// from its old parent before it is attached to the new one.
    pub fn move_node(&mut self, id: NodeId, new_parent: Option<NodeId>) -> Result<(), TreeError> {
        let old_parent = self.slot(id).ok_or(TreeError::UnknownNode(id))?.parent;
        if let Some(p) = new_parent {
            if !self.contains(p) {
                return Err(TreeError::UnknownNode(p));
            }
            if p == id || self.ancestors(p).any(|a| a == id) {
                return Err(TreeError::Cycle);
            }
        }
        if old_parent == new_parent {
            return Ok(());
        }

        let key = self[id].key.as_str();
        let clash = match new_parent {
            Some(p) => self.find_child_by_key(p, key).is_some(),
            None => self.find_root_by_key(key).is_some(),
        };
        if clash {
            return Err(TreeError::DuplicateKey {
                key: key.to_string(),
            });
        }

        match old_parent {
            Some(p) => {
                if let Some(slot) = self.slot_mut(p) {
                    slot.children.retain(|&c| c != id);
                }
            }
            None => self.roots.retain(|&r| r != id),
        }
        match new_parent {
            Some(p) => {
                if let Some(slot) = self.slot_mut(p) {
                    slot.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        if let Some(slot) = self.slot_mut(id) {
            slot.parent = new_parent;
        }
        Ok(())
    }

    /// Changes the product id / site handler of an attached node and keeps
    /// the identity index in step.
    pub fn set_identity(
        &mut self,
        id: NodeId,
        product_id: &str,
        site_handler: &str,
    ) -> Result<(), TreeError> {
        let old = identity_of(self.get(id).ok_or(TreeError::UnknownNode(id))?);
        let new = (!product_id.is_empty())
            .then(|| (product_id.to_string(), site_handler.to_string()));

        if let Some(identity) = &new {
            if let Some(&holder) = self.identity.get(identity) {
                if holder != id {
                    return Err(TreeError::DuplicateIdentity {
                        product_id: identity.0.clone(),
                        site_handler: identity.1.clone(),
                    });
                }
            }
        }

        if let Some(identity) = old {
            self.identity.remove(&identity);
        }
        if let Some(identity) = new {
            self.identity.insert(identity, id);
        }
        if let Some(node) = self.get_mut(id) {
            node.set_identity_fields(product_id.to_string(), site_handler.to_string());
        }
        Ok(())
    }

    /// Owned copy of a subtree.
    pub fn export(&self, id: NodeId) -> Option<ModSubtree> {
        let slot = self.slot(id)?;
        Some(ModSubtree {
            node: slot.node.clone(),
            children: slot.children.iter().filter_map(|&c| self.export(c)).collect(),
        })
    }

    /// Owned copies of every root mod, in order.
    pub fn export_all(&self) -> Vec<ModSubtree> {
        self.roots.iter().filter_map(|&r| self.export(r)).collect()
    }
}

impl Index<NodeId> for ModForest {
    type Output = ModNode;

    /// Panics on a stale id; use [`ModForest::get`] when the id may be gone.
    fn index(&self, id: NodeId) -> &ModNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node id {id}"),
        }
    }
}

/// Lazy pre-order iterator over node ids.
pub struct DepthFirst<'a> {
    forest: &'a ModForest,
    stack: Vec<NodeId>,
}

impl Iterator for DepthFirst<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.forest.children(id).iter().rev().copied());
        Some(id)
    }
}

/// Iterator from a node's parent up to its root mod.
pub struct Ancestors<'a> {
    forest: &'a ModForest,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.forest.parent(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mod(key: &str) -> ModSubtree {
        ModSubtree::new(ModNode::folder(key, key)).with_children(vec![
            ModSubtree::new(ModNode::folder("GameData", "GameData")).with_children(vec![
                ModSubtree::new(ModNode::folder("GameData/Foo", "Foo")).with_children(vec![
                    ModSubtree::new(ModNode::file("GameData/Foo/a.cfg", "a.cfg")),
                    ModSubtree::new(ModNode::file("GameData/Foo/b.cfg", "b.cfg")),
                ]),
            ]),
            ModSubtree::new(ModNode::file("readme.txt", "readme.txt")),
        ])
    }

    #[test]
    fn test_add_and_lookup() {
        let mut forest = ModForest::new();
        let root = forest.add_mod(sample_mod("foo.zip")).unwrap();

        assert_eq!(forest.len(), 6);
        assert_eq!(forest.find_root_by_key("foo.zip"), Some(root));
        let game_data = forest.find_child_by_key(root, "GameData").unwrap();
        let cfg = forest.find_in_subtree(root, "GameData/Foo/b.cfg").unwrap();
        assert_eq!(forest.zip_root(cfg), root);
        assert_eq!(forest.zip_root(root), root);
        assert_eq!(forest.ancestors(cfg).nth(1), Some(game_data));
        assert_eq!(forest.relative_path(game_data, cfg).as_deref(), Some("Foo/b.cfg"));
    }

    #[test]
    fn test_duplicate_root_key_rejected() {
        let mut forest = ModForest::new();
        forest.add_mod(sample_mod("foo.zip")).unwrap();
        let err = forest.add_mod(sample_mod("foo.zip")).unwrap_err();
        assert_eq!(err, TreeError::DuplicateKey { key: "foo.zip".into() });
        assert_eq!(forest.roots().len(), 1);
    }

    #[test]
    fn test_duplicate_sibling_key_rejected() {
        let bad = ModSubtree::new(ModNode::folder("m.zip", "m")).with_children(vec![
            ModSubtree::new(ModNode::file("a", "a")),
            ModSubtree::new(ModNode::file("a", "a")),
        ]);
        let mut forest = ModForest::new();
        assert!(matches!(forest.add_mod(bad), Err(TreeError::DuplicateKey { .. })));
        assert!(forest.is_empty());
        assert_eq!(forest.len(), 0);
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut forest = ModForest::new();
        let err = forest.add_mod(ModSubtree::new(ModNode::folder("", "nameless"))).unwrap_err();
        assert_eq!(err, TreeError::MissingIdentity);
    }

    #[test]
    fn test_depth_first_is_pre_order_and_restartable() {
        let mut forest = ModForest::new();
        let root = forest.add_mod(sample_mod("foo.zip")).unwrap();
        let keys: Vec<_> = forest.depth_first(root).map(|id| forest[id].key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                "foo.zip",
                "GameData",
                "GameData/Foo",
                "GameData/Foo/a.cfg",
                "GameData/Foo/b.cfg",
                "readme.txt"
            ]
        );
        assert_eq!(forest.depth_first(root).count(), 6);

        let post: Vec<_> = forest.post_order(root).iter().map(|&id| forest[id].key.clone()).collect();
        assert_eq!(post.first().map(String::as_str), Some("GameData/Foo/a.cfg"));
        assert_eq!(post.last().map(String::as_str), Some("foo.zip"));
    }

    #[test]
    fn test_remove_returns_subtree_and_stale_ids_are_noop() {
        let mut forest = ModForest::new();
        let original = sample_mod("foo.zip");
        let root = forest.add_mod(original.clone()).unwrap();
        let child = forest.find_in_subtree(root, "readme.txt").unwrap();

        let removed = forest.remove_mod(root).unwrap();
        assert_eq!(removed, original);
        assert!(forest.is_empty());
        assert!(forest.remove_mod(root).is_none());
        assert!(forest.get(child).is_none());

        // Slot reuse does not resurrect the old id.
        let again = forest.add_mod(sample_mod("bar.zip")).unwrap();
        assert_ne!(again, root);
        assert!(forest.get(root).is_none());
    }

    #[test]
    fn test_identity_index_follows_mutations() {
        let mut forest = ModForest::new();
        let tracked = ModSubtree::new(ModNode::folder("foo.zip", "Foo").with_identity("123", "CurseForge"));
        let root = forest.add_mod(tracked).unwrap();
        assert_eq!(forest.find_by_identity("123", "CurseForge"), Some(root));

        let clash = ModSubtree::new(ModNode::folder("other.zip", "Other").with_identity("123", "CurseForge"));
        assert!(matches!(forest.add_mod(clash), Err(TreeError::DuplicateIdentity { .. })));

        forest.set_identity(root, "456", "CurseForge").unwrap();
        assert_eq!(forest.find_by_identity("123", "CurseForge"), None);
        assert_eq!(forest.find_by_identity("456", "CurseForge"), Some(root));

        forest.remove_mod(root);
        assert_eq!(forest.find_by_identity("456", "CurseForge"), None);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut forest = ModForest::new();
        forest.add_mod(sample_mod("a.zip")).unwrap();
        let b = forest
            .add_mod(ModSubtree::new(ModNode::folder("b.zip", "b").with_identity("7", "Site")))
            .unwrap();
        forest.add_mod(sample_mod("c.zip")).unwrap();

        let replacement =
            ModSubtree::new(ModNode::folder("b2.zip", "b").with_identity("7", "Site"));
        let new_id = forest.replace_mod(b, replacement).unwrap();

        let keys: Vec<_> = forest.roots().iter().map(|&r| forest[r].key.clone()).collect();
        assert_eq!(keys, vec!["a.zip", "b2.zip", "c.zip"]);
        assert_eq!(forest.find_by_identity("7", "Site"), Some(new_id));
    }

    #[test]
    fn test_replace_failure_leaves_forest_unchanged() {
        let mut forest = ModForest::new();
        forest.add_mod(sample_mod("a.zip")).unwrap();
        let b = forest.add_mod(sample_mod("b.zip")).unwrap();

        let err = forest.replace_mod(b, sample_mod("a.zip")).unwrap_err();
        assert!(matches!(err, TreeError::DuplicateKey { .. }));
        assert_eq!(forest.roots().len(), 2);
        assert!(forest.contains(b));
    }

    #[test]
    fn test_move_node_detaches_and_refuses_cycles() {
        let mut forest = ModForest::new();
        let a = forest.add_mod(sample_mod("a.zip")).unwrap();
        let b = forest.add_mod(ModSubtree::new(ModNode::folder("b.zip", "b"))).unwrap();
        let readme = forest.find_child_by_key(a, "readme.txt").unwrap();
        let game_data = forest.find_child_by_key(a, "GameData").unwrap();
        let foo = forest.find_child_by_key(game_data, "GameData/Foo").unwrap();

        forest.move_node(readme, Some(b)).unwrap();
        assert_eq!(forest.parent(readme), Some(b));
        assert!(forest.find_child_by_key(a, "readme.txt").is_none());
        assert_eq!(forest.zip_root(readme), b);

        assert_eq!(forest.move_node(game_data, Some(foo)), Err(TreeError::Cycle));
        assert_eq!(forest.move_node(a, Some(a)), Err(TreeError::Cycle));
        assert_eq!(forest.parent(game_data), Some(a));
    }
}
