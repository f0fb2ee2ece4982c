//! Checked-state rules.
//!
//! Unchecking cascades down; checking never does. A node may only be
//! checked when it (or, for a folder, something below it) has somewhere to
//! go.

use super::forest::{ModForest, NodeId};
use super::TreeError;
use crate::destination::resolve_destination;

/// Aggregate desired state of a node and everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Checked,
    Unchecked,
    Mixed,
}

impl ModForest {
    /// Tri-state view for display: `Mixed` when the node and its
    /// descendants disagree.
    pub fn desired_state(&self, id: NodeId) -> DesiredState {
        let mut any_checked = false;
        let mut any_unchecked = false;
        for n in self.depth_first(id) {
            if self[n].checked() {
                any_checked = true;
            } else {
                any_unchecked = true;
            }
            if any_checked && any_unchecked {
                return DesiredState::Mixed;
            }
        }
        if any_checked {
            DesiredState::Checked
        } else {
            DesiredState::Unchecked
        }
    }

    /// True if some node below `id` carries its own destination.
    pub fn has_destination_for_children(&self, id: NodeId) -> bool {
        self.descendants(id).any(|d| self[d].has_destination())
    }

    /// True if some node below `id` was last reconciled as installed.
    pub fn has_installed_children(&self, id: NodeId) -> bool {
        self.descendants(id).any(|d| self[d].is_installed())
    }

    fn can_check(&self, id: NodeId) -> bool {
        !resolve_destination(self, id).is_empty()
            || (!self[id].is_file() && self.has_destination_for_children(id))
    }

    /// Sets the desired state of one node. Unchecking clears every
    /// descendant as well.
    pub fn set_checked(&mut self, id: NodeId, checked: bool) -> Result<(), TreeError> {
        if !self.contains(id) {
            return Err(TreeError::UnknownNode(id));
        }
        if checked {
            if !self.can_check(id) {
                return Err(TreeError::MissingDestination {
                    name: self[id].to_string(),
                });
            }
            if let Some(node) = self.get_mut(id) {
                node.set_checked_flag(true);
            }
        } else {
            self.uncheck_all(id);
        }
        Ok(())
    }

    /// Checks the node and every descendant that can be checked. Returns
    /// the number of nodes that changed.
    pub fn check_all(&mut self, id: NodeId) -> usize {
        let targets: Vec<NodeId> = self
            .depth_first(id)
            .filter(|&n| !self[n].checked() && self.can_check(n))
            .collect();
        for &n in &targets {
            if let Some(node) = self.get_mut(n) {
                node.set_checked_flag(true);
            }
        }
        targets.len()
    }

    /// Unchecks the node and all descendants. Returns the number of nodes
    /// that changed.
    pub fn uncheck_all(&mut self, id: NodeId) -> usize {
        let targets: Vec<NodeId> = self.depth_first(id).filter(|&n| self[n].checked()).collect();
        for &n in &targets {
            if let Some(node) = self.get_mut(n) {
                node.set_checked_flag(false);
            }
        }
        targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ModNode, ModSubtree};

    fn placed_mod() -> (ModForest, NodeId) {
        let subtree = ModSubtree::new(ModNode::folder("foo.zip", "Foo")).with_children(vec![
            ModSubtree::new(ModNode::folder("GameData", "GameData").with_destination("GameData"))
                .with_children(vec![
                    ModSubtree::new(ModNode::file("GameData/a.cfg", "a.cfg")),
                    ModSubtree::new(ModNode::file("GameData/b.cfg", "b.cfg")),
                ]),
            ModSubtree::new(ModNode::file("readme.txt", "readme.txt")),
        ]);
        let mut forest = ModForest::new();
        let root = forest.add_mod(subtree).unwrap();
        (forest, root)
    }

    #[test]
    fn test_check_requires_destination() {
        let (mut forest, root) = placed_mod();
        let readme = forest.find_child_by_key(root, "readme.txt").unwrap();
        let cfg = forest.find_in_subtree(root, "GameData/a.cfg").unwrap();

        assert!(matches!(
            forest.set_checked(readme, true),
            Err(TreeError::MissingDestination { .. })
        ));
        // Inherits the destination of GameData.
        forest.set_checked(cfg, true).unwrap();
        // Root has no destination itself but something below it does.
        forest.set_checked(root, true).unwrap();
        assert!(forest[root].checked());
    }

    #[test]
    fn test_check_does_not_cascade() {
        let (mut forest, root) = placed_mod();
        let game_data = forest.find_child_by_key(root, "GameData").unwrap();
        forest.set_checked(game_data, true).unwrap();
        assert!(forest.descendants(game_data).all(|d| !forest[d].checked()));
        assert_eq!(forest.desired_state(game_data), DesiredState::Mixed);
    }

    #[test]
    fn test_uncheck_cascades() {
        let (mut forest, root) = placed_mod();
        let changed = forest.check_all(root);
        // root, GameData and both files; readme has nowhere to go
        assert_eq!(changed, 4);
        assert_eq!(forest.desired_state(forest.find_child_by_key(root, "GameData").unwrap()), DesiredState::Checked);

        forest.set_checked(root, false).unwrap();
        assert!(forest.depth_first(root).all(|d| !forest[d].checked()));
        assert_eq!(forest.desired_state(root), DesiredState::Unchecked);
    }

    #[test]
    fn test_helpers_exclude_self() {
        let (forest, root) = placed_mod();
        let game_data = forest.find_child_by_key(root, "GameData").unwrap();
        assert!(forest.has_destination_for_children(root));
        assert!(!forest.has_destination_for_children(game_data));
        assert!(!forest.has_installed_children(root));
    }
}
