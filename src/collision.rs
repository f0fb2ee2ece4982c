//! Collision detection between mods claiming the same destination.
//!
//! Only checked file nodes take part: two of them collide when they resolve
//! to the same destination (case-insensitive, either separator) and belong
//! to different mods. Files of the same mod landing on one path are a
//! deliberate merge, not a collision.

use crate::destination::resolve_destination;
use crate::paths::normalize_for_lookup;
use crate::tree::{ModForest, NodeId};
use std::collections::HashMap;

/// One contested destination and every checked file that targets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    /// Destination as resolved on the first claiming node.
    pub destination: String,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Claim {
    node: NodeId,
    zip_root: NodeId,
    destination: String,
}

/// Snapshot of checked file destinations, grouped by normalized path.
#[derive(Debug, Clone, Default)]
pub struct CollisionIndex {
    groups: HashMap<String, Vec<Claim>>,
    by_node: HashMap<NodeId, String>,
}

impl CollisionIndex {
    pub fn build(forest: &ModForest) -> Self {
        let mut index = Self::default();
        for id in forest.iter() {
            let node = &forest[id];
            if !node.checked() || !node.is_file() {
                continue;
            }
            let destination = resolve_destination(forest, id);
            if destination.is_empty() {
                continue;
            }
            let key = normalize_for_lookup(&destination);
            index.by_node.insert(id, key.clone());
            index.groups.entry(key).or_default().push(Claim {
                node: id,
                zip_root: forest.zip_root(id),
                destination,
            });
        }
        index
    }

    /// Nodes from other mods that claim the same destination as `id`.
    pub fn colliding_with(&self, id: NodeId) -> Vec<NodeId> {
        let Some(key) = self.by_node.get(&id) else {
            return Vec::new();
        };
        let Some(group) = self.groups.get(key) else {
            return Vec::new();
        };
        let Some(own_root) = group.iter().find(|c| c.node == id).map(|c| c.zip_root) else {
            return Vec::new();
        };
        group
            .iter()
            .filter(|c| c.zip_root != own_root)
            .map(|c| c.node)
            .collect()
    }

    pub fn collides(&self, a: NodeId, b: NodeId) -> bool {
        self.colliding_with(a).contains(&b)
    }

    /// True if some node strictly below `id` collides with another mod.
    pub fn has_child_collision(&self, forest: &ModForest, id: NodeId) -> bool {
        forest
            .descendants(id)
            .any(|d| !self.colliding_with(d).is_empty())
    }

    /// Every contested destination, ordered by destination.
    pub fn collisions(&self) -> Vec<Collision> {
        let mut out: Vec<Collision> = self
            .groups
            .values()
            .filter(|group| {
                group
                    .first()
                    .is_some_and(|first| group.iter().any(|c| c.zip_root != first.zip_root))
            })
            .map(|group| Collision {
                destination: group[0].destination.clone(),
                nodes: group.iter().map(|c| c.node).collect(),
            })
            .collect();
        out.sort_by(|a, b| a.destination.cmp(&b.destination));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.collisions().is_empty()
    }
}
