//! Destination assignment and resolution for mod nodes.
//!
//! A node's destination is the install-root-relative path its content is
//! copied to. Destinations set by the user are `Explicit`; destinations the
//! engine computes from an ancestor are `Derived` and get recomputed (or
//! cleared) whenever that ancestor changes.

use crate::layout::placement_for;
use crate::paths::{clean_relative, join_relative};
use crate::tree::{DestinationSource, ModForest, NodeId, TreeError};
use tracing::debug;

/// Own destination if set, otherwise the nearest placed ancestor's
/// destination joined with the names leading down to `id`. Empty when
/// nothing above is placed.
pub fn resolve_destination(forest: &ModForest, id: NodeId) -> String {
    let Some(node) = forest.get(id) else {
        return String::new();
    };
    if node.has_destination() {
        return node.destination().to_string();
    }
    for ancestor in forest.ancestors(id) {
        let placed = &forest[ancestor];
        if placed.has_destination() {
            return match forest.relative_path(ancestor, id) {
                Some(rel) => join_relative(placed.destination(), &rel),
                None => String::new(),
            };
        }
    }
    String::new()
}

fn refuse_if_installed(forest: &ModForest, id: NodeId) -> Result<(), TreeError> {
    let node = forest.get(id).ok_or(TreeError::UnknownNode(id))?;
    if node.is_installed() || forest.has_installed_children(id) {
        return Err(TreeError::NodeInstalled {
            name: node.to_string(),
        });
    }
    Ok(())
}

/// Places `id` into the target folder `destination`.
///
/// With `copy_content_only` a folder's content merges into the target
/// (its destination becomes `destination`); otherwise the node lands
/// inside it as `destination/name`. Files always land as
/// `destination/name`. Derived descendants follow as `parent/childName`;
/// descendants with an explicit destination keep it.
pub fn set_destination_recursive(
    forest: &mut ModForest,
    id: NodeId,
    destination: &str,
    copy_content_only: bool,
) -> Result<(), TreeError> {
    refuse_if_installed(forest, id)?;
    let target = clean_relative(destination);
    if target.is_empty() && copy_content_only {
        return reset_destination(forest, id);
    }

    let node = &forest[id];
    let own = if node.is_file() || !copy_content_only {
        join_relative(&target, &node.name)
    } else {
        target
    };
    debug!("Placing {} at '{}'", node, own);

    if let Some(node) = forest.get_mut(id) {
        node.set_destination(own, DestinationSource::Explicit);
    }
    derive_children(forest, id);
    Ok(())
}

/// Recomputes derived destinations below `id` from its destination.
pub(crate) fn derive_children(forest: &mut ModForest, id: NodeId) {
    let base = forest[id].destination().to_string();
    let children = forest.children(id).to_vec();
    for child in children {
        let node = &forest[child];
        if node.destination_source() == DestinationSource::Explicit && node.has_destination() {
            continue;
        }
        let derived = if base.is_empty() {
            String::new()
        } else {
            join_relative(&base, &node.name)
        };
        if let Some(node) = forest.get_mut(child) {
            node.set_destination(derived, DestinationSource::Derived);
        }
        derive_children(forest, child);
    }
}

/// Takes the placement of `id` back.
///
/// An explicit destination is dropped and the node falls back to what its
/// parent derives for it, if anything. A node without an explicit
/// destination only has the placement it inherits, so every placed
/// ancestor is reset as well and the node ends up unplaced. Affected
/// nodes are unchecked; explicitly placed descendants keep their
/// destination.
pub fn reset_destination(forest: &mut ModForest, id: NodeId) -> Result<(), TreeError> {
    let node = forest.get(id).ok_or(TreeError::UnknownNode(id))?;
    let explicit = node.has_destination() && node.destination_source() == DestinationSource::Explicit;
    let placed: Vec<NodeId> = if explicit {
        Vec::new()
    } else {
        forest
            .ancestors(id)
            .filter(|&a| forest[a].has_destination())
            .collect()
    };
    refuse_if_installed(forest, id)?;
    for &ancestor in &placed {
        refuse_if_installed(forest, ancestor)?;
    }

    for &ancestor in placed.iter().rev() {
        debug!("Unplacing {}", forest[ancestor]);
        clear_placement(forest, ancestor);
    }
    clear_placement(forest, id);

    if explicit {
        let inherited = forest
            .parent(id)
            .map(|parent| resolve_destination(forest, parent))
            .unwrap_or_default();
        if !inherited.is_empty() {
            let own = join_relative(&inherited, &forest[id].name);
            if let Some(node) = forest.get_mut(id) {
                node.set_destination(own, DestinationSource::Derived);
            }
            derive_children(forest, id);
        }
    }
    Ok(())
}

fn clear_placement(forest: &mut ModForest, id: NodeId) {
    if let Some(node) = forest.get_mut(id) {
        node.set_destination(String::new(), DestinationSource::Derived);
    }
    clear_derived(forest, id);
}

fn clear_derived(forest: &mut ModForest, id: NodeId) {
    if let Some(node) = forest.get_mut(id) {
        node.set_checked_flag(false);
    }
    let children = forest.children(id).to_vec();
    for child in children {
        let node = &forest[child];
        if node.destination_source() == DestinationSource::Explicit && node.has_destination() {
            continue;
        }
        if let Some(node) = forest.get_mut(child) {
            node.set_destination(String::new(), DestinationSource::Derived);
        }
        clear_derived(forest, child);
    }
}

/// Places the top-most folders of a freshly added mod whose names match a
/// game directory (`GameData`, `Ships`, ...). Returns the number of
/// folders placed.
pub fn auto_place(forest: &mut ModForest, root: NodeId) -> usize {
    let mut placed = 0;
    let mut pending = forest.children(root).to_vec();
    while let Some(id) = pending.pop() {
        let node = &forest[id];
        if node.has_destination() {
            continue;
        }
        let target = if node.is_file() { None } else { placement_for(&node.name) };
        match target {
            Some(target) => {
                if set_destination_recursive(forest, id, target, true).is_ok() {
                    placed += 1;
                }
            }
            None => pending.extend(forest.children(id).iter().copied()),
        }
    }
    placed
}
