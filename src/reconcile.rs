//! Refreshes installed state from the live filesystem.
//!
//! The walk is split in two: [`compute_states`] only reads the forest and
//! probes the filesystem (safe to run on a worker thread), and
//! [`apply_states`] writes the results back on the thread that owns the
//! forest.

use crate::destination::resolve_destination;
use crate::filesystem::{FileSystem, FsError};
use crate::layout::GameLayout;
use crate::progress::{CancelToken, ProgressReporter};
use crate::tree::{ModForest, NodeId, NodeType};
use tracing::{debug, warn};

/// Observed state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeState {
    pub is_installed: bool,
    pub node_type: NodeType,
}

/// A probe that failed; the node was treated as not installed.
#[derive(Debug)]
pub struct ProbeFailure {
    pub node: NodeId,
    pub name: String,
    pub destination: String,
    pub error: FsError,
}

/// Result of a reconcile walk.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Computed states, children before parents.
    pub states: Vec<(NodeId, NodeState)>,
    pub processed: usize,
    pub errors: Vec<ProbeFailure>,
    pub cancelled: bool,
}

impl ReconcileReport {
    pub fn installed_count(&self) -> usize {
        self.states.iter().filter(|(_, s)| s.is_installed).count()
    }
}

struct Walk<'a> {
    forest: &'a ModForest,
    fs: &'a dyn FileSystem,
    layout: &'a GameLayout,
    cancel: &'a CancelToken,
    progress: &'a ProgressReporter,
    report: ReconcileReport,
}

impl Walk<'_> {
    /// Post-order visit; returns whether `id` is installed, or `None` when
    /// the walk was cancelled before the node was decided.
    fn visit(&mut self, id: NodeId) -> Option<bool> {
        let forest = self.forest;
        let mut children_installed = false;
        for &child in forest.children(id) {
            children_installed |= self.visit(child)?;
        }
        if self.cancel.is_cancelled() {
            self.report.cancelled = true;
            return None;
        }

        let node = &forest[id];
        let is_file = node.is_file();
        let destination = resolve_destination(forest, id);

        let state = if destination.is_empty() {
            NodeState {
                is_installed: false,
                node_type: NodeType::reconciled(is_file, false, false),
            }
        } else {
            let exists = match self.fs.exists(&destination) {
                Ok(exists) => exists,
                Err(error) => {
                    warn!("Could not probe {} at '{}': {}", node, destination, error);
                    self.report.errors.push(ProbeFailure {
                        node: id,
                        name: node.to_string(),
                        destination: destination.clone(),
                        error,
                    });
                    false
                }
            };
            if is_file {
                NodeState {
                    is_installed: exists,
                    node_type: NodeType::reconciled(true, false, exists),
                }
            } else {
                let game_dir = self.layout.classify_relative(&destination).is_recognized();
                let installed = if game_dir {
                    exists && children_installed
                } else {
                    exists || children_installed
                };
                NodeState {
                    is_installed: installed,
                    node_type: NodeType::reconciled(false, game_dir, installed),
                }
            }
        };

        debug!("{} -> {:?}", node, state);
        self.report.states.push((id, state));
        self.report.processed = self.progress.node_done();
        Some(state.is_installed)
    }
}

/// Computes the installed state of every node below `roots` without
/// touching the forest.
pub fn compute_states(
    forest: &ModForest,
    roots: &[NodeId],
    fs: &dyn FileSystem,
    layout: &GameLayout,
    cancel: &CancelToken,
    progress: &ProgressReporter,
) -> ReconcileReport {
    progress.started("refresh");
    let mut walk = Walk {
        forest,
        fs,
        layout,
        cancel,
        progress,
        report: ReconcileReport::default(),
    };
    for &root in roots {
        if walk.visit(root).is_none() {
            break;
        }
    }
    walk.report.processed = progress.count();
    walk.report
}

/// Writes computed states back: installed flag, node type, and `checked`
/// mirroring what is on disk. Stale ids are skipped.
pub fn apply_states(forest: &mut ModForest, report: &ReconcileReport) {
    for &(id, state) in &report.states {
        if let Some(node) = forest.get_mut(id) {
            node.set_installed(state.is_installed);
            node.set_node_type(state.node_type);
            node.set_checked_flag(state.is_installed);
        }
    }
}

/// Convenience for single-threaded callers: compute and apply in one go.
pub fn reconcile(
    forest: &mut ModForest,
    fs: &dyn FileSystem,
    layout: &GameLayout,
) -> ReconcileReport {
    let roots = forest.roots().to_vec();
    let report = compute_states(
        forest,
        &roots,
        fs,
        layout,
        &CancelToken::new(),
        &ProgressReporter::silent(forest.len()),
    );
    apply_states(forest, &report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::set_destination_recursive;
    use crate::filesystem::LocalFs;
    use crate::tree::{ModNode, ModSubtree};
    use std::fs;
    use tempfile::tempdir;

    fn sample_forest() -> (ModForest, NodeId) {
        let subtree = ModSubtree::new(ModNode::folder("foo.zip", "Foo")).with_children(vec![
            ModSubtree::new(ModNode::folder("GameData", "GameData")).with_children(vec![
                ModSubtree::new(ModNode::folder("GameData/Foo", "Foo")).with_children(vec![
                    ModSubtree::new(ModNode::file("GameData/Foo/a.cfg", "a.cfg")),
                ]),
            ]),
            ModSubtree::new(ModNode::file("readme.txt", "readme.txt")),
        ]);
        let mut forest = ModForest::new();
        let root = forest.add_mod(subtree).unwrap();
        let game_data = forest.find_child_by_key(root, "GameData").unwrap();
        set_destination_recursive(&mut forest, game_data, "GameData", true).unwrap();
        (forest, root)
    }

    fn snapshot(forest: &ModForest) -> Vec<(String, bool, bool, NodeType)> {
        forest
            .iter()
            .map(|id| {
                let n = &forest[id];
                (n.key.clone(), n.is_installed(), n.checked(), n.node_type())
            })
            .collect()
    }

    #[test]
    fn test_installed_file_and_strict_game_dir() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("GameData/Foo")).unwrap();
        fs::write(temp.path().join("GameData/Foo/a.cfg"), "x").unwrap();
        let lfs = LocalFs::new(temp.path());
        let (mut forest, root) = sample_forest();

        let report = reconcile(&mut forest, &lfs, &GameLayout::default());
        assert!(report.errors.is_empty());
        assert_eq!(report.processed, 5);

        let cfg = forest.find_in_subtree(root, "GameData/Foo/a.cfg").unwrap();
        let game_data = forest.find_child_by_key(root, "GameData").unwrap();
        let readme = forest.find_child_by_key(root, "readme.txt").unwrap();
        assert!(forest[cfg].is_installed());
        assert!(forest[cfg].checked());
        assert_eq!(forest[cfg].node_type(), NodeType::UnknownFileInstalled);
        assert_eq!(forest[game_data].node_type(), NodeType::KspFolderInstalled);
        assert_eq!(forest[readme].node_type(), NodeType::UnknownFile);
        assert!(!forest[root].is_installed());
    }

    #[test]
    fn test_strict_vs_lenient_folders() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("GameData")).unwrap();
        let lfs = LocalFs::new(temp.path());
        let (mut forest, root) = sample_forest();
        let game_data = forest.find_child_by_key(root, "GameData").unwrap();
        let foo = forest.find_in_subtree(root, "GameData/Foo").unwrap();

        // GameData exists but holds nothing installed.
        reconcile(&mut forest, &lfs, &GameLayout::default());
        assert!(!forest[game_data].is_installed());
        assert_eq!(forest[game_data].node_type(), NodeType::KspFolder);
        assert!(!forest[foo].is_installed());

        // An arbitrary folder counts as soon as it exists, which in turn
        // satisfies the game directory.
        fs::create_dir_all(temp.path().join("GameData/Foo")).unwrap();
        reconcile(&mut forest, &lfs, &GameLayout::default());
        assert!(forest[foo].is_installed());
        assert_eq!(forest[foo].node_type(), NodeType::UnknownFolderInstalled);
        assert!(forest[game_data].is_installed());

        fs::remove_dir(temp.path().join("GameData/Foo")).unwrap();
        reconcile(&mut forest, &lfs, &GameLayout::default());
        assert!(!forest[foo].is_installed());
        assert!(!forest[game_data].is_installed());
    }

    #[test]
    fn test_empty_destination_is_never_installed() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("readme.txt"), "x").unwrap();
        let lfs = LocalFs::new(temp.path());
        let (mut forest, root) = sample_forest();

        reconcile(&mut forest, &lfs, &GameLayout::default());
        let readme = forest.find_child_by_key(root, "readme.txt").unwrap();
        assert!(!forest[readme].is_installed());
        assert!(!forest[readme].checked());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("GameData/Foo")).unwrap();
        fs::write(temp.path().join("GameData/Foo/a.cfg"), "x").unwrap();
        let lfs = LocalFs::new(temp.path());
        let (mut forest, _) = sample_forest();

        reconcile(&mut forest, &lfs, &GameLayout::default());
        let first = snapshot(&forest);
        reconcile(&mut forest, &lfs, &GameLayout::default());
        assert_eq!(first, snapshot(&forest));
    }

    #[test]
    fn test_probe_error_is_recorded_and_walk_continues() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("GameData/Foo")).unwrap();
        let lfs = LocalFs::new(temp.path());
        let (mut forest, root) = sample_forest();
        let readme = forest.find_child_by_key(root, "readme.txt").unwrap();
        forest
            .get_mut(readme)
            .unwrap()
            .set_destination("../outside.txt".into(), crate::tree::DestinationSource::Explicit);

        let report = reconcile(&mut forest, &lfs, &GameLayout::default());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].node, readme);
        assert_eq!(report.processed, 5);
        assert!(!forest[readme].is_installed());
    }

    #[test]
    fn test_cancelled_walk_stops_early() {
        let temp = tempdir().unwrap();
        let lfs = LocalFs::new(temp.path());
        let (forest, _) = sample_forest();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = compute_states(
            &forest,
            forest.roots(),
            &lfs,
            &GameLayout::default(),
            &cancel,
            &ProgressReporter::silent(forest.len()),
        );
        assert!(report.cancelled);
        assert!(report.states.is_empty());
    }
}
