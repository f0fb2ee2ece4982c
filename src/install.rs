//! Install/uninstall pass: makes the filesystem match the checked state.
//!
//! Install actions run on the way down (a folder exists before files are
//! written into it), removals on the way back up (a directory is emptied
//! before its own removal is attempted). A failing node is recorded and
//! the batch carries on.

use crate::archive::{ArchiveReader, SourceProvider};
use crate::destination::resolve_destination;
use crate::filesystem::{FileSystem, FsError};
use crate::layout::GameLayout;
use crate::progress::{CancelToken, ProgressReporter};
use crate::tree::{ModForest, NodeId};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The destination file exists and overwriting is off.
    ExistingDestination,
    /// Other content is still inside the directory.
    DirectoryNotEmpty,
    /// A checked file has nowhere to go.
    NoDestination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Installed,
    Removed,
    Skipped(SkipReason),
    Unchanged,
    Failed(String),
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeOutcome::Installed => write!(f, "installed"),
            NodeOutcome::Removed => write!(f, "removed"),
            NodeOutcome::Skipped(SkipReason::ExistingDestination) => {
                write!(f, "skipped (destination exists)")
            }
            NodeOutcome::Skipped(SkipReason::DirectoryNotEmpty) => {
                write!(f, "skipped (directory not empty)")
            }
            NodeOutcome::Skipped(SkipReason::NoDestination) => write!(f, "skipped (no destination)"),
            NodeOutcome::Unchanged => write!(f, "unchanged"),
            NodeOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResult {
    pub node: NodeId,
    pub name: String,
    pub destination: String,
    pub outcome: NodeOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    /// Every node visited that had something to do.
    pub outcomes: Vec<NodeResult>,
    /// Nodes visited in this batch.
    pub processed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl ProcessReport {
    pub fn count(&self, pred: impl Fn(&NodeOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn installed(&self) -> usize {
        self.count(|o| *o == NodeOutcome::Installed)
    }

    pub fn removed(&self) -> usize {
        self.count(|o| *o == NodeOutcome::Removed)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Skipped(_)))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} nodes processed: {} installed, {} removed, {} skipped, {} failed",
            self.processed,
            self.installed(),
            self.removed(),
            self.skipped(),
            self.failed
        )
    }
}

/// Runs install/uninstall passes against one install root.
pub struct InstallExecutor<'a> {
    pub fs: &'a dyn FileSystem,
    pub sources: &'a dyn SourceProvider,
    pub layout: &'a GameLayout,
    pub override_existing: bool,
    pub cancel: &'a CancelToken,
}

/// Lazily opened source of the mod being processed.
enum Source {
    Closed,
    Open(Box<dyn ArchiveReader>),
    Broken(String),
}

struct Batch<'a, 'b> {
    exec: &'b InstallExecutor<'a>,
    forest: &'b ModForest,
    root_key: String,
    source: Source,
    progress: &'b ProgressReporter,
    running_count: &'b mut usize,
    report: &'b mut ProcessReport,
}

impl InstallExecutor<'_> {
    /// Processes every node below `roots`. `running_count` carries the
    /// processed total across successive batches.
    pub fn process_mods(
        &self,
        forest: &ModForest,
        roots: &[NodeId],
        running_count: &mut usize,
        progress: &ProgressReporter,
    ) -> ProcessReport {
        progress.started("process");
        progress.set_count(*running_count);
        let mut report = ProcessReport::default();

        for &root in roots {
            if self.cancel.is_cancelled() {
                info!("Processing cancelled");
                report.cancelled = true;
                break;
            }
            let Some(node) = forest.get(root) else {
                continue;
            };
            let mut batch = Batch {
                exec: self,
                forest,
                root_key: forest[forest.zip_root(root)].key.clone(),
                source: Source::Closed,
                progress,
                running_count: &mut *running_count,
                report: &mut report,
            };
            debug!("Processing {}", node);
            batch.visit(root);
        }
        report
    }
}

impl Batch<'_, '_> {
    fn visit(&mut self, id: NodeId) {
        let forest = self.forest;
        let node = &forest[id];
        let destination = resolve_destination(forest, id);
        let install = node.checked() && !node.is_installed();
        let remove = !node.checked() && node.is_installed();

        if install {
            let outcome = self.install(id, &destination);
            self.record(id, &destination, outcome);
        }

        for &child in forest.children(id) {
            self.visit(child);
        }

        if remove {
            let outcome = self.remove(id, &destination);
            self.record(id, &destination, outcome);
        }

        *self.running_count += 1;
        self.report.processed += 1;
        self.progress.node_done();
    }

    fn record(&mut self, id: NodeId, destination: &str, outcome: NodeOutcome) {
        let name = self.forest[id].to_string();
        match &outcome {
            NodeOutcome::Failed(reason) => {
                warn!("{} ({}): {}", name, destination, reason);
                self.report.failed += 1;
            }
            NodeOutcome::Unchanged => return,
            other => debug!("{} ({}): {}", name, destination, other),
        }
        self.report.outcomes.push(NodeResult {
            node: id,
            name,
            destination: destination.to_string(),
            outcome,
        });
    }

    fn install(&mut self, id: NodeId, destination: &str) -> NodeOutcome {
        let forest = self.forest;
        let node = &forest[id];
        let fs = self.exec.fs;
        if destination.is_empty() {
            return if node.is_file() {
                NodeOutcome::Skipped(SkipReason::NoDestination)
            } else {
                NodeOutcome::Unchanged
            };
        }

        let exists = match fs.exists(destination) {
            Ok(exists) => exists,
            Err(e) => return NodeOutcome::Failed(e.to_string()),
        };

        if !node.is_file() {
            if exists {
                return NodeOutcome::Unchanged;
            }
            return match fs.create_dir(destination) {
                Ok(()) => NodeOutcome::Installed,
                Err(e) => NodeOutcome::Failed(e.to_string()),
            };
        }

        if exists && !self.exec.override_existing {
            return NodeOutcome::Skipped(SkipReason::ExistingDestination);
        }
        let entry = node.key.clone();
        let reader = match self.open_source() {
            Ok(reader) => reader,
            Err(reason) => return NodeOutcome::Failed(reason),
        };
        match reader.extract_to(&entry, fs, destination) {
            Ok(_) => NodeOutcome::Installed,
            Err(e) => NodeOutcome::Failed(format!("{e:#}")),
        }
    }

    fn open_source(&mut self) -> Result<&mut Box<dyn ArchiveReader>, String> {
        if let Source::Closed = self.source {
            self.source = match self.exec.sources.open(&self.root_key) {
                Ok(reader) => Source::Open(reader),
                Err(e) => Source::Broken(format!("{e:#}")),
            };
        }
        match &mut self.source {
            Source::Open(reader) => Ok(reader),
            Source::Broken(reason) => Err(reason.clone()),
            Source::Closed => Err(format!("Source {} is not open", self.root_key)),
        }
    }

    fn remove(&mut self, id: NodeId, destination: &str) -> NodeOutcome {
        let forest = self.forest;
        let node = &forest[id];
        let fs = self.exec.fs;
        if destination.is_empty() {
            return NodeOutcome::Unchanged;
        }
        let exists = match fs.exists(destination) {
            Ok(exists) => exists,
            Err(e) => return NodeOutcome::Failed(e.to_string()),
        };
        if !exists {
            return NodeOutcome::Unchanged;
        }

        if node.is_file() {
            return match fs.delete_file(destination) {
                Ok(()) => NodeOutcome::Removed,
                Err(e) => NodeOutcome::Failed(e.to_string()),
            };
        }

        // The game's own directories stay even when a mod empties them.
        if self.exec.layout.classify_relative(destination).is_recognized() {
            return NodeOutcome::Unchanged;
        }
        match remove_empty_tree(fs, destination) {
            Ok(()) => NodeOutcome::Removed,
            Err(FsError::DirectoryNotEmpty(_)) => NodeOutcome::Skipped(SkipReason::DirectoryNotEmpty),
            Err(e) => NodeOutcome::Failed(e.to_string()),
        }
    }
}

/// Removes a directory whose subtree holds no files. Leaves everything in
/// place when any file is found.
fn remove_empty_tree(fs: &dyn FileSystem, relative: &str) -> Result<(), FsError> {
    if holds_files(fs, relative)? {
        return Err(FsError::DirectoryNotEmpty(fs.absolute(relative)?));
    }
    remove_dirs(fs, relative)
}

fn holds_files(fs: &dyn FileSystem, relative: &str) -> Result<bool, FsError> {
    for entry in fs.list_entries(relative)? {
        let path = format!("{relative}/{}", entry.name);
        if !entry.is_dir || holds_files(fs, &path)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn remove_dirs(fs: &dyn FileSystem, relative: &str) -> Result<(), FsError> {
    for entry in fs.list_entries(relative)? {
        remove_dirs(fs, &format!("{relative}/{}", entry.name))?;
    }
    fs.delete_empty_dir(relative)
}
