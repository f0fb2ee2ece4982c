//! The session: one install root, its catalog, and the mod forest.
//!
//! A [`ModSession`] owns every piece of mutable state. Long operations
//! (refresh, process, remove, scan, updates) borrow the forest on a
//! worker thread and hand back plain data, which is applied here once the
//! worker has joined. Taking `&mut self` keeps operations from overlapping.

mod log;
mod updates;
mod worker;

pub use log::{LogEntry, LogLevel, OperationLog};

use crate::archive::{build_mod_subtree, file_count, ArchiveSources, SourceProvider};
use crate::catalog::{self, Catalog, CatalogError, CatalogSettings};
use crate::collision::{Collision, CollisionIndex};
use crate::destination::{auto_place, reset_destination, set_destination_recursive};
use crate::filesystem::{FileSystem, LocalFs};
use crate::install::{InstallExecutor, NodeOutcome, ProcessReport};
use crate::layout::GameLayout;
use crate::paths::paths_equal;
use crate::progress::{CancelToken, ProgressSink};
use crate::reconcile::{apply_states, compute_states, ReconcileReport};
use crate::scan;
use crate::settings::Settings;
use crate::tree::{ModForest, NodeId, TreeError};
use crate::update::{ModInfo, SiteHandler, SiteHandlerRegistry};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use worker::run_on_worker;

/// Timestamp format of `add_date`.
const ADD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ModSession {
    settings: Settings,
    layout: GameLayout,
    fs: Arc<dyn FileSystem>,
    sources: Arc<dyn SourceProvider>,
    forest: ModForest,
    catalog_path: PathBuf,
    catalog_settings: CatalogSettings,
    handlers: SiteHandlerRegistry,
    cancel: CancelToken,
    log: OperationLog,
}

impl ModSession {
    /// Empty session on the local filesystem below `settings.install_root`.
    pub fn new(settings: Settings) -> Self {
        let fs = Arc::new(LocalFs::new(&settings.install_root));
        let sources = Arc::new(ArchiveSources::new(settings.download_dir()));
        Self::with_backends(settings, fs, sources)
    }

    pub fn with_backends(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        sources: Arc<dyn SourceProvider>,
    ) -> Self {
        let layout = GameLayout::new(settings.extra_game_dirs.iter());
        let catalog_path = settings.catalog_path();
        Self {
            settings,
            layout,
            fs,
            sources,
            forest: ModForest::new(),
            catalog_path,
            catalog_settings: CatalogSettings::default(),
            handlers: SiteHandlerRegistry::new(),
            cancel: CancelToken::new(),
            log: OperationLog::new(),
        }
    }

    /// Loads the catalog and refreshes installed state from disk.
    pub fn open(settings: Settings, sink: &dyn ProgressSink) -> Self {
        let mut session = Self::new(settings);
        session.load_catalog();
        session.refresh(sink);
        session
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn forest(&self) -> &ModForest {
        &self.forest
    }

    pub fn layout(&self) -> &GameLayout {
        &self.layout
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut OperationLog {
        &mut self.log
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    /// A handle that stops the running operation between nodes.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn register_site_handler(&mut self, handler: Arc<dyn SiteHandler>) {
        self.handlers.register(handler);
    }

    /// Root mods in catalog order.
    pub fn mods(&self) -> &[NodeId] {
        self.forest.roots()
    }

    /// Finds a root mod by key, product id, or (case-insensitive) name.
    pub fn find_mod(&self, query: &str) -> Option<NodeId> {
        let roots = self.forest.roots();
        roots
            .iter()
            .copied()
            .find(|&id| self.forest[id].key == query)
            .or_else(|| {
                roots
                    .iter()
                    .copied()
                    .find(|&id| self.forest[id].product_id() == query && !query.is_empty())
            })
            .or_else(|| {
                roots
                    .iter()
                    .copied()
                    .find(|&id| self.forest[id].name.eq_ignore_ascii_case(query))
            })
    }

    /// Finds a mod (`Name`) or one of its entries (`Name/entry/path`).
    pub fn find_node(&self, query: &str) -> Option<NodeId> {
        if let Some(id) = self.find_mod(query) {
            return Some(id);
        }
        let (head, entry) = query.split_once('/')?;
        let root = self.find_mod(head)?;
        self.forest.find_in_subtree(root, entry).or_else(|| {
            self.forest
                .descendants(root)
                .find(|&id| paths_equal(&self.forest[id].key, entry))
        })
    }

    /// Replaces the forest with the catalog's content. Load problems are
    /// logged and returned; the session continues with what could be read.
    pub fn load_catalog(&mut self) -> Vec<CatalogError> {
        let outcome = catalog::load(&self.catalog_path);
        self.forest.clear();
        for subtree in outcome.catalog.mods {
            let name = subtree.node.to_string();
            if let Err(e) = self.forest.add_mod(subtree) {
                self.log.warn(format!("Skipping catalog entry {}: {}", name, e));
            }
        }
        self.catalog_settings = outcome.catalog.settings;
        for error in &outcome.errors {
            self.log.error(format!("Catalog {}: {}", self.catalog_path.display(), error));
        }
        self.log.info(format!(
            "Loaded {} mods from {}",
            self.forest.roots().len(),
            self.catalog_path.display()
        ));
        outcome.errors
    }

    pub fn save_catalog(&mut self) -> Result<()> {
        if !self.settings.download_path.is_empty() {
            self.catalog_settings.download_path = self.settings.download_path.clone();
        }
        let catalog = Catalog::from_forest(&self.forest, self.catalog_settings.clone());
        catalog::save(&self.catalog_path, &catalog)
            .with_context(|| format!("Failed to save catalog {}", self.catalog_path.display()))?;
        self.log.info(format!("Saved catalog {}", self.catalog_path.display()));
        Ok(())
    }

    /// Re-reads installed state of every mod from disk.
    pub fn refresh(&mut self, sink: &dyn ProgressSink) -> ReconcileReport {
        self.cancel.reset();
        let roots = self.forest.roots().to_vec();
        let report = self.refresh_roots(&roots, sink);
        sink.finished(
            &format!(
                "{} of {} nodes installed",
                report.installed_count(),
                report.processed
            ),
            None,
        );
        report
    }

    fn refresh_roots(&mut self, roots: &[NodeId], sink: &dyn ProgressSink) -> ReconcileReport {
        let total = subtree_size(&self.forest, roots);
        let (forest, fs, layout, cancel) = (&self.forest, self.fs.as_ref(), &self.layout, &self.cancel);
        let report = run_on_worker(total, sink, |progress| {
            compute_states(forest, roots, fs, layout, cancel, progress)
        });
        apply_states(&mut self.forest, &report);

        for failure in &report.errors {
            self.log.warn(format!(
                "Could not check {} at '{}': {}",
                failure.name, failure.destination, failure.error
            ));
        }
        if report.cancelled {
            self.log.warn("Refresh cancelled");
        }
        report
    }

    /// Adds a mod from a ZIP archive or folder. Top-level folders named
    /// like a game directory are placed automatically.
    pub fn add_mod(&mut self, path: &Path, info: Option<&ModInfo>) -> Result<NodeId> {
        let source = path
            .canonicalize()
            .with_context(|| format!("Mod source not found: {}", path.display()))?;
        let name = info.map(|i| i.name.as_str()).filter(|n| !n.is_empty());
        let mut subtree = build_mod_subtree(&source, name)
            .with_context(|| format!("Failed to read {}", source.display()))?;

        if let Some(info) = info {
            info.apply_to(&mut subtree.node);
        }
        subtree.node.metadata.add_date = chrono::Local::now().format(ADD_DATE_FORMAT).to_string();
        let files = file_count(&subtree);
        let display = subtree.node.to_string();

        let id = self
            .forest
            .add_mod(subtree)
            .with_context(|| format!("Cannot add {}", display))?;
        let placed = auto_place(&mut self.forest, id);
        self.log.info(format!(
            "Added {} ({} files, {} folders placed)",
            display, files, placed
        ));
        Ok(id)
    }

    pub fn set_checked(&mut self, id: NodeId, checked: bool) -> Result<(), TreeError> {
        self.forest.set_checked(id, checked)
    }

    pub fn check_all(&mut self, id: NodeId) -> usize {
        self.forest.check_all(id)
    }

    pub fn uncheck_all(&mut self, id: NodeId) -> usize {
        self.forest.uncheck_all(id)
    }

    /// Changes the desired state of `id` and makes its mod match on disk
    /// right away. Opening a session reconciles `checked` with what is
    /// installed, so a desired state left unprocessed does not survive
    /// into the next session. With `recursive`, checking also checks every
    /// placeable descendant; unchecking always cascades.
    pub fn apply_checked(
        &mut self,
        id: NodeId,
        checked: bool,
        recursive: bool,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessReport, TreeError> {
        if checked && recursive {
            if !self.forest.contains(id) {
                return Err(TreeError::UnknownNode(id));
            }
            let changed = self.forest.check_all(id);
            debug!("Checked {} entries of {}", changed, self.forest[id]);
        } else {
            self.forest.set_checked(id, checked)?;
        }
        let root = self.forest.zip_root(id);
        Ok(self.process_mods(&[root], sink))
    }

    pub fn set_destination(
        &mut self,
        id: NodeId,
        destination: &str,
        copy_content_only: bool,
    ) -> Result<(), TreeError> {
        set_destination_recursive(&mut self.forest, id, destination, copy_content_only)
    }

    pub fn reset_destination(&mut self, id: NodeId) -> Result<(), TreeError> {
        reset_destination(&mut self.forest, id)
    }

    /// Checked files that would overwrite each other.
    pub fn collisions(&self) -> Vec<Collision> {
        CollisionIndex::build(&self.forest).collisions()
    }

    /// One-line description naming the mods involved.
    pub fn describe_collision(&self, collision: &Collision) -> String {
        let mods: Vec<String> = collision
            .nodes
            .iter()
            .filter_map(|&id| self.forest.get(self.forest.zip_root(id)))
            .map(|root| root.to_string())
            .collect();
        format!("'{}' is claimed by {}", collision.destination, mods.join(", "))
    }

    /// Makes the disk match the checked state of every mod.
    pub fn process_all(&mut self, sink: &dyn ProgressSink) -> ProcessReport {
        let roots = self.forest.roots().to_vec();
        self.process_mods(&roots, sink)
    }

    /// Makes the disk match the checked state of the given mods, then
    /// refreshes them.
    pub fn process_mods(&mut self, roots: &[NodeId], sink: &dyn ProgressSink) -> ProcessReport {
        self.cancel.reset();
        if self.settings.warn_on_collisions {
            for collision in self.collisions() {
                let message = self.describe_collision(&collision);
                self.log.warn(message);
            }
        }
        let report = self.run_process(roots, sink);
        self.refresh_roots(roots, sink);
        sink.finished(&report.summary(), None);
        report
    }

    fn run_process(&mut self, roots: &[NodeId], sink: &dyn ProgressSink) -> ProcessReport {
        let total = subtree_size(&self.forest, roots);
        let executor = InstallExecutor {
            fs: self.fs.as_ref(),
            sources: self.sources.as_ref(),
            layout: &self.layout,
            override_existing: self.settings.override_existing,
            cancel: &self.cancel,
        };
        let forest = &self.forest;
        let report = run_on_worker(total, sink, |progress| {
            let mut running_count = 0;
            executor.process_mods(forest, roots, &mut running_count, progress)
        });

        for result in &report.outcomes {
            if let NodeOutcome::Failed(reason) = &result.outcome {
                self.log.error(format!("{} ({}): {}", result.name, result.destination, reason));
            }
        }
        if report.cancelled {
            self.log.warn("Processing cancelled");
        }
        self.log.info(report.summary());
        report
    }

    /// Uninstalls the mods the given nodes belong to and drops them from
    /// the forest. A mod that still has files on disk afterwards is kept.
    pub fn remove_mods(&mut self, ids: &[NodeId], sink: &dyn ProgressSink) -> ProcessReport {
        self.cancel.reset();
        let mut roots: Vec<NodeId> = Vec::new();
        for &id in ids {
            if !self.forest.contains(id) {
                continue;
            }
            let root = self.forest.zip_root(id);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        for &root in &roots {
            self.forest.uncheck_all(root);
        }

        let report = self.run_process(&roots, sink);
        self.refresh_roots(&roots, sink);
        if report.cancelled {
            sink.finished(&report.summary(), Some("cancelled"));
            return report;
        }

        for root in roots {
            let name = self.forest[root].to_string();
            if self.forest[root].is_installed() || self.forest.has_installed_children(root) {
                self.log
                    .warn(format!("{} still has installed files and was kept", name));
                continue;
            }
            if self.forest.remove_mod(root).is_some() {
                self.log.info(format!("Removed {}", name));
            }
        }
        sink.finished(&report.summary(), None);
        report
    }

    /// Adopts unknown GameData folders as mods.
    pub fn scan_game_data(&mut self, sink: &dyn ProgressSink) -> Result<Vec<NodeId>> {
        self.cancel.reset();
        let (forest, fs, cancel) = (&self.forest, self.fs.as_ref(), &self.cancel);
        let report = run_on_worker(0, sink, |progress| {
            scan::scan_game_data(forest, fs, cancel, progress)
        })
        .context("GameData scan failed")?;

        for error in &report.errors {
            self.log.warn(format!("Scan: {}", error));
        }
        let mut added = Vec::new();
        for subtree in report.adopted {
            let name = subtree.node.to_string();
            match self.forest.add_mod(subtree) {
                Ok(id) => {
                    self.log.info(format!("Adopted {}", name));
                    added.push(id);
                }
                Err(e) => self.log.warn(format!("Cannot adopt {}: {}", name, e)),
            }
        }
        self.refresh_roots(&added, sink);
        sink.finished(&format!("Adopted {} folders", added.len()), None);
        Ok(added)
    }

    /// Directory downloads go to: the configured one, else the folder of
    /// the mod's current source, else the install root.
    fn download_dir_for(&self, id: NodeId) -> PathBuf {
        if let Some(dir) = self.settings.download_dir() {
            return dir;
        }
        if !self.catalog_settings.download_path.is_empty() {
            return PathBuf::from(&self.catalog_settings.download_path);
        }
        self.forest
            .get(id)
            .and_then(|node| Path::new(&node.key).parent().map(Path::to_path_buf))
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| self.fs.root().to_path_buf())
    }
}

/// Node count below `roots`, roots included.
fn subtree_size(forest: &ModForest, roots: &[NodeId]) -> usize {
    roots.iter().map(|&r| forest.depth_first(r).count()).sum()
}
