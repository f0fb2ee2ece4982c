//! GameData scan: adopt installed folders no known mod accounts for.
//!
//! Every directory directly under `GameData` that is not the game's own
//! content and not the resolved destination of a known node becomes a new
//! mod. The adopted mod's root is the folder itself (its key is the
//! absolute path, so it can serve as its own source); its entries mirror
//! what is on disk.

use crate::destination::resolve_destination;
use crate::filesystem::{FileSystem, FsError};
use crate::layout::is_scan_ignored;
use crate::paths::{join_relative, normalize_for_lookup};
use crate::progress::{CancelToken, ProgressReporter};
use crate::tree::{ModForest, ModNode, ModSubtree};
use std::collections::HashSet;
use tracing::{debug, info};

pub const GAME_DATA: &str = "GameData";

/// Folders found by a scan, ready to be added as mods.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub adopted: Vec<ModSubtree>,
    pub errors: Vec<FsError>,
    pub cancelled: bool,
}

/// Lists unknown GameData folders and builds a mod tree for each.
pub fn scan_game_data(
    forest: &ModForest,
    fs: &dyn FileSystem,
    cancel: &CancelToken,
    progress: &ProgressReporter,
) -> Result<ScanReport, FsError> {
    progress.started("scan");
    let known: HashSet<String> = forest
        .iter()
        .map(|id| resolve_destination(forest, id))
        .filter(|d| !d.is_empty())
        .map(|d| normalize_for_lookup(&d))
        .collect();

    let mut report = ScanReport::default();
    if !fs.exists(GAME_DATA)? {
        info!("No {} directory below {}", GAME_DATA, fs.root().display());
        return Ok(report);
    }

    for entry in fs.list_entries(GAME_DATA)? {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        progress.node_done();
        if !entry.is_dir || is_scan_ignored(&entry.name) {
            continue;
        }
        let destination = join_relative(GAME_DATA, &entry.name);
        if known.contains(&normalize_for_lookup(&destination)) {
            continue;
        }

        let key = fs.absolute(&destination)?.to_string_lossy().into_owned();
        let root = ModNode::folder(key, entry.name.clone()).with_destination(&destination);
        match read_folder(fs, &destination, "") {
            Ok(children) => {
                debug!("Adopting {}", destination);
                report.adopted.push(ModSubtree::new(root).with_children(children));
            }
            Err(e) => report.errors.push(e),
        }
    }
    info!("Scan found {} unknown folders", report.adopted.len());
    Ok(report)
}

/// Mirrors a directory as child nodes. Keys are relative to the adopted
/// folder; destinations are left to derivation from the root.
fn read_folder(fs: &dyn FileSystem, destination: &str, prefix: &str) -> Result<Vec<ModSubtree>, FsError> {
    let mut children = Vec::new();
    for entry in fs.list_entries(destination)? {
        let key = join_relative(prefix, &entry.name);
        if entry.is_dir {
            let grandchildren = read_folder(fs, &join_relative(destination, &entry.name), &key)?;
            children.push(ModSubtree::new(ModNode::folder(key, entry.name)).with_children(grandchildren));
        } else {
            children.push(ModSubtree::new(ModNode::file(key, entry.name)));
        }
    }
    Ok(children)
}
