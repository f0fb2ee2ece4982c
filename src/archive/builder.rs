//! Seeds a mod's node tree from a source's entry list.

use super::open_archive;
use crate::tree::{ModNode, ModSubtree};
use anyhow::Result;
use std::path::Path;
use tracing::debug;

/// Reads a ZIP archive or folder and builds the detached tree for a new
/// mod. The root's key is the source path; entry keys are their paths
/// inside the source. Folders missing from the entry list are created
/// from file paths.
pub fn build_mod_subtree(source: &Path, name: Option<&str>) -> Result<ModSubtree> {
    let mut reader = open_archive(source)?;
    let entries = reader.entries()?;

    let display_name = match name {
        Some(name) => name.to_string(),
        None => source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let mut root = ModSubtree::new(ModNode::folder(source.to_string_lossy(), display_name));

    for entry in &entries {
        insert_entry(&mut root, &entry.path, entry.is_dir);
    }
    debug!("Read {} entries from {}", entries.len(), source.display());
    Ok(root)
}

fn insert_entry(root: &mut ModSubtree, path: &str, is_dir: bool) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        let key = segments[..=i].join("/");
        let last = i + 1 == segments.len();
        if current.child(&key).is_none() {
            let node = if last && !is_dir {
                ModNode::file(key.clone(), *segment)
            } else {
                ModNode::folder(key.clone(), *segment)
            };
            current.children.push(ModSubtree::new(node));
        }
        let Some(next) = current.child_mut(&key) else {
            return;
        };
        current = next;
    }
}

/// Number of file entries in a built tree.
pub(crate) fn file_count(tree: &ModSubtree) -> usize {
    let mut count = 0;
    tree.walk(&mut |node| {
        if node.is_file() {
            count += 1;
        }
    });
    count
}
