//! Path handling for install-root-relative destinations.
//!
//! Catalogs written on Windows store destinations with backslashes and
//! arbitrary casing. This module handles:
//! - Converting `\` to `/` for filesystem operations
//! - Case-insensitive comparisons and lookups
//! - Joining destination segments without doubled separators

use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Convert Windows path separators to forward slashes
/// `GameData\Foo\part.cfg` -> `GameData/Foo/part.cfg`
pub fn to_linux_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Normalize a destination for storage: forward slashes, no leading,
/// trailing or doubled separators.
pub fn clean_relative(path: &str) -> String {
    to_linux_path(path)
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a path for lookups and comparisons (NFC, lowercase, forward slashes, trimmed)
pub fn normalize_for_lookup(path: &str) -> String {
    clean_relative(path).nfc().collect::<String>().to_lowercase()
}

/// Check if two paths are equal (case-insensitive)
pub fn paths_equal(a: &str, b: &str) -> bool {
    normalize_for_lookup(a) == normalize_for_lookup(b)
}

/// Join two relative segments with a single `/`.
/// An empty base yields the segment unchanged.
pub fn join_relative(base: &str, segment: &str) -> String {
    let base = clean_relative(base);
    let segment = clean_relative(segment);
    match (base.is_empty(), segment.is_empty()) {
        (true, _) => segment,
        (false, true) => base,
        (false, false) => format!("{base}/{segment}"),
    }
}

/// Returns true if the relative path stays inside its root
/// (no `..`, no absolute components).
pub fn is_contained(relative: &str) -> bool {
    Path::new(&to_linux_path(relative))
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Find a file case-insensitively within a directory
///
/// Given a base directory and a relative path like `GameData\Foo\Parts`,
/// finds the actual entry even if the real path is `gamedata/foo/parts`
pub fn resolve_case_insensitive(base: &Path, relative: &str) -> Option<PathBuf> {
    let components: Vec<&str> = relative
        .split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .collect();

    if components.is_empty() {
        return Some(base.to_path_buf());
    }

    let mut current = base.to_path_buf();

    for component in components {
        let exact = current.join(component);
        if exact.exists() {
            current = exact;
            continue;
        }

        let target_lower = component.to_lowercase();
        let found = std::fs::read_dir(&current).ok()?.find_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name();
            if name.to_string_lossy().to_lowercase() == target_lower {
                Some(entry.path())
            } else {
                None
            }
        });

        current = found?;
    }

    Some(current)
}

/// Create parent directories for a path if they don't exist
pub fn ensure_parent_dirs(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Express an absolute path relative to `root` with forward slashes.
/// Returns `None` when `path` is not below `root`.
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(clean_relative(&rel.to_string_lossy()))
}
