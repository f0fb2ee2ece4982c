//! Directory name tables for the game install layout.

/// Directories of a stock game installation, relative to the install root.
/// The empty entry is the install root itself.
/// Folders resolving to one of these are "recognized game directories".
pub const GAME_DIRECTORIES: &[&str] = &[
    "",
    "GameData",
    "Ships",
    "Ships/VAB",
    "Ships/SPH",
    "Internals",
    "Kerbals",
    "Parts",
    "Plugins",
    "PluginData",
    "Resources",
    "Saves",
    "Scenarios",
    "Screenshots",
    "Sounds",
    "Spaces",
    "Training",
];

/// Archive folder names that map straight onto a game directory when a mod
/// is added. The key is the (lowercase) folder name found in the archive,
/// the value is the destination it is placed at.
pub const PLACEMENT_DIRECTORIES: &[(&str, &str)] = &[
    ("gamedata", "GameData"),
    ("ships", "Ships"),
    ("vab", "Ships/VAB"),
    ("sph", "Ships/SPH"),
    ("saves", "Saves"),
    ("scenarios", "Scenarios"),
    ("training", "Training"),
];

/// GameData folders that ship with the game and are never adopted as mods
/// by a GameData scan.
pub const SCAN_IGNORED_DIRECTORIES: &[&str] = &["squad", "squadexpansion", "myflags", "nasamission"];

/// Returns the placement destination for an archive folder name.
pub fn placement_for(folder_name: &str) -> Option<&'static str> {
    let lower = folder_name.to_lowercase();
    PLACEMENT_DIRECTORIES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, dest)| *dest)
}

/// Returns true if a GameData folder should be skipped by a scan.
pub fn is_scan_ignored(folder_name: &str) -> bool {
    let lower = folder_name.to_lowercase();
    SCAN_IGNORED_DIRECTORIES.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_for() {
        assert_eq!(placement_for("GameData"), Some("GameData"));
        assert_eq!(placement_for("GAMEDATA"), Some("GameData"));
        assert_eq!(placement_for("VAB"), Some("Ships/VAB"));
        assert_eq!(placement_for("Source"), None);
    }

    #[test]
    fn test_is_scan_ignored() {
        assert!(is_scan_ignored("Squad"));
        assert!(is_scan_ignored("NASAmission"));
        assert!(!is_scan_ignored("MechJeb2"));
    }
}
