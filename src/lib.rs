//! modkeeper - mod selection and install manager for Kerbal Space Program
//!
//! Mods (ZIP archives or unpacked folders) are kept as trees of entries.
//! Each entry can be placed at a destination below the game directory and
//! checked for installation; processing makes the disk match, and the
//! whole selection is persisted in an XML catalog.

pub mod archive;
pub mod catalog;
pub mod collision;
pub mod destination;
pub mod filesystem;
pub mod install;
pub mod layout;
pub mod paths;
pub mod progress;
pub mod reconcile;
pub mod scan;
pub mod session;
pub mod settings;
pub mod tree;
pub mod update;
