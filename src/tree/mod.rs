//! In-memory model of mods and their archive entries.

mod checked;
mod forest;
mod node;

pub use checked::DesiredState;
pub use forest::{Ancestors, DepthFirst, ModForest, NodeId};
pub use node::{DestinationSource, ModMetadata, ModNode, ModSubtree, NodeType};

use thiserror::Error;

/// Structural and state-rule violations reported by the forest.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("An entry with key '{key}' already exists at this level")]
    DuplicateKey { key: String },

    #[error("Mod {product_id} from {site_handler} is already in the catalog")]
    DuplicateIdentity {
        product_id: String,
        site_handler: String,
    },

    #[error("Node has an empty key")]
    MissingIdentity,

    #[error("'{name}' has no destination")]
    MissingDestination { name: String },

    #[error("'{name}' is installed; uninstall it first")]
    NodeInstalled { name: String },

    #[error("A node cannot be moved below itself")]
    Cycle,

    #[error("Node {0} is not part of the forest")]
    UnknownNode(NodeId),
}
