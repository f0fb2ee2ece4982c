//! Attribute table shared by catalog load and save.
//!
//! Each entry maps one XML attribute of `<Mod>`/`<ModEntry>` onto a node
//! field. Load looks attributes up here (unknown names are ignored); save
//! walks the table in order and leaves out optional fields that are empty.

use crate::tree::{DestinationSource, ModNode, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Presence {
    /// Always written.
    Always,
    /// Written only when non-empty.
    NonEmpty,
}

pub(crate) struct Field {
    pub name: &'static str,
    pub presence: Presence,
    pub get: fn(&ModNode) -> String,
    pub set: fn(&mut ModNode, String),
}

fn bool_attr(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

pub(crate) const FIELDS: &[Field] = &[
    Field {
        name: "Key",
        presence: Presence::Always,
        get: |n| n.key.clone(),
        set: |n, v| n.key = v,
    },
    Field {
        name: "Name",
        presence: Presence::Always,
        get: |n| n.name.clone(),
        set: |n, v| n.name = v,
    },
    Field {
        name: "NodeType",
        presence: Presence::Always,
        get: |n| n.node_type().code().to_string(),
        set: |n, v| {
            let parsed = v.trim().parse().ok().and_then(NodeType::from_code);
            n.set_node_type(parsed.unwrap_or_default());
        },
    },
    Field {
        name: "Checked",
        presence: Presence::Always,
        get: |n| bool_attr(n.checked()),
        set: |n, v| n.set_checked_flag(v.trim().eq_ignore_ascii_case("true")),
    },
    Field {
        name: "AddDate",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.add_date.clone(),
        set: |n, v| n.metadata.add_date = v,
    },
    Field {
        name: "Version",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.version.clone(),
        set: |n, v| n.metadata.version = v,
    },
    Field {
        name: "GameVersion",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.game_version.clone(),
        set: |n, v| n.metadata.game_version = v,
    },
    Field {
        name: "Note",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.note.clone(),
        set: |n, v| n.metadata.note = v,
    },
    Field {
        name: "ProductID",
        presence: Presence::NonEmpty,
        get: |n| n.product_id().to_string(),
        set: |n, v| {
            let handler = n.site_handler_name().to_string();
            n.set_identity_fields(v, handler);
        },
    },
    Field {
        name: "CreationDate",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.creation_date.clone(),
        set: |n, v| n.metadata.creation_date = v,
    },
    Field {
        name: "ChangeDate",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.change_date.clone(),
        set: |n, v| n.metadata.change_date = v,
    },
    Field {
        name: "Author",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.author.clone(),
        set: |n, v| n.metadata.author = v,
    },
    Field {
        name: "Rating",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.rating.clone(),
        set: |n, v| n.metadata.rating = v,
    },
    Field {
        name: "Downloads",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.downloads.clone(),
        set: |n, v| n.metadata.downloads = v,
    },
    Field {
        name: "ModURL",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.mod_url.clone(),
        set: |n, v| n.metadata.mod_url = v,
    },
    Field {
        name: "AdditionalURL",
        presence: Presence::NonEmpty,
        get: |n| n.metadata.additional_url.clone(),
        set: |n, v| n.metadata.additional_url = v,
    },
    Field {
        name: "SiteHandlerName",
        presence: Presence::NonEmpty,
        get: |n| n.site_handler_name().to_string(),
        set: set_site_handler,
    },
    Field {
        name: "Destination",
        presence: Presence::NonEmpty,
        get: |n| n.destination().to_string(),
        set: |n, v| {
            let source = n.destination_source();
            n.set_destination(crate::paths::clean_relative(&v), source);
        },
    },
    Field {
        name: PLACEMENT,
        presence: Presence::NonEmpty,
        get: |n| match (n.has_destination(), n.destination_source()) {
            (false, _) => String::new(),
            (true, DestinationSource::Explicit) => "Explicit".to_string(),
            (true, DestinationSource::Derived) => "Derived".to_string(),
        },
        set: |n, v| {
            let source = if v.trim().eq_ignore_ascii_case("derived") {
                DestinationSource::Derived
            } else {
                DestinationSource::Explicit
            };
            let destination = n.destination().to_string();
            n.set_destination(destination, source);
        },
    },
];

/// Whether a destination was set on the node or derived from its parent.
/// Catalogs written without it get the source inferred on load.
pub(crate) const PLACEMENT: &str = "Placement";

fn set_site_handler(node: &mut ModNode, value: String) {
    let product_id = node.product_id().to_string();
    node.set_identity_fields(product_id, value);
}

/// Looks up a current attribute.
pub(crate) fn field(name: &str) -> Option<&'static Field> {
    FIELDS.iter().find(|f| f.name == name)
}

/// Attributes older catalogs used. Applied after the current ones so they
/// never override a value written under the current name.
pub(crate) const LEGACY_FIELDS: &[(&str, fn(&mut ModNode, String))] = &[
    ("VersionControlerName", |n, v| {
        if n.site_handler_name().is_empty() {
            set_site_handler(n, v);
        }
    }),
    ("ForumURL", |n, v| apply_legacy_url(n, v, "KSPForum")),
    ("CurseForgeURL", |n, v| apply_legacy_url(n, v, "CurseForge")),
];

/// A legacy per-site URL becomes the mod URL when it belongs to the mod's
/// own site handler, otherwise the additional URL.
fn apply_legacy_url(node: &mut ModNode, url: String, handler: &str) {
    if url.is_empty() {
        return;
    }
    if node.site_handler_name() == handler && node.metadata.mod_url.is_empty() {
        node.metadata.mod_url = url;
    } else if node.metadata.additional_url.is_empty() && node.metadata.mod_url != url {
        node.metadata.additional_url = url;
    }
}

pub(crate) fn legacy_field(name: &str) -> Option<fn(&mut ModNode, String)> {
    LEGACY_FIELDS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, set)| *set)
}
