//! Catalog format `v1.0`.
//!
//! ```xml
//! <ModCatalog>
//!   <Version>v1.0</Version>
//!   <General><DownloadPath Name="/home/me/Downloads"/></General>
//!   <Mods>
//!     <Mod Key="/home/me/Downloads/Foo.zip" Name="Foo" NodeType="1" Checked="False">
//!       <ModEntry Key="GameData" Name="GameData" NodeType="8" Checked="True" Destination="GameData" Placement="Explicit"/>
//!     </Mod>
//!   </Mods>
//! </ModCatalog>
//! ```

use super::fields::{field, legacy_field, Presence, FIELDS, PLACEMENT};
use super::{Catalog, CatalogError, CatalogSettings};
use crate::paths::join_relative;
use crate::tree::{DestinationSource, ModNode, ModSubtree};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

pub const VERSION: &str = "v1.0";

const ROOT: &str = "ModCatalog";
const MOD: &str = "Mod";
const MOD_ENTRY: &str = "ModEntry";

/// Decode an attribute value, falling back to the raw bytes when it holds
/// a malformed entity.
fn attr_value(attr: &Attribute) -> String {
    attr.unescape_value()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
}

fn parse_error(reader: &Reader<&[u8]>, err: impl std::fmt::Display) -> CatalogError {
    CatalogError::Parse {
        position: reader.buffer_position(),
        message: err.to_string(),
    }
}

/// Builds a node from the attributes of a `<Mod>` or `<ModEntry>` element.
/// Sets `has_placement` when the element stores its destination source.
fn read_node(e: &BytesStart, has_placement: &mut bool) -> ModNode {
    let mut node = ModNode::default();
    let mut legacy = Vec::new();
    for attr in e.attributes().flatten() {
        let Ok(name) = std::str::from_utf8(attr.key.as_ref()) else {
            continue;
        };
        if name == PLACEMENT {
            *has_placement = true;
        }
        if let Some(f) = field(name) {
            (f.set)(&mut node, attr_value(&attr));
        } else if let Some(set) = legacy_field(name) {
            legacy.push((set, attr_value(&attr)));
        }
    }
    for (set, value) in legacy {
        set(&mut node, value);
    }
    let installed = node.node_type().is_installed();
    node.set_installed(installed);
    node
}

fn read_download_path(e: &BytesStart, settings: &mut CatalogSettings) {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"Name" {
            settings.download_path = attr_value(&attr);
        }
    }
}

/// Returns the text of the top-level `<Version>` element, if any.
pub(crate) fn read_version(xml: &str) -> Result<Option<String>, CatalogError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(None),
            Ok(Event::Start(ref e)) => {
                depth += 1;
                if depth == 2 && e.name().as_ref() == b"Version" {
                    let text = reader
                        .read_text(e.name())
                        .map_err(|err| parse_error(&reader, err))?;
                    return Ok(Some(text.trim().to_string()));
                }
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(_) => {}
            Err(err) => return Err(parse_error(&reader, err)),
        }
    }
}

/// Parses a `v1.0` document.
pub(crate) fn parse(xml: &str) -> Result<Catalog, CatalogError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut catalog = Catalog::default();
    let mut stack: Vec<ModSubtree> = Vec::new();
    let mut has_placement = false;

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Mod" | b"ModEntry" => stack.push(ModSubtree::new(read_node(e, &mut has_placement))),
                b"DownloadPath" => read_download_path(e, &mut catalog.settings),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"Mod" | b"ModEntry" => {
                    let node = read_node(e, &mut has_placement);
                    attach(&mut stack, &mut catalog, ModSubtree::new(node));
                }
                b"DownloadPath" => read_download_path(e, &mut catalog.settings),
                _ => {}
            },
            Ok(Event::End(ref e)) => {
                if matches!(e.name().as_ref(), b"Mod" | b"ModEntry") {
                    if let Some(done) = stack.pop() {
                        attach(&mut stack, &mut catalog, done);
                    }
                }
            }
            Ok(_) => {}
            Err(err) => return Err(parse_error(&reader, err)),
        }
    }

    if !stack.is_empty() {
        return Err(parse_error(&reader, "unexpected end of document inside <Mod>"));
    }
    if !has_placement {
        for m in &mut catalog.mods {
            settle_destination_sources(m, "");
        }
    }
    Ok(catalog)
}

fn attach(stack: &mut [ModSubtree], catalog: &mut Catalog, done: ModSubtree) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(done),
        None => catalog.mods.push(done),
    }
}

/// For catalogs without `Placement`: a stored destination that equals the
/// parent's destination plus the node's name is derived; anything else was
/// set on the node itself.
fn settle_destination_sources(tree: &mut ModSubtree, parent_destination: &str) {
    let node = &mut tree.node;
    if node.has_destination() {
        let derived = !parent_destination.is_empty()
            && crate::paths::paths_equal(
                node.destination(),
                &join_relative(parent_destination, &node.name),
            );
        let source = if derived {
            DestinationSource::Derived
        } else {
            DestinationSource::Explicit
        };
        let destination = node.destination().to_string();
        node.set_destination(destination, source);
    }
    let own = tree.node.destination().to_string();
    for child in &mut tree.children {
        settle_destination_sources(child, &own);
    }
}

fn node_start<'a>(tag: &'a str, node: &ModNode) -> BytesStart<'a> {
    let mut start = BytesStart::new(tag);
    for f in FIELDS {
        let value = (f.get)(node);
        if f.presence == Presence::NonEmpty && value.is_empty() {
            continue;
        }
        start.push_attribute((f.name, value.as_str()));
    }
    start
}

fn write_node<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    tree: &ModSubtree,
) -> std::io::Result<()> {
    let start = node_start(tag, &tree.node);
    if tree.children.is_empty() {
        return writer.write_event(Event::Empty(start));
    }
    writer.write_event(Event::Start(start))?;
    for child in &tree.children {
        write_node(writer, MOD_ENTRY, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag)))
}

/// Serializes a catalog as a `v1.0` document.
pub(crate) fn write<W: std::io::Write>(out: W, catalog: &Catalog) -> std::io::Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(ROOT)))?;

    writer.write_event(Event::Start(BytesStart::new("Version")))?;
    writer.write_event(Event::Text(BytesText::new(VERSION)))?;
    writer.write_event(Event::End(BytesEnd::new("Version")))?;

    write_settings(&mut writer, &catalog.settings)?;

    writer.write_event(Event::Start(BytesStart::new("Mods")))?;
    for m in &catalog.mods {
        write_node(&mut writer, MOD, m)?;
    }
    writer.write_event(Event::End(BytesEnd::new("Mods")))?;
    writer.write_event(Event::End(BytesEnd::new(ROOT)))
}

fn write_settings<W: std::io::Write>(
    writer: &mut Writer<W>,
    settings: &CatalogSettings,
) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new("General")))?;
    let mut download = BytesStart::new("DownloadPath");
    download.push_attribute(("Name", settings.download_path.as_str()));
    writer.write_event(Event::Empty(download))?;
    writer.write_event(Event::End(BytesEnd::new("General")))
}
