//! YIN reader
//!
//! Turns a YIN document into a generic [`SchemaNode`] tree. Only statement
//! structure and arguments are kept; documentation statements are skipped.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{NetconfError, Result};
use crate::schema::SchemaNode;

/// Attributes carrying a YIN statement argument
const ARGUMENT_ATTRS: [&str; 8] = [
    "name",
    "module",
    "value",
    "uri",
    "date",
    "target-node",
    "condition",
    "tag",
];

/// Statements dropped while reading
const SKIPPED: [&str; 4] = ["description", "reference", "contact", "organization"];

fn xml_error(err: impl std::fmt::Display) -> NetconfError {
    NetconfError::Parse(format!("YIN: {err}"))
}

fn statement(start: &BytesStart<'_>) -> Result<SchemaNode> {
    let keyword = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut argument = None;

    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = attr.key.local_name();
        let key = String::from_utf8_lossy(key.as_ref());
        if ARGUMENT_ATTRS.contains(&key.as_ref()) {
            argument = Some(attr.unescape_value().map_err(xml_error)?.into_owned());
            break;
        }
    }

    Ok(SchemaNode::new(keyword, argument))
}

fn is_skipped(start: &BytesStart<'_>) -> bool {
    let name = start.local_name();
    SKIPPED.iter().any(|s| s.as_bytes() == name.as_ref())
}

fn attach(stack: &mut [SchemaNode], root: &mut Option<SchemaNode>, node: SchemaNode) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_some() {
        return Err(NetconfError::Parse("YIN: multiple root statements".into()));
    } else {
        *root = Some(node);
    }
    Ok(())
}

/// Parse a YIN document into its statement tree
pub fn parse(content: &str) -> Result<SchemaNode> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<SchemaNode> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                if is_skipped(&start) {
                    reader.read_to_end(start.name()).map_err(xml_error)?;
                    continue;
                }
                stack.push(statement(&start)?);
            }
            Event::Empty(start) => {
                if is_skipped(&start) {
                    continue;
                }
                let node = statement(&start)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| NetconfError::Parse("YIN: unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(NetconfError::Parse("YIN: unexpected end of document".into()));
    }

    let root = root.ok_or_else(|| NetconfError::Parse("YIN: empty document".into()))?;
    if !root.is("module") && !root.is("submodule") {
        return Err(NetconfError::Parse(format!(
            "YIN: expected module or submodule, found {}",
            root.keyword
        )));
    }
    Ok(root)
}
