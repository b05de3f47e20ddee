//! HTML parsing - markup text to arena
//!
//! html5ever does the actual parsing (it is lenient and recovers from
//! malformed markup); this module converts its reference-counted tree into a
//! [`DomArena`]. Conversion is iterative, deep documents cannot blow the stack.

use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{namespace_url, ns, LocalName, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};
use serde::{Deserialize, Serialize};

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::{ElementData, NodeData, NodeId};

/// Parser configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// Parse `<noscript>` as raw text, like a browser with scripting on.
    /// Off by default so scrapers can query fallback markup.
    pub scripting_enabled: bool,

    /// Keep comment nodes in the tree
    pub keep_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            scripting_enabled: false,
            keep_comments: true,
        }
    }
}

impl ParseConfig {
    fn parse_opts(&self) -> ParseOpts {
        ParseOpts {
            tree_builder: TreeBuilderOpts {
                scripting_enabled: self.scripting_enabled,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Parse a full HTML document
pub fn parse_document(html: &str, config: &ParseConfig) -> DomArena {
    let dom = html5ever::parse_document(RcDom::default(), config.parse_opts()).one(html);

    let mut arena = DomArena::with_capacity(html.len() / 16);
    convert_children(&dom.document, arena.root_id(), &mut arena, config);
    arena.renumber();

    tracing::debug!("Parsed document: {} nodes", arena.len());
    arena
}

/// Parse raw bytes as a full HTML document.
///
/// Fails only when the bytes are not UTF-8, e.g. a stream truncated in the
/// middle of a multi-byte sequence.
pub fn parse_document_bytes(bytes: &[u8], config: &ParseConfig) -> Result<DomArena> {
    let html = std::str::from_utf8(bytes).map_err(|e| {
        tracing::debug!("Rejected document bytes: {}", e);
        DomError::Parse(format!("input is not valid UTF-8: {}", e))
    })?;
    Ok(parse_document(html, config))
}

/// Parse markup as the content of a `context` element (a lower-case tag
/// name such as `"body"` or `"tbody"`). The context decides how table,
/// select and raw-text content is tokenized.
///
/// The returned arena's Document node holds the fragment's top-level nodes.
pub fn parse_fragment(markup: &str, context: &str, config: &ParseConfig) -> DomArena {
    let context = QualName::new(None, ns!(html), LocalName::from(context));
    let dom = html5ever::parse_fragment(RcDom::default(), config.parse_opts(), context, vec![])
        .one(markup);

    let mut arena = DomArena::new();
    // The fragment parser wraps everything in a synthetic <html> element
    let wrapper = dom.document.children.borrow().first().cloned();
    if let Some(wrapper) = wrapper {
        convert_children(&wrapper, arena.root_id(), &mut arena, config);
    }
    arena.renumber();
    arena
}

/// Copy the children of `handle` (recursively) under `parent`
fn convert_children(handle: &Handle, parent: NodeId, arena: &mut DomArena, config: &ParseConfig) {
    let mut stack: Vec<(Handle, NodeId)> = vec![(handle.clone(), parent)];

    while let Some((source, target)) = stack.pop() {
        for child in source.children.borrow().iter() {
            if let Some(id) = convert_node(child, arena, config) {
                arena.append_child(target, id);
                stack.push((child.clone(), id));
            }
        }

        // Template contents live in a separate fragment; expose them as children
        if let RcNodeData::Element {
            template_contents, ..
        } = &source.data
        {
            if let Some(contents) = template_contents.borrow().as_ref() {
                stack.push((contents.clone(), target));
            }
        }
    }
}

fn convert_node(handle: &Handle, arena: &mut DomArena, config: &ParseConfig) -> Option<NodeId> {
    let data = match &handle.data {
        RcNodeData::Element { name, attrs, .. } => {
            let element = attrs.borrow().iter().fold(
                ElementData::new(name.local.as_ref()),
                |element, attr| {
                    let attr_name = match &attr.name.prefix {
                        Some(prefix) => format!("{}:{}", prefix, attr.name.local),
                        None => attr.name.local.to_string(),
                    };
                    element.with_attr(&attr_name, attr.value.to_string())
                },
            );
            NodeData::Element(element)
        }
        RcNodeData::Text { contents } => NodeData::Text(contents.borrow().to_string()),
        RcNodeData::Comment { contents } if config.keep_comments => {
            NodeData::Comment(contents.to_string())
        }
        RcNodeData::Doctype { name, .. } => NodeData::Doctype {
            name: name.to_string(),
        },
        RcNodeData::Comment { .. }
        | RcNodeData::ProcessingInstruction { .. }
        | RcNodeData::Document => return None,
    };

    Some(arena.add_node(data))
}
