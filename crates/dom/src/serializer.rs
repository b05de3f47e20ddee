//! DOM Serializer - arena subtree back to HTML markup
//!
//! Follows the HTML5 fragment serialization rules, so parsing the output
//! again yields the same tree:
//! - void elements get no end tag
//! - text under raw-text elements is written verbatim
//! - a leading newline in `pre`/`textarea`/`listing` is doubled, because
//!   the parser eats the first one

use crate::arena::DomArena;
use crate::types::{NodeData, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

enum Step {
    Enter(NodeId),
    Exit(NodeId),
}

/// Markup of the node's children
pub fn inner_html(arena: &DomArena, node_id: NodeId) -> String {
    let mut output = String::new();
    for &child in arena.children(node_id) {
        write_node(arena, child, &mut output);
    }
    output
}

/// Markup of the node itself, including its own tags
pub fn outer_html(arena: &DomArena, node_id: NodeId) -> String {
    let mut output = String::new();
    write_node(arena, node_id, &mut output);
    output
}

/// Serialize one subtree (iterative, no recursion)
fn write_node(arena: &DomArena, start: NodeId, output: &mut String) {
    let mut stack = vec![Step::Enter(start)];

    while let Some(step) = stack.pop() {
        let node_id = match step {
            Step::Exit(node_id) => {
                if let Some(tag) = arena.node(node_id).tag_name() {
                    output.push_str("</");
                    output.push_str(tag);
                    output.push('>');
                }
                continue;
            }
            Step::Enter(node_id) => node_id,
        };

        let node = arena.node(node_id);
        match &node.data {
            NodeData::Element(el) => {
                output.push('<');
                output.push_str(&el.tag);
                for attr in &el.attributes {
                    output.push(' ');
                    output.push_str(&attr.name);
                    output.push_str("=\"");
                    escape_into(&attr.value, true, output);
                    output.push('"');
                }
                output.push('>');

                if is_void(&el.tag) {
                    continue;
                }
                write_leading_newline(arena, node_id, &el.tag, output);

                stack.push(Step::Exit(node_id));
                for &child_id in node.children_ids.iter().rev() {
                    stack.push(Step::Enter(child_id));
                }
            }
            NodeData::Text(text) => {
                let raw = arena
                    .parent_id(node_id)
                    .and_then(|parent| arena.node(parent).tag_name())
                    .map_or(false, |tag| RAW_TEXT_ELEMENTS.contains(&tag));
                if raw {
                    output.push_str(text);
                } else {
                    escape_into(text, false, output);
                }
            }
            NodeData::Comment(text) => {
                output.push_str("<!--");
                output.push_str(text);
                output.push_str("-->");
            }
            NodeData::Doctype { name } => {
                output.push_str("<!DOCTYPE ");
                output.push_str(name);
                output.push('>');
            }
            NodeData::Document => {
                for &child_id in node.children_ids.iter().rev() {
                    stack.push(Step::Enter(child_id));
                }
            }
        }
    }
}

fn write_leading_newline(arena: &DomArena, node_id: NodeId, tag: &str, output: &mut String) {
    if !matches!(tag, "pre" | "textarea" | "listing") {
        return;
    }
    let starts_with_newline = arena
        .children(node_id)
        .first()
        .map_or(false, |&first| match &arena.node(first).data {
            NodeData::Text(text) => text.starts_with('\n'),
            _ => false,
        });
    if starts_with_newline {
        output.push('\n');
    }
}

fn escape_into(text: &str, attribute: bool, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '\u{a0}' => output.push_str("&nbsp;"),
            '"' if attribute => output.push_str("&quot;"),
            '<' if !attribute => output.push_str("&lt;"),
            '>' if !attribute => output.push_str("&gt;"),
            c => output.push(c),
        }
    }
}
