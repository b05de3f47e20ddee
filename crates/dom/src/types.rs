//! Core node types
//!
//! Key design principles:
//! 1. Use u32 for indices (4 bytes vs 8 bytes pointer)
//! 2. Closed tagged variant for node kinds, so a missed case is a compile error
//! 3. Use SmallVec for small arrays (avoid heap allocation)

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Node identifier (index into arena)
/// u32 allows 4 billion nodes, enough for any webpage
pub type NodeId = u32;

/// Node type numbers matching the DOM specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
}

/// A single attribute. Names are lower-cased when the element is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Element payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementData {
    /// Lower-cased tag name
    pub tag: String,
    /// Source order, unique names. Most elements carry only a few,
    /// so a linear scan beats hashing here.
    pub attributes: SmallVec<[Attribute; 4]>,
}

impl ElementData {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: SmallVec::new(),
        }
    }

    /// Builder-style attribute insertion (later duplicates are ignored,
    /// like the HTML tokenizer does)
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        if self.attr(name).is_none() {
            self.attributes.push(Attribute {
                name: name.to_ascii_lowercase(),
                value: value.into(),
            });
        }
        self
    }

    /// Case-insensitive attribute lookup
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Insert or overwrite an attribute
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute {
                name: name.to_ascii_lowercase(),
                value,
            }),
        }
    }

    /// Remove an attribute, returns true if it was present
    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| !a.name.eq_ignore_ascii_case(name));
        self.attributes.len() != before
    }

    /// Whitespace-separated class tokens
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

/// What a node is. The set is fixed, match it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeData {
    Document,
    Doctype { name: String },
    Element(ElementData),
    Text(String),
    Comment(String),
}

impl NodeData {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeData::Document => NodeType::Document,
            NodeData::Doctype { .. } => NodeType::DocumentType,
            NodeData::Element(_) => NodeType::Element,
            NodeData::Text(_) => NodeType::Text,
            NodeData::Comment(_) => NodeType::Comment,
        }
    }
}

/// The arena slot for one node
///
/// Design philosophy:
/// - Use indices instead of pointers
/// - The parent index never owns anything
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    pub node_id: NodeId,
    pub parent_id: Option<NodeId>,
    pub children_ids: SmallVec<[NodeId; 4]>, // Most nodes have <4 children
    pub data: NodeData,
}

impl DomNode {
    pub fn new(node_id: NodeId, data: NodeData) -> Self {
        Self {
            node_id,
            parent_id: None,
            children_ids: SmallVec::new(),
            data,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.data.node_type()
    }

    /// Element payload, if this is an element
    pub fn element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Get tag name for element nodes
    pub fn tag_name(&self) -> Option<&str> {
        self.element().map(|el| el.tag.as_str())
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    /// Get attribute value (elements only)
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.element().and_then(|el| el.attr(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_lookup_is_case_insensitive() {
        let el = ElementData::new("A").with_attr("HREF", "/x");
        assert_eq!(el.tag, "a");
        assert_eq!(el.attr("href"), Some("/x"));
        assert_eq!(el.attr("Href"), Some("/x"));
        assert_eq!(el.attributes[0].name, "href");
    }

    #[test]
    fn test_duplicate_attributes_keep_first() {
        let el = ElementData::new("div").with_attr("id", "a").with_attr("ID", "b");
        assert_eq!(el.attributes.len(), 1);
        assert_eq!(el.attr("id"), Some("a"));
    }

    #[test]
    fn test_set_and_remove_attr() {
        let mut el = ElementData::new("div").with_attr("class", "x");
        el.set_attr("CLASS", "y z");
        el.set_attr("data-id", "3");
        assert_eq!(el.attr("class"), Some("y z"));
        assert!(el.has_class("z"));
        assert!(!el.has_class("x"));
        assert!(el.remove_attr("Data-Id"));
        assert!(!el.remove_attr("data-id"));
        assert_eq!(el.attributes.len(), 1);
    }

    #[test]
    fn test_element_serializes_in_source_order() {
        let el = ElementData::new("A").with_attr("href", "/x").with_attr("rel", "next");
        let json = serde_json::to_value(&el).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "tag": "a",
                "attributes": [
                    {"name": "href", "value": "/x"},
                    {"name": "rel", "value": "next"}
                ]
            })
        );
        let back: ElementData = serde_json::from_value(json).unwrap();
        assert_eq!(back, el);
    }

    #[test]
    fn test_node_type_numbers() {
        assert_eq!(NodeType::Element as u8, 1);
        assert_eq!(NodeType::DocumentType as u8, 10);
        assert_eq!(NodeData::Text("x".into()).node_type(), NodeType::Text);
    }
}
