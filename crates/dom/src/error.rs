//! Error types for document queries
//!
//! Simple, flat error hierarchy. An empty match is not an error.

use crate::types::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("Invalid selector '{selector}' at '{clause}': {reason}")]
    SelectorSyntax {
        selector: String,
        clause: String,
        reason: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Node {0} is not an element")]
    NotAnElement(NodeId),
}

impl DomError {
    pub(crate) fn selector(selector: &str, clause: &str, reason: impl Into<String>) -> Self {
        DomError::SelectorSyntax {
            selector: selector.to_string(),
            clause: clause.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the selector text rather than the document
    pub fn is_selector_error(&self) -> bool {
        matches!(self, DomError::SelectorSyntax { .. })
    }
}
