//! HTML query engine for scraper extension scripts
//!
//! Parses a page once, then answers CSS-like queries against it through an
//! immutable, chainable [`Query`] collection.
//!
//! ## Core Design
//!
//! ```text
//! markup → html5ever → DomArena (owned) ← Matcher ← CompiledSelector ← "article > h2"
//!                          ↓                  ↓
//!                   NodeId (u32)         Query (Vec<NodeId>) → text / html / attr
//! ```
//!
//! - **Data structures first**: one arena per document, parents are indices
//! - **No special cases**: node kinds are a closed enum, matched exhaustively
//! - **Empty is not an error**: a query that matches nothing is an empty `Query`

pub mod arena;
pub mod document;
pub mod error;
pub mod parser;
pub mod query;
pub mod selector;
pub mod serializer;
pub mod types;

pub use arena::DomArena;
pub use document::Document;
pub use error::{DomError, Result};
pub use parser::ParseConfig;
pub use query::Query;
pub use selector::{CompiledSelector, SelectorCache};
pub use types::*;
