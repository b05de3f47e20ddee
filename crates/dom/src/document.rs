//! Document - shared handle to one parsed page
//!
//! A `Document` is created once per parse and lives for one scrape. Cloning
//! it clones the handle, not the tree. It is `!Send` on purpose: one scrape
//! owns it, and the sandbox calls into it non-reentrantly.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::arena::DomArena;
use crate::error::Result;
use crate::parser::{self, ParseConfig};
use crate::query::Query;
use crate::serializer;

struct DocumentInner {
    arena: RefCell<DomArena>,
    config: ParseConfig,
}

/// Handle to a parsed document
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

impl Document {
    /// Parse markup with the default configuration. Never fails: the parser
    /// recovers from malformed markup.
    pub fn parse(html: &str) -> Self {
        Self::parse_with_config(html, ParseConfig::default())
    }

    pub fn parse_with_config(html: &str, config: ParseConfig) -> Self {
        let arena = parser::parse_document(html, &config);
        Self::from_parts(arena, config)
    }

    /// Parse raw bytes; fails with [`crate::DomError::Parse`] when they are
    /// not valid UTF-8
    pub fn parse_bytes(bytes: &[u8], config: ParseConfig) -> Result<Self> {
        let arena = parser::parse_document_bytes(bytes, &config)?;
        Ok(Self::from_parts(arena, config))
    }

    /// Wrap a tree built elsewhere
    pub fn from_arena(mut arena: DomArena) -> Self {
        arena.renumber();
        Self::from_parts(arena, ParseConfig::default())
    }

    fn from_parts(arena: DomArena, config: ParseConfig) -> Self {
        Self {
            inner: Rc::new(DocumentInner {
                arena: RefCell::new(arena),
                config,
            }),
        }
    }

    /// A collection holding only the Document node
    pub fn root(&self) -> Query {
        let root_id = self.arena().root_id();
        Query::from_nodes(self.clone(), vec![root_id])
    }

    /// Descendant search over the whole document
    pub fn find(&self, selector: &str) -> Result<Query> {
        self.root().find(selector)
    }

    /// Serialized document, doctype included
    pub fn html(&self) -> String {
        let arena = self.arena();
        serializer::inner_html(&arena, arena.root_id())
    }

    /// All text in the document
    pub fn text(&self) -> String {
        let arena = self.arena();
        let mut text = String::new();
        arena.collect_text(arena.root_id(), &mut text);
        text
    }

    /// Read access to the tree. Do not hold the guard across calls that
    /// write to the document.
    pub fn arena(&self) -> Ref<'_, DomArena> {
        self.inner.arena.borrow()
    }

    pub(crate) fn arena_mut(&self) -> RefMut<'_, DomArena> {
        self.inner.arena.borrow_mut()
    }

    pub fn config(&self) -> &ParseConfig {
        &self.inner.config
    }

    /// Same underlying document?
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.arena().len())
            .field("config", &self.inner.config)
            .finish()
    }
}
