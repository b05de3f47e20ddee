//! Query - the chainable result set handed to extension scripts
//!
//! A `Query` is an ordered, de-duplicated list of node ids plus the document
//! they live in. Every method returns a new `Query` (or a scalar) and leaves
//! the receiver untouched; an empty result is a normal value, not an error.
//!
//! Writes (`set_attr`, `set_text`, ...) change the shared document and hand
//! back a copy of the receiver for chaining.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::arena::DomArena;
use crate::document::Document;
use crate::error::{DomError, Result};
use crate::parser;
use crate::selector::{global_cache, matcher, CompiledSelector};
use crate::serializer;
use crate::types::{Attribute, NodeData, NodeId};

#[derive(Clone)]
pub struct Query {
    doc: Document,
    nodes: Vec<NodeId>,
}

impl Query {
    /// `nodes` must already be de-duplicated and in document order
    pub(crate) fn from_nodes(doc: Document, nodes: Vec<NodeId>) -> Self {
        Self { doc, nodes }
    }

    fn derive(&self, nodes: Vec<NodeId>) -> Query {
        Query::from_nodes(self.doc.clone(), nodes)
    }

    /// Sort + de-duplicate, then wrap
    fn derive_unordered(&self, mut nodes: Vec<NodeId>) -> Query {
        self.doc.arena().sort_document_order(&mut nodes);
        self.derive(nodes)
    }

    fn compile(selector: &str) -> Result<Arc<CompiledSelector>> {
        global_cache().get_or_compile(selector)
    }

    fn first_node(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    // ---- traversal -------------------------------------------------------

    /// Descendants of every node matching `selector`
    pub fn find(&self, selector: &str) -> Result<Query> {
        let compiled = Self::compile(selector)?;
        Ok(self.find_compiled(&compiled))
    }

    pub fn find_compiled(&self, selector: &CompiledSelector) -> Query {
        let found = matcher::find(&self.doc.arena(), &self.nodes, selector);
        self.derive(found)
    }

    /// Direct element children (text and comments never included)
    pub fn children(&self) -> Query {
        let found = matcher::children(&self.doc.arena(), &self.nodes, None);
        self.derive(found)
    }

    /// Direct element children matching `selector`
    pub fn children_matching(&self, selector: &str) -> Result<Query> {
        let compiled = Self::compile(selector)?;
        let found = matcher::children(&self.doc.arena(), &self.nodes, Some(compiled.as_ref()));
        Ok(self.derive(found))
    }

    /// Element parents; the Document node is never returned
    pub fn parent(&self) -> Query {
        let arena = self.doc.arena();
        let parents = self
            .nodes
            .iter()
            .filter_map(|&id| arena.parent_element(id))
            .collect();
        self.derive_unordered(parents)
    }

    /// For each node, the nearest inclusive ancestor matching `selector`
    pub fn closest(&self, selector: &str) -> Result<Query> {
        let compiled = Self::compile(selector)?;
        let arena = self.doc.arena();
        let found = self
            .nodes
            .iter()
            .filter_map(|&id| matcher::closest(&arena, id, &compiled))
            .collect();
        Ok(self.derive_unordered(found))
    }

    /// Next element sibling of each node
    pub fn next(&self) -> Query {
        self.map_nodes(DomArena::next_element)
    }

    /// Previous element sibling of each node
    pub fn prev(&self) -> Query {
        self.map_nodes(DomArena::prev_element)
    }

    /// Element siblings of each node, the node itself excluded
    pub fn siblings(&self) -> Query {
        let arena = self.doc.arena();
        let found = self
            .nodes
            .iter()
            .flat_map(|&id| arena.element_siblings(id))
            .collect();
        self.derive_unordered(found)
    }

    fn map_nodes(&self, step: fn(&DomArena, NodeId) -> Option<NodeId>) -> Query {
        let arena = self.doc.arena();
        let found = self.nodes.iter().filter_map(|&id| step(&arena, id)).collect();
        self.derive_unordered(found)
    }

    // ---- filtering -------------------------------------------------------

    pub fn first(&self) -> Query {
        self.derive(self.first_node().into_iter().collect())
    }

    pub fn last(&self) -> Query {
        self.derive(self.nodes.last().copied().into_iter().collect())
    }

    /// Node at `index`; negative indices count from the end
    pub fn at(&self, index: isize) -> Query {
        let len = self.nodes.len() as isize;
        let resolved = if index < 0 { len + index } else { index };
        let node = (0..len)
            .contains(&resolved)
            .then(|| self.nodes[resolved as usize]);
        self.derive(node.into_iter().collect())
    }

    /// Nodes in `start..end`, clamped to the collection
    pub fn slice(&self, start: usize, end: usize) -> Query {
        let end = end.min(self.nodes.len());
        let start = start.min(end);
        self.derive(self.nodes[start..end].to_vec())
    }

    /// Nodes that themselves match `selector`
    pub fn filter(&self, selector: &str) -> Result<Query> {
        let compiled = Self::compile(selector)?;
        let kept = matcher::filter(&self.doc.arena(), &self.nodes, &compiled);
        Ok(self.derive(kept))
    }

    /// Does any node match `selector`?
    pub fn is(&self, selector: &str) -> Result<bool> {
        let compiled = Self::compile(selector)?;
        let arena = self.doc.arena();
        Ok(self
            .nodes
            .iter()
            .any(|&id| matcher::matches(&arena, id, &compiled)))
    }

    // ---- iteration -------------------------------------------------------

    /// Call `f(index, node)` for every node, in order
    pub fn each<F>(&self, mut f: F) -> &Self
    where
        F: FnMut(usize, Query),
    {
        for (index, &id) in self.nodes.iter().enumerate() {
            f(index, self.derive(vec![id]));
        }
        self
    }

    /// Like [`Query::each`], stopping at and returning the first error
    pub fn try_each<E, F>(&self, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(usize, Query) -> std::result::Result<(), E>,
    {
        for (index, &id) in self.nodes.iter().enumerate() {
            f(index, self.derive(vec![id]))?;
        }
        Ok(())
    }

    /// Collect `f(index, node)` for every node
    pub fn map<T, F>(&self, mut f: F) -> Vec<T>
    where
        F: FnMut(usize, Query) -> T,
    {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, &id)| f(index, self.derive(vec![id])))
            .collect()
    }

    /// Single-node collections, in order
    pub fn iter(&self) -> impl Iterator<Item = Query> + '_ {
        self.nodes.iter().map(move |&id| self.derive(vec![id]))
    }

    // ---- scalars ---------------------------------------------------------

    pub fn length(&self) -> usize {
        self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Tag name of the first node
    pub fn tag_name(&self) -> Option<String> {
        let arena = self.doc.arena();
        self.first_node()
            .and_then(|id| arena.node(id).tag_name().map(String::from))
    }

    /// All descendant text of every node, concatenated in order, untouched
    pub fn text(&self) -> String {
        let arena = self.doc.arena();
        let mut text = String::new();
        for &id in &self.nodes {
            arena.collect_text(id, &mut text);
        }
        text
    }

    /// Inner markup of the first node, empty when there is none
    pub fn html(&self) -> String {
        let arena = self.doc.arena();
        self.first_node()
            .map(|id| serializer::inner_html(&arena, id))
            .unwrap_or_default()
    }

    /// Markup of the first node including its own tags
    pub fn outer_html(&self) -> String {
        let arena = self.doc.arena();
        self.first_node()
            .map(|id| serializer::outer_html(&arena, id))
            .unwrap_or_default()
    }

    /// Attribute of the first node
    pub fn attr(&self, name: &str) -> Option<String> {
        let arena = self.doc.arena();
        self.first_node()
            .and_then(|id| arena.node(id).attr(name).map(String::from))
    }

    /// All attributes of the first node, source order
    pub fn attrs(&self) -> Vec<Attribute> {
        let arena = self.doc.arena();
        self.first_node()
            .and_then(|id| arena.node(id).element().map(|el| el.attributes.to_vec()))
            .unwrap_or_default()
    }

    /// Does any node carry the class?
    pub fn has_class(&self, class: &str) -> bool {
        let arena = self.doc.arena();
        self.nodes.iter().any(|&id| {
            arena
                .node(id)
                .element()
                .map_or(false, |el| el.has_class(class))
        })
    }

    // ---- writes ----------------------------------------------------------

    /// Set an attribute on every element
    pub fn set_attr(&self, name: &str, value: &str) -> Query {
        let mut arena = self.doc.arena_mut();
        for &id in &self.nodes {
            if let Err(e) = arena.set_attribute(id, name, value) {
                tracing::warn!("Skipped attribute write: {}", e);
            }
        }
        self.clone()
    }

    /// Remove an attribute from every element
    pub fn remove_attr(&self, name: &str) -> Query {
        let mut arena = self.doc.arena_mut();
        for &id in &self.nodes {
            if let Err(e) = arena.remove_attribute(id, name) {
                tracing::warn!("Skipped attribute removal: {}", e);
            }
        }
        self.clone()
    }

    /// Replace the children of every element with a single text node
    pub fn set_text(&self, text: &str) -> Query {
        let mut arena = self.doc.arena_mut();
        for &id in &self.nodes {
            let children = if text.is_empty() {
                Vec::new()
            } else {
                vec![arena.add_node(NodeData::Text(text.to_string()))]
            };
            if let Err(e) = arena.splice_children(id, &children) {
                tracing::warn!("Skipped text write: {}", e);
            }
        }
        arena.renumber();
        self.clone()
    }

    /// Replace the children of every element with parsed markup. The markup
    /// is parsed in each target's context, so `<tr>` rows survive inside a
    /// `<tbody>`; one parse per distinct tag.
    pub fn set_html(&self, markup: &str) -> Query {
        let mut fragments: AHashMap<String, DomArena> = AHashMap::new();
        let mut arena = self.doc.arena_mut();
        for &id in &self.nodes {
            let tag = match arena.node(id).tag_name() {
                Some(tag) => tag.to_string(),
                None => {
                    tracing::warn!("Skipped html write: {}", DomError::NotAnElement(id));
                    continue;
                }
            };
            let fragment: &DomArena = fragments
                .entry(tag)
                .or_insert_with_key(|tag| parser::parse_fragment(markup, tag, self.doc.config()));
            let children: Vec<NodeId> = fragment
                .children(fragment.root_id())
                .iter()
                .map(|&top| arena.import_subtree(fragment, top))
                .collect();
            if let Err(e) = arena.splice_children(id, &children) {
                tracing::warn!("Skipped html write: {}", e);
            }
        }
        arena.renumber();
        self.clone()
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.doc.ptr_eq(&other.doc) && self.nodes == other.nodes
    }
}

impl Eq for Query {}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("nodes", &self.nodes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomError;

    const SCENARIO: &str = "<section><article>A</article><article>B</article></section>";

    fn doc() -> Document {
        Document::parse(SCENARIO)
    }

    #[test]
    fn test_find_in_document_order() {
        let articles = doc().find("article").unwrap();
        assert_eq!(articles.length(), 2);
        assert_eq!(articles.map(|_, a| a.text()), vec!["A", "B"]);
    }

    #[test]
    fn test_last_child_selector() {
        let last = doc().find("article:last-child").unwrap();
        assert_eq!(last.length(), 1);
        assert_eq!(last.text(), "B");
        assert_eq!(last, last.document().find("article").unwrap().last());
    }

    #[test]
    fn test_children_each_visits_in_order() {
        let mut visited = Vec::new();
        doc()
            .find("section")
            .unwrap()
            .children_matching("article")
            .unwrap()
            .each(|i, node| visited.push((i, node.text())));
        assert_eq!(visited, vec![(0, "A".to_string()), (1, "B".to_string())]);
    }

    #[test]
    fn test_empty_results() {
        let doc = doc();
        let article = doc.find("article").unwrap().first();
        let h2 = article.find("h2").unwrap();
        assert!(h2.is_empty());
        assert_eq!(h2.text(), "");
        assert_eq!(h2.html(), "");
        assert_eq!(h2.attr("href"), None);
        assert!(h2.closest("article").unwrap().is_empty());
        assert!(h2.first().is_empty());
        assert!(h2.parent().is_empty());
    }

    #[test]
    fn test_malformed_selector_fails() {
        let err = doc().find("###").unwrap_err();
        assert!(matches!(err, DomError::SelectorSyntax { .. }));
        assert!(doc().root().closest("").is_err());
        assert!(doc().root().children_matching("a,b").is_err());
    }

    #[test]
    fn test_first_last_idempotent() {
        let articles = doc().find("article").unwrap();
        assert_eq!(articles.first().first(), articles.first());
        assert_eq!(articles.last().last(), articles.last());
        assert_ne!(articles.first(), articles.last());
    }

    #[test]
    fn test_receiver_is_not_changed() {
        let articles = doc().find("article").unwrap();
        let before = articles.nodes().to_vec();
        let _ = articles.first();
        let _ = articles.parent();
        let _ = articles.find("*").unwrap();
        assert_eq!(articles.nodes(), before.as_slice());
    }

    #[test]
    fn test_parent_deduplicates_and_skips_document() {
        let doc = doc();
        let parents = doc.find("article").unwrap().parent();
        assert_eq!(parents.length(), 1);
        assert_eq!(parents.tag_name().as_deref(), Some("section"));

        let html = doc.find("html").unwrap();
        assert!(html.parent().is_empty());
        assert!(doc.root().parent().is_empty());
    }

    #[test]
    fn test_closest_is_reflexive() {
        let article = doc().find("article").unwrap().first();
        assert_eq!(article.closest("article").unwrap(), article);
        assert_eq!(
            article.closest("section").unwrap().tag_name().as_deref(),
            Some("section")
        );
    }

    #[test]
    fn test_children_never_returns_text_or_grandchildren() {
        let doc = Document::parse("<div>t<p>x<b>y</b></p><!--c--><span></span></div>");
        let children = doc.find("div").unwrap().children();
        assert_eq!(
            children.map(|_, c| c.tag_name()),
            vec![Some("p".to_string()), Some("span".to_string())]
        );
    }

    #[test]
    fn test_siblings_next_prev_eq_slice() {
        let doc = Document::parse("<ul><li>1</li><li>2</li><li>3</li></ul>");
        let items = doc.find("li").unwrap();
        let second = items.at(1);
        assert_eq!(second.text(), "2");
        assert_eq!(items.at(-1).text(), "3");
        assert!(items.at(3).is_empty());
        assert!(items.at(-4).is_empty());
        assert_eq!(second.next().text(), "3");
        assert_eq!(second.prev().text(), "1");
        assert_eq!(second.siblings().text(), "13");
        assert_eq!(items.siblings().length(), 3);
        assert_eq!(items.slice(1, 10).text(), "23");
        assert!(items.slice(5, 2).is_empty());
        assert!(items.last().next().is_empty());
    }

    #[test]
    fn test_filter_and_is() {
        let doc = Document::parse("<p class=a>1</p><p>2</p><p class=a>3</p>");
        let ps = doc.find("p").unwrap();
        assert_eq!(ps.filter(".a").unwrap().text(), "13");
        assert!(ps.is("p.a").unwrap());
        assert!(!ps.is("div").unwrap());
        assert!(ps.has_class("a"));
        assert!(!ps.at(1).has_class("a"));
    }

    #[test]
    fn test_attr_read_after_write() {
        let doc = Document::parse("<a href='/x'>link</a><a>other</a>");
        let links = doc.find("a").unwrap();
        assert_eq!(links.attr("href").as_deref(), Some("/x"));
        assert_eq!(links.at(1).attr("href"), None);

        let first = links.first();
        let updated = first.set_attr("href", "/y");
        assert_eq!(updated, first);
        assert_eq!(first.attr("href").as_deref(), Some("/y"));
        assert_eq!(first.attr("HREF").as_deref(), Some("/y"));

        links.set_attr("data-seen", "1");
        assert_eq!(links.at(1).attr("data-seen").as_deref(), Some("1"));

        links.remove_attr("href");
        assert_eq!(links.attr("href"), None);
        assert_eq!(
            links.attrs(),
            vec![Attribute {
                name: "data-seen".into(),
                value: "1".into()
            }]
        );
    }

    #[test]
    fn test_writes_on_document_node_are_skipped() {
        let doc = doc();
        let root = doc.root();
        root.set_attr("x", "1");
        root.set_text("gone?");
        assert_eq!(root.attr("x"), None);
        assert_eq!(doc.find("article").unwrap().length(), 2);
    }

    #[test]
    fn test_text_keeps_source_whitespace() {
        let doc = Document::parse("<div>\n  <p> a </p>\n  <p>b</p>\n</div>");
        assert_eq!(doc.find("div").unwrap().text(), "\n   a \n  b\n");
        assert_eq!(doc.find("p").unwrap().text(), " a b");
    }

    #[test]
    fn test_set_text_replaces_children() {
        let doc = doc();
        let section = doc.find("section").unwrap();
        section.set_text("<b>plain</b>");
        assert!(doc.find("article").unwrap().is_empty());
        assert_eq!(section.text(), "<b>plain</b>");
        assert_eq!(section.html(), "&lt;b&gt;plain&lt;/b&gt;");
    }

    #[test]
    fn test_set_html_and_document_order() {
        let doc = Document::parse("<div id=a></div><div id=b><i>old</i></div>");
        doc.find("#b").unwrap().set_html("<i>x</i>");
        doc.find("#a").unwrap().set_html("<i>first</i><i>second</i>");

        let italics = doc.find("i").unwrap();
        assert_eq!(italics.map(|_, i| i.text()), vec!["first", "second", "x"]);
        assert_eq!(doc.find("#a").unwrap().html(), "<i>first</i><i>second</i>");
    }

    #[test]
    fn test_set_html_on_many_targets_copies_fragment() {
        let doc = Document::parse("<p></p><p></p>");
        doc.find("p").unwrap().set_html("<b>x</b>");
        let bolds = doc.find("b").unwrap();
        assert_eq!(bolds.length(), 2);
        bolds.first().set_text("y");
        assert_eq!(bolds.text(), "yx");
    }

    #[test]
    fn test_set_html_parses_in_target_context() {
        let doc = Document::parse(
            "<table><tbody><tr><td>old</td></tr></tbody></table><div></div>",
        );
        doc.find("tbody").unwrap().set_html("<tr><td>new</td></tr>");
        assert_eq!(doc.find("td").unwrap().text(), "new");
        assert_eq!(doc.find("tbody > tr > td").unwrap().length(), 1);

        // Rows outside a table are flattened, as a browser would
        doc.find("div").unwrap().set_html("<tr><td>flat</td></tr>");
        assert_eq!(doc.find("div").unwrap().html(), "flat");
        assert_eq!(doc.find("td").unwrap().length(), 1);
    }

    #[test]
    fn test_set_html_mixed_targets_parse_per_tag() {
        let doc = Document::parse(
            "<table><tbody></tbody></table><select></select><div></div>",
        );
        let targets = doc.find("body *").unwrap().filter(":empty").unwrap();
        assert_eq!(targets.length(), 3);
        targets.set_html("<tr><td>r</td></tr><option>o</option>");

        assert_eq!(doc.find("tbody tr td").unwrap().length(), 1);
        assert_eq!(doc.find("select > option").unwrap().text(), "o");
        assert_eq!(doc.find("div").unwrap().children().length(), 1);
    }

    #[test]
    fn test_batch_writes_keep_document_order() {
        let doc = Document::parse("<ul><li>a</li><li>b</li><li>c</li></ul><p>tail</p>");
        let items = doc.find("li").unwrap();
        items.set_html("<b>1</b><b>2</b>");

        let bolds = doc.find("li b").unwrap();
        assert_eq!(bolds.map(|_, b| b.text()), vec!["1", "2", "1", "2", "1", "2"]);
        let owners = bolds.map(|_, b| b.parent().nodes()[0]);
        assert_eq!(owners, vec![
            items.nodes()[0], items.nodes()[0],
            items.nodes()[1], items.nodes()[1],
            items.nodes()[2], items.nodes()[2],
        ]);

        items.set_text("z");
        assert_eq!(doc.find("ul").unwrap().text(), "zzz");
        assert!(doc.find("b").unwrap().is_empty());
        assert_eq!(doc.find("p").unwrap().prev().tag_name().as_deref(), Some("ul"));
    }

    #[test]
    fn test_each_callback_may_write() {
        let doc = Document::parse("<ul><li>a</li><li>b</li></ul>");
        doc.find("li").unwrap().each(|i, li| {
            li.set_attr("data-index", &i.to_string());
        });
        assert_eq!(doc.find("li[data-index='1']").unwrap().text(), "b");
    }

    #[test]
    fn test_try_each_propagates_error() {
        let doc = Document::parse("<ul><li>a</li><li>b</li><li>c</li></ul>");
        let mut seen = 0;
        let result = doc.find("li").unwrap().try_each(|i, _| {
            seen += 1;
            if i == 1 {
                Err("boom")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_html_round_trip() {
        let doc = Document::parse(
            "<div id=wrap><article class=post data-id=7><h2>T &amp; U</h2><p>a<br>b</p>\
             <ul><li>1</li></ul><!-- c --></article></div>",
        );
        let wrap = doc.find("#wrap").unwrap();
        let markup = wrap.html();

        let copy = Document::parse(&format!("<div id=wrap>{}</div>", markup));
        let original_arena = doc.arena();
        let copy_arena = copy.arena();
        let a = wrap.nodes()[0];
        let b = copy.find("#wrap").unwrap().nodes()[0];
        assert!(original_arena.subtree_eq(a, &copy_arena, b));
    }

    #[test]
    fn test_outer_html() {
        let doc = Document::parse("<p class=x>hi</p>");
        assert_eq!(doc.find("p").unwrap().outer_html(), "<p class=\"x\">hi</p>");
        assert_eq!(doc.find("nav").unwrap().outer_html(), "");
    }
}
