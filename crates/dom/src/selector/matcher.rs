//! Matcher - evaluate compiled selectors against the arena
//!
//! Right-to-left: the last step is tested first (it is the most selective in
//! practice), then the chain is verified upward through ancestors.

use ahash::AHashSet;

use super::{Combinator, CompiledSelector, Compound, Pseudo, Step};
use crate::arena::DomArena;
use crate::types::{NodeData, NodeId};

/// `(node, step index)` pairs already known not to match. Whether a step
/// matches at a node does not depend on where matching started, so one set
/// serves a whole search with a single selector.
type Failed = AHashSet<(NodeId, usize)>;

/// Does `node_id` itself match the selector?
pub fn matches(arena: &DomArena, node_id: NodeId, selector: &CompiledSelector) -> bool {
    matches_memo(arena, node_id, selector, &mut Failed::default())
}

fn matches_memo(
    arena: &DomArena,
    node_id: NodeId,
    selector: &CompiledSelector,
    failed: &mut Failed,
) -> bool {
    let steps = selector.steps();
    match steps.len() {
        0 => false,
        n => match_step(arena, node_id, steps, n - 1, failed),
    }
}

fn match_step(
    arena: &DomArena,
    node_id: NodeId,
    steps: &[Step],
    index: usize,
    failed: &mut Failed,
) -> bool {
    if failed.contains(&(node_id, index)) {
        return false;
    }
    if !matches_compound(arena, node_id, &steps[index].compound) {
        failed.insert((node_id, index));
        return false;
    }
    if index == 0 {
        return true;
    }

    let matched = match steps[index - 1].combinator {
        Some(Combinator::Child) => arena
            .parent_element(node_id)
            .map_or(false, |parent| match_step(arena, parent, steps, index - 1, failed)),
        Some(Combinator::Descendant) | None => arena
            .ancestors(node_id)
            .filter(|&ancestor| arena.node(ancestor).is_element())
            .any(|ancestor| match_step(arena, ancestor, steps, index - 1, failed)),
    };
    if !matched {
        failed.insert((node_id, index));
    }
    matched
}

/// Test one compound selector against a single node
pub fn matches_compound(arena: &DomArena, node_id: NodeId, compound: &Compound) -> bool {
    let el = match arena.node(node_id).element() {
        Some(el) => el,
        None => return false,
    };

    if let Some(tag) = &compound.tag {
        if el.tag != *tag {
            return false;
        }
    }

    if let Some(id) = &compound.id {
        if el.attr("id") != Some(id.as_str()) {
            return false;
        }
    }

    if !compound.classes.iter().all(|class| el.has_class(class)) {
        return false;
    }

    let attributes_match = compound
        .attributes
        .iter()
        .all(|test| el.attr(&test.name).map_or(false, |value| test.op.matches(value)));
    if !attributes_match {
        return false;
    }

    compound
        .pseudos
        .iter()
        .all(|pseudo| matches_pseudo(arena, node_id, compound, pseudo))
}

fn matches_pseudo(arena: &DomArena, node_id: NodeId, compound: &Compound, pseudo: &Pseudo) -> bool {
    match pseudo {
        Pseudo::FirstChild => {
            let mut peers = tag_filtered_siblings(arena, node_id, compound);
            peers.next().map_or(true, |first| first == node_id)
        }
        Pseudo::LastChild => {
            let peers = tag_filtered_siblings(arena, node_id, compound);
            peers.last().map_or(true, |last| last == node_id)
        }
        Pseudo::OnlyChild => tag_filtered_siblings(arena, node_id, compound).count() <= 1,
        Pseudo::NthChild(nth) => {
            let position = match arena.parent_id(node_id) {
                Some(parent) => arena
                    .element_children(parent)
                    .position(|id| id == node_id)
                    .map_or(0, |p| p + 1),
                None => 1,
            };
            nth.matches(position)
        }
        Pseudo::Empty => arena.children(node_id).iter().all(|&child| {
            match &arena.node(child).data {
                NodeData::Element(_) => false,
                NodeData::Text(text) => text.is_empty(),
                NodeData::Comment(_) | NodeData::Doctype { .. } | NodeData::Document => true,
            }
        }),
    }
}

/// Element children of the node's parent that pass the compound's tag
/// filter (all of them when the compound has no tag). Includes the node.
fn tag_filtered_siblings<'a>(
    arena: &'a DomArena,
    node_id: NodeId,
    compound: &'a Compound,
) -> impl Iterator<Item = NodeId> + 'a {
    arena
        .parent_id(node_id)
        .into_iter()
        .flat_map(move |parent| arena.element_children(parent))
        .filter(move |&id| match &compound.tag {
            Some(tag) => arena.node(id).tag_name() == Some(tag.as_str()),
            None => true,
        })
}

/// Descendant search beneath every scope node (scope nodes excluded).
/// Union, de-duplicated, document order.
pub fn find(arena: &DomArena, scope: &[NodeId], selector: &CompiledSelector) -> Vec<NodeId> {
    let scope_set: AHashSet<NodeId> = scope.iter().copied().collect();
    let mut failed = Failed::default();
    let mut found = Vec::new();

    for &root in &scope_set {
        // A scope nested inside another scope is already covered
        if arena.ancestors(root).any(|a| scope_set.contains(&a)) {
            continue;
        }
        found.extend(
            arena
                .descendants(root)
                .filter(|&id| matches_memo(arena, id, selector, &mut failed)),
        );
    }

    arena.sort_document_order(&mut found);
    found
}

/// Direct element children of every scope node, optionally filtered.
/// Union, de-duplicated, document order.
pub fn children(
    arena: &DomArena,
    scope: &[NodeId],
    selector: Option<&CompiledSelector>,
) -> Vec<NodeId> {
    let mut failed = Failed::default();
    let mut found: Vec<NodeId> = scope
        .iter()
        .flat_map(|&parent| arena.element_children(parent))
        .filter(|&id| selector.map_or(true, |s| matches_memo(arena, id, s, &mut failed)))
        .collect();

    arena.sort_document_order(&mut found);
    found
}

/// Keep the nodes that match, preserving input order
pub fn filter(arena: &DomArena, nodes: &[NodeId], selector: &CompiledSelector) -> Vec<NodeId> {
    let mut failed = Failed::default();
    nodes
        .iter()
        .copied()
        .filter(|&id| matches_memo(arena, id, selector, &mut failed))
        .collect()
}

/// Nearest inclusive ancestor matching the selector
pub fn closest(arena: &DomArena, node_id: NodeId, selector: &CompiledSelector) -> Option<NodeId> {
    let mut failed = Failed::default();
    std::iter::once(node_id)
        .chain(arena.ancestors(node_id))
        .find(|&id| matches_memo(arena, id, selector, &mut failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_document, ParseConfig};

    const PAGE: &str = r#"
        <section id="content">
            <article class="post" data-id="1"><h2>First</h2><p>one</p><a class="read-more" href="/1">Read</a></article>
            <article class="post featured" data-id="2"><h2>Second</h2><p>two</p></article>
            <div class="ad"><p>ad</p></div>
            <article class="post" data-id="3"><h2>Third</h2><p></p></article>
        </section>
        <ul><li>a</li><li>b</li><li>c</li><li>d</li></ul>
    "#;

    fn arena() -> DomArena {
        parse_document(PAGE, &ParseConfig::default())
    }

    fn select(arena: &DomArena, selector: &str) -> Vec<NodeId> {
        let compiled = CompiledSelector::compile(selector).unwrap();
        find(arena, &[arena.root_id()], &compiled)
    }

    fn texts(arena: &DomArena, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|&id| {
                let mut out = String::new();
                arena.collect_text(id, &mut out);
                out
            })
            .collect()
    }

    #[test]
    fn test_tag_class_id_attr() {
        let arena = arena();
        assert_eq!(select(&arena, "article").len(), 3);
        assert_eq!(select(&arena, ".post").len(), 3);
        assert_eq!(select(&arena, "article.featured h2").len(), 1);
        assert_eq!(select(&arena, "#content p").len(), 4);
        assert_eq!(texts(&arena, &select(&arena, "[data-id='2'] h2")), vec!["Second"]);
        assert_eq!(select(&arena, "a[href]").len(), 1);
        assert_eq!(select(&arena, "a[href=/2]").len(), 0);
        assert_eq!(select(&arena, "ARTICLE[DATA-ID=\"3\"]").len(), 1);
    }

    #[test]
    fn test_descendant_vs_child() {
        let arena = arena();
        assert_eq!(select(&arena, "section p").len(), 4);
        assert_eq!(select(&arena, "section > p").len(), 0);
        assert_eq!(select(&arena, "section > article > p").len(), 3);
        assert_eq!(select(&arena, "body > section > div.ad p").len(), 1);
    }

    #[test]
    fn test_backtracking_through_ancestors() {
        let arena = parse_document(
            "<div class=a><div class=b><span><i>x</i></span></div></div>",
            &ParseConfig::default(),
        );
        assert_eq!(select(&arena, ".a span > i").len(), 1);
        assert_eq!(select(&arena, ".a > .b i").len(), 1);
        assert_eq!(select(&arena, ".b > .a i").len(), 0);
        assert_eq!(select(&arena, "div div div i").len(), 0);
    }

    #[test]
    fn test_deep_nesting_with_many_descendant_steps() {
        let depth = 40;
        let html = format!("{}<span>x</span>{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let arena = parse_document(&html, &ParseConfig::default());

        let started = std::time::Instant::now();
        assert!(select(&arena, "p div div div div div div div div span").is_empty());
        assert_eq!(select(&arena, "div div div div div div div div span").len(), 1);
        assert_eq!(select(&arena, "body div div div div div div div div").len(), depth - 7);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_first_last_child_use_tag_filter() {
        let arena = arena();
        // The trailing div.ad sits between the articles, the last article
        // is still `article:last-child`
        assert_eq!(
            texts(&arena, &select(&arena, "article:last-child h2")),
            vec!["Third"]
        );
        assert_eq!(
            texts(&arena, &select(&arena, "article:first-child h2")),
            vec!["First"]
        );
        assert_eq!(texts(&arena, &select(&arena, "li:last-child")), vec!["d"]);
        assert_eq!(select(&arena, "section > :last-child").len(), 1);
    }

    #[test]
    fn test_nth_child_counts_all_elements() {
        let arena = arena();
        // div.ad is the 3rd element child, so the third article is 4th
        assert_eq!(
            texts(&arena, &select(&arena, "article:nth-child(4) h2")),
            vec!["Third"]
        );
        assert!(select(&arena, "article:nth-child(3)").is_empty());
        assert_eq!(texts(&arena, &select(&arena, "li:nth-child(odd)")), vec!["a", "c"]);
        assert_eq!(texts(&arena, &select(&arena, "li:nth-child(even)")), vec!["b", "d"]);
        assert!(select(&arena, "li:nth-child(0)").is_empty());
    }

    #[test]
    fn test_only_child_and_empty() {
        let arena = arena();
        assert_eq!(select(&arena, "div.ad > p:only-child").len(), 1);
        assert_eq!(select(&arena, "p:empty").len(), 1);
    }

    #[test]
    fn test_scoped_find_excludes_scope_and_outside() {
        let arena = arena();
        let articles = select(&arena, "article");
        let compiled = CompiledSelector::compile("p").unwrap();
        let found = find(&arena, &articles, &compiled);
        assert_eq!(found.len(), 3);
        for id in &found {
            assert!(arena.ancestors(*id).any(|a| articles.contains(&a)));
        }

        let article = CompiledSelector::compile("article").unwrap();
        assert!(find(&arena, &articles, &article).is_empty());
    }

    #[test]
    fn test_nested_scopes_deduplicate() {
        let arena = arena();
        let section = select(&arena, "section");
        let articles = select(&arena, "article");
        let scope: Vec<_> = articles.iter().chain(section.iter()).copied().collect();
        let h2 = CompiledSelector::compile("h2").unwrap();
        let found = find(&arena, &scope, &h2);
        assert_eq!(texts(&arena, &found), vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_children_and_closest() {
        let arena = arena();
        let section = select(&arena, "section");
        assert_eq!(children(&arena, &section, None).len(), 4);
        let only_articles = CompiledSelector::compile("article").unwrap();
        assert_eq!(children(&arena, &section, Some(&only_articles)).len(), 3);

        let link = select(&arena, "a.read-more")[0];
        let post = CompiledSelector::compile("article.post").unwrap();
        let found = closest(&arena, link, &post).unwrap();
        assert_eq!(arena.node(found).attr("data-id"), Some("1"));

        let anchor = CompiledSelector::compile("a").unwrap();
        assert_eq!(closest(&arena, link, &anchor), Some(link));
        let table = CompiledSelector::compile("table").unwrap();
        assert_eq!(closest(&arena, link, &table), None);
    }

    #[test]
    fn test_no_match_is_empty() {
        let arena = arena();
        assert!(select(&arena, "video").is_empty());
    }
}
