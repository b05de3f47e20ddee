//! Arena-based DOM tree storage
//!
//! "Bad programmers worry about the code. Good programmers worry about
//! data structures and their relationships."
//!
//! Parent links are plain indices, so bidirectional links never form an
//! ownership cycle. The arena eliminates:
//! - Rc/RefCell per node
//! - Recursive walks (stack overflow risk on deep markup)
//! - Cache misses (nodes stored sequentially)
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<DomNode>
//!        [Document][html][head]...
//!         ↑ 4-byte index, not 8-byte pointer
//! ```

use crate::error::{DomError, Result};
use crate::types::{DomNode, NodeData, NodeId};

/// Rank given to nodes that are not reachable from the root
const DETACHED: u32 = u32::MAX;

/// Arena allocator for DOM nodes
///
/// Design:
/// - Single Vec<DomNode> for sequential allocation
/// - Slot 0 is always the Document node
/// - A parallel pre-order rank table answers "document order" in O(1)
#[derive(Debug, Clone)]
pub struct DomArena {
    /// All nodes stored sequentially (cache-friendly)
    nodes: Vec<DomNode>,

    /// Pre-order rank of each node, `DETACHED` when unreachable
    order: Vec<u32>,
}

impl DomArena {
    /// Create an arena holding only the Document node
    pub fn new() -> Self {
        Self::with_capacity(1024) // Pre-allocate for typical page
    }

    /// Create arena with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.max(1));
        nodes.push(DomNode::new(0, NodeData::Document));
        let mut order = Vec::with_capacity(capacity.max(1));
        order.push(0);
        Self { nodes, order }
    }

    /// Add a detached node to the arena, returns its ID
    pub fn add_node(&mut self, data: NodeData) -> NodeId {
        let node_id = self.nodes.len() as NodeId;
        self.nodes.push(DomNode::new(node_id, data));
        self.order.push(DETACHED);
        node_id
    }

    /// Append `child` as the last child of `parent`.
    ///
    /// Ranks are not refreshed here; call [`DomArena::renumber`] once the
    /// tree is built.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old_parent) = self.nodes[child as usize].parent_id {
            self.nodes[old_parent as usize]
                .children_ids
                .retain(|id| *id != child);
        }
        self.nodes[child as usize].parent_id = Some(parent);
        self.nodes[parent as usize].children_ids.push(child);
    }

    /// Get node by ID. IDs are only minted by this arena, so a foreign
    /// ID is a programming error.
    pub fn node(&self, node_id: NodeId) -> &DomNode {
        &self.nodes[node_id as usize]
    }

    /// The Document node
    pub fn root_id(&self) -> NodeId {
        0
    }

    /// Total number of nodes, including the Document node and detached nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the arena holds nothing but the Document node
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn parent_id(&self, node_id: NodeId) -> Option<NodeId> {
        self.node(node_id).parent_id
    }

    /// Parent, only if it is an element
    pub fn parent_element(&self, node_id: NodeId) -> Option<NodeId> {
        self.parent_id(node_id)
            .filter(|&parent| self.node(parent).is_element())
    }

    /// All children, document order
    pub fn children(&self, node_id: NodeId) -> &[NodeId] {
        &self.node(node_id).children_ids
    }

    /// Element children only (text, comments and doctypes skipped)
    pub fn element_children(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node_id)
            .iter()
            .copied()
            .filter(move |&id| self.node(id).is_element())
    }

    /// Element siblings of a node, excluding the node itself
    pub fn element_siblings(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.parent_id(node_id)
            .into_iter()
            .flat_map(move |parent| self.element_children(parent))
            .filter(move |&id| id != node_id)
    }

    /// Next element sibling
    pub fn next_element(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent_id(node_id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&id| id == node_id)?;
        siblings[pos + 1..]
            .iter()
            .copied()
            .find(|&id| self.node(id).is_element())
    }

    /// Previous element sibling
    pub fn prev_element(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent_id(node_id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&id| id == node_id)?;
        siblings[..pos]
            .iter()
            .rev()
            .copied()
            .find(|&id| self.node(id).is_element())
    }

    /// Ancestors, nearest first, excluding the node itself
    pub fn ancestors(&self, node_id: NodeId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: self.parent_id(node_id),
        }
    }

    /// Pre-order descendants, excluding the node itself
    pub fn descendants(&self, node_id: NodeId) -> Descendants<'_> {
        Descendants {
            arena: self,
            stack: self.children(node_id).iter().rev().copied().collect(),
        }
    }

    /// Traverse tree depth-first (iterative, no recursion), start included
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F)
    where
        F: FnMut(&DomNode),
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.node(node_id);
            visit(node);

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }
    }

    /// Append all text under `node_id` (inclusive) to `out`, document order
    pub fn collect_text(&self, node_id: NodeId, out: &mut String) {
        self.traverse_df(node_id, |node| {
            if let NodeData::Text(text) = &node.data {
                out.push_str(text);
            }
        });
    }

    /// Pre-order rank of a node; detached nodes rank last
    pub fn order_of(&self, node_id: NodeId) -> u32 {
        self.order[node_id as usize]
    }

    /// Sort into document order and drop duplicates
    pub fn sort_document_order(&self, ids: &mut Vec<NodeId>) {
        ids.sort_unstable_by_key(|&id| (self.order_of(id), id));
        ids.dedup();
    }

    /// Recompute pre-order ranks after a structural change
    pub fn renumber(&mut self) {
        self.order.iter_mut().for_each(|rank| *rank = DETACHED);
        let mut rank = 0u32;
        let mut stack = vec![self.root_id()];
        while let Some(node_id) = stack.pop() {
            self.order[node_id as usize] = rank;
            rank += 1;
            stack.extend(self.nodes[node_id as usize].children_ids.iter().rev());
        }
    }

    /// Set an attribute on an element
    pub fn set_attribute(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        let el = self.nodes[node_id as usize]
            .element_mut()
            .ok_or(DomError::NotAnElement(node_id))?;
        el.set_attr(name, value);
        Ok(())
    }

    /// Remove an attribute from an element, returns whether it existed
    pub fn remove_attribute(&mut self, node_id: NodeId, name: &str) -> Result<bool> {
        let el = self.nodes[node_id as usize]
            .element_mut()
            .ok_or(DomError::NotAnElement(node_id))?;
        Ok(el.remove_attr(name))
    }

    /// Replace all children of an element. Old children stay in the arena
    /// but become detached.
    pub fn replace_children(&mut self, parent: NodeId, new_children: &[NodeId]) -> Result<()> {
        self.splice_children(parent, new_children)?;
        self.renumber();
        Ok(())
    }

    /// [`DomArena::replace_children`] without the renumbering. Document order
    /// is stale until the caller runs [`DomArena::renumber`]; batch writers
    /// do that once after the last splice.
    pub fn splice_children(&mut self, parent: NodeId, new_children: &[NodeId]) -> Result<()> {
        if !self.node(parent).is_element() {
            return Err(DomError::NotAnElement(parent));
        }
        let old = std::mem::take(&mut self.nodes[parent as usize].children_ids);
        for child in old {
            self.nodes[child as usize].parent_id = None;
        }
        for &child in new_children {
            self.append_child(parent, child);
        }
        Ok(())
    }

    /// Copy the subtree rooted at `src_id` of another arena into this one.
    /// Returns the detached copy's root.
    pub fn import_subtree(&mut self, src: &DomArena, src_id: NodeId) -> NodeId {
        let new_root = self.add_node(src.node(src_id).data.clone());
        let mut stack = vec![(src_id, new_root)];

        while let Some((from, to)) = stack.pop() {
            for &child in src.children(from) {
                let copy = self.add_node(src.node(child).data.clone());
                self.append_child(to, copy);
                stack.push((child, copy));
            }
        }

        new_root
    }

    /// Structural equality of two subtrees, possibly in different arenas
    pub fn subtree_eq(&self, id: NodeId, other: &DomArena, other_id: NodeId) -> bool {
        let mut stack = vec![(id, other_id)];

        while let Some((a, b)) = stack.pop() {
            let (left, right) = (self.node(a), other.node(b));
            if left.data != right.data || left.children_ids.len() != right.children_ids.len() {
                return false;
            }
            stack.extend(
                left.children_ids
                    .iter()
                    .copied()
                    .zip(right.children_ids.iter().copied()),
            );
        }

        true
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Upward walk, see [`DomArena::ancestors`]
pub struct Ancestors<'a> {
    arena: &'a DomArena,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.arena.parent_id(current);
        Some(current)
    }
}

/// Pre-order walk, see [`DomArena::descendants`]
pub struct Descendants<'a> {
    arena: &'a DomArena,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;
        self.stack
            .extend(self.arena.children(current).iter().rev().copied());
        Some(current)
    }
}
