//! Positional index over a DOM tree.
//!
//! Every attached node gets two sibling-index chains from the index root:
//! one counting all child nodes and one counting element children only.
//! Ancestor, above/below and common-ancestor questions then cost O(depth)
//! instead of a tree walk.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::dom_tree::{DomTree, NodeId};

/// Attribute marking elements inserted by the host integration itself.
/// Mutations inside such elements do not invalidate the index.
pub const INJECTED_MARKER: &str = "data-folio-injected";

/// Path of a node from the index root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodePosition {
    /// Child indices counting every node
    pub nodes: Vec<usize>,
    /// Child indices counting elements only; text nodes share their parent's
    pub elements: Vec<usize>,
}

/// Side table from node to [`NodePosition`].
#[derive(Debug, Clone, Default)]
pub struct PositionIndex {
    positions: HashMap<NodeId, NodePosition>,
    root: Option<NodeId>,
}

impl PositionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index rooted at `root`
    pub fn build(tree: &DomTree, root: NodeId) -> Self {
        let mut index = Self::new();
        index.compute(tree, root);
        index
    }

    /// Discard all positions and recompute them for the subtree at `root`
    pub fn compute(&mut self, tree: &DomTree, root: NodeId) {
        self.positions.clear();
        self.root = Some(root);
        self.positions.insert(root, NodePosition::default());

        let mut stack = vec![root];
        while let Some(parent) = stack.pop() {
            let Some(parent_pos) = self.positions.get(&parent).cloned() else {
                continue;
            };
            let mut element_index = 0;
            for (child_index, child) in tree.children(parent).iter().enumerate() {
                let mut pos = parent_pos.clone();
                pos.nodes.push(child_index);
                if tree.is_element(*child) {
                    pos.elements.push(element_index);
                    element_index += 1;
                    stack.push(*child);
                }
                self.positions.insert(*child, pos);
            }
        }
    }

    /// Root the index was last computed from
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn position(&self, node: NodeId) -> Option<&NodePosition> {
        self.positions.get(&node)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether `ancestor`'s path is a strict prefix of `node`'s path
    pub fn is_ancestor(&self, node: NodeId, ancestor: NodeId) -> bool {
        match (self.position(node), self.position(ancestor)) {
            (Some(n), Some(a)) => a.nodes.len() < n.nodes.len() && n.nodes.starts_with(&a.nodes),
            _ => false,
        }
    }

    /// Order of two nodes that sit on different lines of descent.
    ///
    /// Returns `None` when either node is unknown or when one is an ancestor
    /// of the other (or they are the same node): such pairs are incomparable.
    pub fn compare(&self, a: NodeId, b: NodeId) -> Option<Ordering> {
        let (pa, pb) = (self.position(a)?, self.position(b)?);
        pa.nodes
            .iter()
            .zip(pb.nodes.iter())
            .map(|(x, y)| x.cmp(y))
            .find(|ord| *ord != Ordering::Equal)
    }

    /// `a` precedes `b` and neither contains the other
    pub fn is_above(&self, a: NodeId, b: NodeId) -> bool {
        self.compare(a, b) == Some(Ordering::Less)
    }

    /// `a` follows `b` and neither contains the other
    pub fn is_below(&self, a: NodeId, b: NodeId) -> bool {
        self.compare(a, b) == Some(Ordering::Greater)
    }

    /// Total document (pre-)order: ancestors precede their descendants
    pub fn document_order(&self, a: NodeId, b: NodeId) -> Option<Ordering> {
        let (pa, pb) = (self.position(a)?, self.position(b)?);
        Some(pa.nodes.cmp(&pb.nodes))
    }

    /// Deepest element containing both nodes (a node contains itself).
    ///
    /// Returns `None` when either node is not part of the indexed tree.
    pub fn closest_common_ancestor(&self, tree: &DomTree, a: NodeId, b: NodeId) -> Option<NodeId> {
        let (pa, pb) = (self.position(a)?, self.position(b)?);
        let shared = pa
            .elements
            .iter()
            .zip(pb.elements.iter())
            .take_while(|(x, y)| x == y)
            .count();

        let mut node = self.root?;
        for index in &pa.elements[..shared] {
            node = tree.element_children(node).nth(*index)?;
        }
        Some(node)
    }
}

/// Whether an added node lies outside every host-injected element
pub fn is_foreign_addition(tree: &DomTree, node: NodeId) -> bool {
    std::iter::once(node)
        .chain(tree.ancestors(node))
        .all(|n| !tree.has_attr(n, INJECTED_MARKER))
}

/// Trailing-edge debounce: fires once `delay` has passed without a new note.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    /// Record activity at `now`, pushing the deadline back
    pub fn note(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Pending deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the pending deadline if it has passed
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::Document;

    const HTML: &str = r#"<body><div id="a">text<p id="b">one</p><p id="c">two<span id="d">x</span></p></div><p id="e">tail</p></body>"#;

    fn setup() -> (Document, PositionIndex) {
        let doc = Document::parse(HTML).unwrap();
        let index = PositionIndex::build(doc.tree(), doc.tree().root());
        (doc, index)
    }

    fn id(doc: &Document, name: &str) -> NodeId {
        doc.tree().element_by_id(name).unwrap()
    }

    #[test]
    fn test_position_extends_parent() {
        let (doc, index) = setup();
        let b = index.position(id(&doc, "b")).unwrap();
        let a = index.position(id(&doc, "a")).unwrap();
        assert!(b.nodes.starts_with(&a.nodes));
        assert_eq!(b.nodes.len(), a.nodes.len() + 1);
        assert_eq!(*b.nodes.last().unwrap(), 1);
        assert_eq!(*b.elements.last().unwrap(), 0);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let (doc, mut index) = setup();
        let before: Vec<_> = doc.tree().descendants(doc.tree().root()).map(|n| index.position(n).cloned()).collect();
        index.compute(doc.tree(), doc.tree().root());
        let after: Vec<_> = doc.tree().descendants(doc.tree().root()).map(|n| index.position(n).cloned()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_is_ancestor() {
        let (doc, index) = setup();
        assert!(index.is_ancestor(id(&doc, "d"), id(&doc, "a")));
        assert!(index.is_ancestor(id(&doc, "d"), id(&doc, "c")));
        assert!(!index.is_ancestor(id(&doc, "a"), id(&doc, "d")));
        assert!(!index.is_ancestor(id(&doc, "b"), id(&doc, "c")));
        assert!(!index.is_ancestor(id(&doc, "a"), id(&doc, "a")));
    }

    #[test]
    fn test_above_and_below() {
        let (doc, index) = setup();
        assert!(index.is_above(id(&doc, "b"), id(&doc, "c")));
        assert!(index.is_below(id(&doc, "e"), id(&doc, "d")));
        assert!(!index.is_above(id(&doc, "c"), id(&doc, "b")));
    }

    #[test]
    fn test_same_lineage_is_incomparable() {
        let (doc, index) = setup();
        assert_eq!(index.compare(id(&doc, "a"), id(&doc, "d")), None);
        assert!(!index.is_above(id(&doc, "a"), id(&doc, "d")));
        assert!(!index.is_below(id(&doc, "a"), id(&doc, "d")));
        assert!(!index.is_above(id(&doc, "a"), id(&doc, "a")));
        assert_eq!(index.document_order(id(&doc, "a"), id(&doc, "d")), Some(Ordering::Less));
    }

    #[test]
    fn test_closest_common_ancestor() {
        let (doc, index) = setup();
        let tree = doc.tree();
        assert_eq!(index.closest_common_ancestor(tree, id(&doc, "b"), id(&doc, "d")), Some(id(&doc, "a")));
        assert_eq!(index.closest_common_ancestor(tree, id(&doc, "c"), id(&doc, "d")), Some(id(&doc, "c")));
        assert_eq!(index.closest_common_ancestor(tree, id(&doc, "b"), id(&doc, "e")), doc.body());

        let text = tree.children(id(&doc, "a"))[0];
        assert_eq!(index.closest_common_ancestor(tree, text, id(&doc, "b")), Some(id(&doc, "a")));
    }

    #[test]
    fn test_unindexed_nodes() {
        let (mut doc, index) = setup();
        let host = id(&doc, "e");
        let added = doc.tree_mut().append_html(host, "<b>late</b>").unwrap()[0];
        assert!(index.position(added).is_none());
        assert_eq!(index.closest_common_ancestor(doc.tree(), added, host), None);
        assert!(!index.is_ancestor(added, host));
    }

    #[test]
    fn test_foreign_addition() {
        let doc = Document::parse(r#"<body><div data-folio-injected="1"><span id="own">x</span></div><p id="page">y</p></body>"#)
            .unwrap();
        assert!(!is_foreign_addition(doc.tree(), id(&doc, "own")));
        assert!(is_foreign_addition(doc.tree(), id(&doc, "page")));
    }

    #[test]
    fn test_debounce_trailing_edge() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_millis(500));
        assert!(!debounce.take_due(start));

        debounce.note(start);
        debounce.note(start + Duration::from_millis(300));
        assert!(!debounce.take_due(start + Duration::from_millis(600)));
        assert!(debounce.take_due(start + Duration::from_millis(800)));
        assert!(!debounce.is_pending());
    }
}
