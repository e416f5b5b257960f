//! Arena-backed DOM tree.
//!
//! Pages are parsed with `scraper` and copied into a [`DomTree`], an arena
//! of [`DomNode`]s addressed by [`NodeId`]. Node ids never change for the
//! lifetime of a tree, so analysis stages keep their per-node state in side
//! tables keyed by id instead of decorating the nodes themselves.

use ego_tree::NodeRef;
use scraper::{Html, Node};

use crate::{FolioError, Result};

/// Safely truncate a string to at most `max_len` bytes at a character boundary
pub(crate) fn truncate_at_char_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }

    let safe_len = s.floor_char_boundary(max_len);
    &s[..safe_len]
}

/// Collapse runs of whitespace into single spaces and trim both ends
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}

/// Tags whose content is never rendered as text
const NON_RENDERED_TAGS: &[&str] = &["head", "script", "style", "noscript", "template", "title", "meta", "link"];

/// Tags that start and end their own line when rendered
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "details",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "table",
    "tr",
    "ul",
];

/// Stable handle of a node inside a [`DomTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Tag name and attributes of an element node.
#[derive(Debug, Clone)]
pub struct ElementData {
    /// Lower-case tag name
    pub tag_name: String,
    /// Attributes in source order
    pub attrs: Vec<(String, String)>,
}

impl ElementData {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Payload of a node.
#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
}

/// A node in the DOM tree
#[derive(Debug, Clone)]
pub struct DomNode {
    /// What the node holds
    pub data: NodeData,
    /// Parent node ID (if any)
    pub parent_id: Option<NodeId>,
    /// Child node IDs in document order
    pub child_ids: Vec<NodeId>,
}

/// A DOM tree structure that tracks parent-child relationships
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<DomNode>,
    /// Bumped by every mutation
    revision: u64,
}

impl DomTree {
    /// Create a tree holding only the document node
    pub fn new() -> Self {
        Self { nodes: vec![DomNode { data: NodeData::Document, parent_id: None, child_ids: Vec::new() }], revision: 0 }
    }

    /// Mutation counter; equal revisions of the same tree have the same shape and content
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Copy a parsed `scraper` document into a new tree
    pub fn from_html(html: &Html) -> Self {
        let mut tree = Self::new();
        let root = tree.root();
        tree.import_children(html.tree.root(), root);
        tree
    }

    fn push(&mut self, data: NodeData, parent_id: Option<NodeId>) -> NodeId {
        let node_id = NodeId(self.nodes.len());
        self.revision += 1;
        self.nodes.push(DomNode { data, parent_id, child_ids: Vec::new() });
        if let Some(parent) = parent_id
            && let Some(parent_node) = self.nodes.get_mut(parent.0)
        {
            parent_node.child_ids.push(node_id);
        }
        node_id
    }

    /// Import the children of a `scraper` node below `parent`, depth first.
    fn import_children(&mut self, source: NodeRef<'_, Node>, parent: NodeId) -> Vec<NodeId> {
        let mut top_level = Vec::new();
        let mut stack: Vec<(NodeRef<'_, Node>, NodeId)> = source.children().rev().map(|c| (c, parent)).collect();

        while let Some((node, parent_id)) = stack.pop() {
            let data = match node.value() {
                Node::Element(el) => NodeData::Element(ElementData {
                    tag_name: el.name().to_lowercase(),
                    attrs: el.attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                }),
                Node::Text(text) => {
                    let content: &str = text;
                    NodeData::Text(content.to_string())
                }
                _ => continue,
            };
            let is_element = matches!(data, NodeData::Element(_));
            let id = self.push(data, Some(parent_id));
            if parent_id == parent {
                top_level.push(id);
            }
            if is_element {
                for child in node.children().rev() {
                    stack.push((child, id));
                }
            }
        }

        top_level
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Get a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id.0)
    }

    /// Whether `id` was handed out by this tree
    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Get the total number of nodes, detached ones included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Every node id handed out so far, detached ones included
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Check if the tree holds nothing but the document node
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id)?.parent_id
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get_node(id).map(|n| n.child_ids.as_slice()).unwrap_or(&[])
    }

    /// Element children only, in document order
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().copied().filter(|c| self.is_element(*c))
    }

    /// Strict ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors { tree: self, next: self.parent(id) }
    }

    /// Strict descendants in pre-order
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants { tree: self, stack: self.children(id).iter().rev().copied().collect() }
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.get_node(id)?.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.get_node(id).map(|n| &n.data), Some(NodeData::Text(_)))
    }

    /// Lower-case tag name of an element
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag_name.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// `class` and `id` attributes joined with a space, for pattern matching
    pub fn class_and_id(&self, id: NodeId) -> String {
        let class = self.attr(id, "class").unwrap_or_default();
        let ident = self.attr(id, "id").unwrap_or_default();
        format!("{} {}", class, ident).trim().to_string()
    }

    /// Data of a text node
    pub fn text_data(&self, id: NodeId) -> Option<&str> {
        match &self.get_node(id)?.data {
            NodeData::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Concatenated data of the direct text children
    pub fn own_text(&self, id: NodeId) -> String {
        self.children(id).iter().filter_map(|c| self.text_data(*c)).collect()
    }

    /// Concatenated data of every descendant text node
    pub fn text(&self, id: NodeId) -> String {
        if let Some(text) = self.text_data(id) {
            return text.to_string();
        }
        self.descendants(id).filter_map(|d| self.text_data(d)).collect()
    }

    /// Rendered text of a subtree, one output line per block.
    ///
    /// `is_rendered` is consulted for every element; returning `false` drops
    /// the element and its subtree the way `display: none` would.
    pub fn inner_text(&self, id: NodeId, is_rendered: impl Fn(NodeId) -> bool) -> String {
        enum Step {
            Enter(NodeId),
            Exit(NodeId),
        }

        let mut raw = String::new();
        let mut stack = vec![Step::Enter(id)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(node) => {
                    if let Some(text) = self.text_data(node) {
                        for c in text.chars() {
                            if !c.is_whitespace() {
                                raw.push(c);
                            } else if !raw.ends_with([' ', '\n']) {
                                raw.push(' ');
                            }
                        }
                        continue;
                    }
                    let Some(tag) = self.tag_name(node) else {
                        stack.extend(self.children(node).iter().rev().map(|c| Step::Enter(*c)));
                        continue;
                    };
                    if NON_RENDERED_TAGS.contains(&tag) || !is_rendered(node) {
                        continue;
                    }
                    if tag == "br" || BLOCK_TAGS.contains(&tag) || tag == "td" || tag == "th" {
                        raw.push('\n');
                    }
                    stack.push(Step::Exit(node));
                    stack.extend(self.children(node).iter().rev().map(|c| Step::Enter(*c)));
                }
                Step::Exit(node) => {
                    if self.tag_name(node).is_some_and(|tag| BLOCK_TAGS.contains(&tag)) {
                        raw.push('\n');
                    }
                }
            }
        }

        raw.lines()
            .map(collapse_whitespace)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First element (document order) with the given `id` attribute
    pub fn element_by_id(&self, ident: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|n| self.attr(*n, "id") == Some(ident))
    }

    /// All attached elements with the given tag, in document order
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .filter(|n| self.tag_name(*n) == Some(tag))
            .collect()
    }

    pub fn html_element(&self) -> Option<NodeId> {
        self.element_children(self.root()).find(|c| self.tag_name(*c) == Some("html"))
    }

    pub fn body(&self) -> Option<NodeId> {
        let html = self.html_element()?;
        self.element_children(html).find(|c| self.tag_name(*c) == Some("body"))
    }

    /// Whether the node is still reachable from the document node
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root() || self.ancestors(id).last() == Some(self.root())
    }

    /// Parse `fragment` and append its top-level nodes to `parent`.
    ///
    /// Returns the ids of the appended top-level nodes.
    pub fn append_html(&mut self, parent: NodeId, fragment: &str) -> Result<Vec<NodeId>> {
        if !self.contains(parent) || self.is_text(parent) {
            return Err(FolioError::UnknownNode(parent.0));
        }
        let parsed = Html::parse_fragment(fragment);
        let container = parsed.root_element();
        Ok(self.import_children(*container, parent))
    }

    /// Append a new empty element to `parent`
    pub fn append_element(&mut self, parent: NodeId, tag_name: &str, attrs: &[(&str, &str)]) -> Result<NodeId> {
        if !self.contains(parent) || self.is_text(parent) {
            return Err(FolioError::UnknownNode(parent.0));
        }
        let data = ElementData {
            tag_name: tag_name.to_lowercase(),
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        };
        Ok(self.push(NodeData::Element(data), Some(parent)))
    }

    /// Append a text node to `parent`
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId> {
        if !self.contains(parent) || self.is_text(parent) {
            return Err(FolioError::UnknownNode(parent.0));
        }
        Ok(self.push(NodeData::Text(text.to_string()), Some(parent)))
    }

    /// Detach a node and its subtree from its parent
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        let parent = self
            .get_node(id)
            .ok_or(FolioError::UnknownNode(id.0))?
            .parent_id;
        self.revision += 1;
        if let Some(parent) = parent
            && let Some(parent_node) = self.nodes.get_mut(parent.0)
        {
            parent_node.child_ids.retain(|c| *c != id);
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.parent_id = None;
        }
        Ok(())
    }

    /// Set or replace an attribute on an element
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let node = self.nodes.get_mut(id.0).ok_or(FolioError::UnknownNode(id.0))?;
        let NodeData::Element(el) = &mut node.data else {
            return Err(FolioError::UnknownNode(id.0));
        };
        match el.attrs.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value.to_string(),
            None => el.attrs.push((name.to_string(), value.to_string())),
        }
        self.revision += 1;
        Ok(())
    }

    /// Replace the data of a text node, or the children of an element with one text node
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        let node = self.nodes.get_mut(id.0).ok_or(FolioError::UnknownNode(id.0))?;
        match &mut node.data {
            NodeData::Text(data) => {
                *data = text.to_string();
                self.revision += 1;
                return Ok(());
            }
            NodeData::Document => return Err(FolioError::UnknownNode(id.0)),
            NodeData::Element(_) => {}
        }
        let detached = std::mem::take(&mut node.child_ids);
        for child in detached {
            if let Some(child_node) = self.nodes.get_mut(child.0) {
                child_node.parent_id = None;
            }
        }
        self.push(NodeData::Text(text.to_string()), Some(id));
        Ok(())
    }

    /// CSS-like path from `<body>` down to the element, e.g. `body > div#main > p.lead`
    pub fn css_path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let chain = std::iter::once(id).chain(self.ancestors(id));
        for node in chain {
            let Some(el) = self.element(node) else { break };
            let mut part = el.tag_name.clone();
            if let Some(ident) = el.attr("id").filter(|v| !v.is_empty()) {
                part.push('#');
                part.push_str(ident);
            }
            for class in el.attr("class").unwrap_or_default().split_whitespace() {
                part.push('.');
                part.push_str(class);
            }
            parts.push(part);
            if el.tag_name == "body" {
                break;
            }
        }
        parts.reverse();
        parts.join(" > ")
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the ancestors of a node
pub struct Ancestors<'a> {
    tree: &'a DomTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

/// Pre-order iterator over the descendants of a node
pub struct Descendants<'a> {
    tree: &'a DomTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;
        self.stack.extend(self.tree.children(current).iter().rev());
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(html: &str) -> DomTree {
        DomTree::from_html(&Html::parse_document(html))
    }

    #[test]
    fn test_build_dom_tree() {
        let dom = tree(r#"<div class="container"><article class="post"><p>Test paragraph</p></article></div>"#);
        assert!(!dom.is_empty());
        let p = dom.elements_by_tag("p")[0];
        let article = dom.parent(p).unwrap();
        assert_eq!(dom.tag_name(article), Some("article"));
        assert_eq!(dom.tag_name(dom.parent(article).unwrap()), Some("div"));
    }

    #[test]
    fn test_children_keep_document_order() {
        let dom = tree("<ul><li>one</li><li>two</li><li>three</li></ul>");
        let ul = dom.elements_by_tag("ul")[0];
        let texts: Vec<String> = dom.element_children(ul).map(|li| dom.text(li)).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_own_text_excludes_descendants() {
        let dom = tree("<div>outer, text<span>inner.</span></div>");
        let div = dom.elements_by_tag("div")[0];
        assert_eq!(dom.own_text(div), "outer, text");
        assert_eq!(dom.text(div), "outer, textinner.");
    }

    #[test]
    fn test_inner_text_breaks_blocks_and_skips_hidden() {
        let dom = tree("<div><h1>Title</h1>Lead <b>bold</b> tail<p>Para</p><p id=\"x\">Hidden</p><script>no()</script></div>");
        let div = dom.elements_by_tag("div")[0];
        let hidden = dom.element_by_id("x").unwrap();
        let text = dom.inner_text(div, |n| n != hidden);
        assert_eq!(text, "Title\nLead bold tail\nPara");
    }

    #[test]
    fn test_inner_text_collapses_source_newlines() {
        let dom = tree("<div><p>One line\n   wrapped in source</p><p>two<br>three</p></div>");
        let div = dom.elements_by_tag("div")[0];
        assert_eq!(dom.inner_text(div, |_| true), "One line wrapped in source\ntwo\nthree");
    }

    #[test]
    fn test_append_html_and_remove() {
        let mut dom = tree("<body><div id=\"host\"></div></body>");
        let host = dom.element_by_id("host").unwrap();
        let added = dom.append_html(host, "<p>new</p><p>more</p>").unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(dom.children(host).len(), 2);
        assert!(dom.is_attached(added[0]));

        dom.remove(added[0]).unwrap();
        assert!(!dom.is_attached(added[0]));
        assert_eq!(dom.children(host), &[added[1]]);
    }

    #[test]
    fn test_set_text_replaces_children() {
        let mut dom = tree("<p id=\"p\">a<b>b</b></p>");
        let p = dom.element_by_id("p").unwrap();
        dom.set_text(p, "fresh").unwrap();
        assert_eq!(dom.text(p), "fresh");
    }

    #[test]
    fn test_every_mutation_bumps_revision() {
        let mut dom = tree("<body><div id=\"host\"><p id=\"p\">a</p></div></body>");
        let host = dom.element_by_id("host").unwrap();
        let p = dom.element_by_id("p").unwrap();

        let mut last = dom.revision();
        let mut bumped = |dom: &DomTree| {
            let moved = dom.revision() > last;
            last = dom.revision();
            moved
        };
        dom.append_html(host, "<p>b</p>").unwrap();
        assert!(bumped(&dom));
        dom.set_attr(p, "class", "x").unwrap();
        assert!(bumped(&dom));
        dom.set_text(p, "c").unwrap();
        assert!(bumped(&dom));
        dom.remove(p).unwrap();
        assert!(bumped(&dom));
        assert!(dom.set_attr(NodeId(10_000), "class", "x").is_err());
        assert!(!bumped(&dom));
    }

    #[test]
    fn test_css_path() {
        let dom = tree(r#"<body><div id="main" class="post wide"><p>x</p></div></body>"#);
        let p = dom.elements_by_tag("p")[0];
        assert_eq!(dom.css_path(p), "body > div#main.post.wide > p");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_truncate_at_char_boundary() {
        assert_eq!(truncate_at_char_boundary("héllo", 2), "h");
        assert_eq!(truncate_at_char_boundary("abc", 10), "abc");
    }
}
