//! Rendering facts supplied by the host page.
//!
//! Content detection needs more than markup: whether an element is
//! displayed, how large it is, where the viewport currently is, and how far
//! a video has played. The [`Layout`] trait is the seam through which the
//! host answers those questions. [`StaticLayout`] answers them from inline
//! styles, size attributes and explicitly recorded geometry, which is what
//! the CLI and the tests use.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::dom_tree::{DomTree, NodeId};

/// Tags that never render a box of their own
pub const INVISIBLE_TAGS: &[&str] = &[
    "area", "base", "datalist", "head", "link", "map", "meta", "noscript", "param", "script", "source", "style",
    "template", "title", "track",
];

/// Elements that render a box regardless of their text
const REPLACED_TAGS: &[&str] = &["audio", "canvas", "embed", "hr", "iframe", "img", "object", "svg", "video"];

const LINE_HEIGHT: f64 = 20.0;
const CHAR_WIDTH: f64 = 8.0;
const DEFAULT_REPLACED_SIZE: (f64, f64) = (300.0, 150.0);

static STYLE_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|;)\s*([a-z-]+)\s*:\s*([^;]+)").unwrap());

static CSS_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").unwrap());

/// Axis-aligned box in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Whether the two boxes overlap by a non-zero area
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }

    /// Smallest box covering both
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }
}

/// The visible part of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn rect(&self) -> Rect {
        Rect::new(self.scroll_x, self.scroll_y, self.width, self.height)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { scroll_x: 0.0, scroll_y: 0.0, width: 1280.0, height: 800.0 }
    }
}

/// The subset of computed style the analysis looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display_none: bool,
    /// `visibility: hidden`
    pub visibility_hidden: bool,
    pub opacity: f64,
    /// Resolved `left` offset in pixels, when positioned
    pub left: Option<f64>,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self { display_none: false, visibility_hidden: false, opacity: 1.0, left: None }
    }
}

/// Playback position of a media element.
///
/// Anything the host can report a `PlaybackState` for is duration-able:
/// it exposes a current time, a duration and an ended flag.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackState {
    /// Seconds played
    pub current_time: f64,
    /// Total length in seconds, `None` while metadata is not loaded
    pub duration: Option<f64>,
    /// Whether playback reached the end
    pub ended: bool,
}

impl PlaybackState {
    /// Fraction played: 1 once ended, 0 before playback starts or while the
    /// duration is unknown.
    pub fn fraction(&self) -> f64 {
        if self.ended {
            return 1.0;
        }
        match self.duration {
            Some(duration) if duration.is_finite() && duration > 0.0 && self.current_time > 0.0 => {
                (self.current_time / duration).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

/// Rendering information provided by the host page.
pub trait Layout {
    /// Computed style of an element
    fn computed_style(&self, tree: &DomTree, node: NodeId) -> ComputedStyle;

    /// Border box in document coordinates, when the host knows it
    fn bounding_rect(&self, tree: &DomTree, node: NodeId) -> Option<Rect>;

    /// `(scrollWidth, scrollHeight)` of an element
    fn scroll_size(&self, tree: &DomTree, node: NodeId) -> (f64, f64);

    /// Current viewport
    fn viewport(&self) -> Viewport;

    /// Playback state of a duration-able element, `None` for anything else
    fn playback(&self, tree: &DomTree, node: NodeId) -> Option<PlaybackState>;

    /// Whether an element renders at all: not an invisible-by-default tag,
    /// no `hidden` attribute, displayed, not fully transparent, and with
    /// non-zero scroll extents.
    fn is_visible(&self, tree: &DomTree, node: NodeId) -> bool {
        let Some(tag) = tree.tag_name(node) else {
            return false;
        };
        if INVISIBLE_TAGS.contains(&tag) || tree.has_attr(node, "hidden") {
            return false;
        }
        let style = self.computed_style(tree, node);
        if style.display_none || style.visibility_hidden || style.opacity <= 0.0 {
            return false;
        }
        let (width, height) = self.scroll_size(tree, node);
        width > 0.0 && height > 0.0
    }

    /// Whether the element's box currently overlaps the viewport
    fn in_viewport(&self, tree: &DomTree, node: NodeId) -> bool {
        self.bounding_rect(tree, node)
            .is_some_and(|rect| rect.intersects(&self.viewport().rect()))
    }

    /// Rendered `(width, height)`, falling back to scroll extents
    fn rendered_size(&self, tree: &DomTree, node: NodeId) -> (f64, f64) {
        match self.bounding_rect(tree, node) {
            Some(rect) => (rect.width, rect.height),
            None => self.scroll_size(tree, node),
        }
    }
}

/// A [`Layout`] whose viewport and media state follow page events.
pub trait LiveLayout: Layout {
    fn scroll_to(&mut self, x: f64, y: f64);

    fn resize(&mut self, width: f64, height: f64);

    fn set_playback(&mut self, node: NodeId, state: PlaybackState);
}

/// Parse an inline `style` attribute into lower-case property/value pairs
fn inline_style(tree: &DomTree, node: NodeId) -> HashMap<String, String> {
    let Some(style) = tree.attr(node, "style") else {
        return HashMap::new();
    };
    STYLE_DECLARATION
        .captures_iter(style)
        .map(|caps| (caps[1].to_lowercase(), caps[2].trim().to_lowercase()))
        .collect()
}

fn css_number(value: &str) -> Option<f64> {
    CSS_NUMBER.captures(value).and_then(|caps| caps[1].parse().ok())
}

/// Layout derived from markup plus recorded geometry.
///
/// Elements without a recorded rect have no position, so they never
/// intersect the viewport; [`StaticLayout::flow`] assigns positions to a
/// whole subtree by stacking its text blocks vertically.
#[derive(Debug, Clone, Default)]
pub struct StaticLayout {
    viewport: Viewport,
    rects: HashMap<NodeId, Rect>,
    playback: HashMap<NodeId, PlaybackState>,
    rendering: RefCell<RenderingCache>,
}

/// Nodes with non-blank text or a replaced element at or below them,
/// valid for one tree revision.
#[derive(Debug, Clone, Default)]
struct RenderingCache {
    /// `(revision, node count)` the set was built for
    built_for: Option<(u64, usize)>,
    nodes: HashSet<NodeId>,
}

impl RenderingCache {
    fn rebuild(&mut self, tree: &DomTree) {
        self.nodes.clear();
        for node in tree.node_ids() {
            let renders = match tree.text_data(node) {
                Some(text) => !text.trim().is_empty(),
                None => tree.tag_name(node).is_some_and(|t| REPLACED_TAGS.contains(&t)),
            };
            if !renders || !self.nodes.insert(node) {
                continue;
            }
            for ancestor in tree.ancestors(node) {
                if !self.nodes.insert(ancestor) {
                    break;
                }
            }
        }
        self.built_for = Some((tree.revision(), tree.len()));
    }
}

impl StaticLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_viewport(viewport: Viewport) -> Self {
        Self { viewport, ..Self::default() }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn scroll_to(&mut self, x: f64, y: f64) {
        self.viewport.scroll_x = x;
        self.viewport.scroll_y = y;
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    /// Record the box of an element
    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.rects.insert(node, rect);
    }

    /// Record the playback state of a media element
    pub fn set_playback(&mut self, node: NodeId, state: PlaybackState) {
        self.playback.insert(node, state);
    }

    /// Register every `<video>` and `<audio>` in the tree as not yet played
    pub fn register_media(&mut self, tree: &DomTree) {
        for tag in ["video", "audio"] {
            for node in tree.elements_by_tag(tag) {
                self.playback.entry(node).or_default();
            }
        }
    }

    /// Assign document positions to every rendered block under `root`.
    ///
    /// Blocks carrying their own text, and replaced elements, are stacked
    /// top to bottom at full viewport width; containers receive the union of
    /// their descendants' boxes.
    pub fn flow(&mut self, tree: &DomTree, root: NodeId) {
        let width = self.viewport.width;
        let chars_per_line = (width / CHAR_WIDTH).max(1.0);
        let mut cursor = 0.0;
        let mut placed = Vec::new();

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !tree.is_element(node) || self.hidden_by_style(tree, node) {
                continue;
            }
            let tag = tree.tag_name(node).unwrap_or_default();
            if INVISIBLE_TAGS.contains(&tag) {
                continue;
            }
            let own = tree.own_text(node);
            let own_chars = own.trim().chars().count() as f64;
            let height = if REPLACED_TAGS.contains(&tag) {
                Some(self.attribute_size(tree, node).unwrap_or(DEFAULT_REPLACED_SIZE).1)
            } else if own_chars > 0.0 {
                Some((own_chars / chars_per_line).ceil() * LINE_HEIGHT)
            } else {
                None
            };
            if let Some(height) = height {
                self.rects.insert(node, Rect::new(0.0, cursor, width, height));
                placed.push(node);
                cursor += height;
            }
            stack.extend(tree.children(node).iter().rev());
        }

        for node in placed {
            let Some(rect) = self.rects.get(&node).copied() else { continue };
            for ancestor in tree.ancestors(node) {
                if !tree.is_element(ancestor) {
                    break;
                }
                let merged = match self.rects.get(&ancestor) {
                    Some(existing) => existing.union(&rect),
                    None => rect,
                };
                self.rects.insert(ancestor, merged);
                if ancestor == root {
                    break;
                }
            }
        }
    }

    fn hidden_by_style(&self, tree: &DomTree, node: NodeId) -> bool {
        tree.has_attr(node, "hidden") || self.computed_style(tree, node).display_none
    }

    /// `width`/`height` from attributes or inline style
    fn attribute_size(&self, tree: &DomTree, node: NodeId) -> Option<(f64, f64)> {
        let style = inline_style(tree, node);
        let width = style
            .get("width")
            .and_then(|v| css_number(v))
            .or_else(|| tree.attr(node, "width").and_then(css_number))?;
        let height = style
            .get("height")
            .and_then(|v| css_number(v))
            .or_else(|| tree.attr(node, "height").and_then(css_number))?;
        Some((width, height))
    }

    /// Whether the subtree of `node` holds non-blank text or a replaced
    /// element. Answered from a set built once per tree revision.
    fn renders_content(&self, tree: &DomTree, node: NodeId) -> bool {
        let mut cache = self.rendering.borrow_mut();
        if cache.built_for != Some((tree.revision(), tree.len())) {
            cache.rebuild(tree);
        }
        cache.nodes.contains(&node)
    }
}

impl Layout for StaticLayout {
    fn computed_style(&self, tree: &DomTree, node: NodeId) -> ComputedStyle {
        let declarations = inline_style(tree, node);
        ComputedStyle {
            display_none: declarations.get("display").is_some_and(|v| v == "none"),
            visibility_hidden: declarations.get("visibility").is_some_and(|v| v == "hidden"),
            opacity: declarations.get("opacity").and_then(|v| css_number(v)).unwrap_or(1.0),
            left: declarations.get("left").and_then(|v| css_number(v)),
        }
    }

    fn bounding_rect(&self, _tree: &DomTree, node: NodeId) -> Option<Rect> {
        self.rects.get(&node).copied()
    }

    fn scroll_size(&self, tree: &DomTree, node: NodeId) -> (f64, f64) {
        let chain = std::iter::once(node).chain(tree.ancestors(node));
        for ancestor in chain {
            if tree.is_element(ancestor) && self.hidden_by_style(tree, ancestor) {
                return (0.0, 0.0);
            }
        }
        if let Some(rect) = self.rects.get(&node) {
            return (rect.width, rect.height);
        }
        if let Some(size) = self.attribute_size(tree, node) {
            return size;
        }
        let tag = tree.tag_name(node).unwrap_or_default();
        if REPLACED_TAGS.contains(&tag) {
            return DEFAULT_REPLACED_SIZE;
        }
        if self.renders_content(tree, node) { (self.viewport.width, LINE_HEIGHT) } else { (0.0, 0.0) }
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn playback(&self, tree: &DomTree, node: NodeId) -> Option<PlaybackState> {
        match tree.tag_name(node) {
            Some("video" | "audio") => Some(self.playback.get(&node).copied().unwrap_or_default()),
            _ => self.playback.get(&node).copied(),
        }
    }
}

impl LiveLayout for StaticLayout {
    fn scroll_to(&mut self, x: f64, y: f64) {
        StaticLayout::scroll_to(self, x, y);
    }

    fn resize(&mut self, width: f64, height: f64) {
        StaticLayout::resize(self, width, height);
    }

    fn set_playback(&mut self, node: NodeId, state: PlaybackState) {
        StaticLayout::set_playback(self, node, state);
    }
}
