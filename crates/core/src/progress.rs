//! Reading progress.
//!
//! Progress over a text range is the share of its visible, non-empty
//! elements that have been inside the viewport at least once. Progress over
//! a media element is its playback position, gated on the range having been
//! read completely when both are present.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::dom_tree::{DomTree, NodeId};
use crate::layout::Layout;
use crate::position::PositionIndex;
use crate::{FolioError, Result};

const MEDIA_TAGS: &[&str] = &["img", "video", "audio"];

/// Elements that have intersected the viewport at least once.
///
/// Seen elements are never unmarked. Watched elements are checked on every
/// viewport event and dropped from the watch list once seen.
#[derive(Debug, Clone, Default)]
pub struct SeenElements {
    seen: HashSet<NodeId>,
    watched: HashSet<NodeId>,
}

impl SeenElements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch every element of the subtree at `root`, `root` included
    pub fn watch_subtree(&mut self, tree: &DomTree, root: NodeId) {
        for node in std::iter::once(root).chain(tree.descendants(root)) {
            if tree.is_element(node) && !self.seen.contains(&node) {
                self.watched.insert(node);
            }
        }
    }

    /// Stop watching nodes that left the tree
    pub fn forget_detached(&mut self, tree: &DomTree) {
        self.watched.retain(|n| tree.is_attached(*n));
    }

    /// Mark watched elements currently in the viewport as seen; returns how
    /// many became seen
    pub fn on_viewport_event<L: Layout + ?Sized>(&mut self, tree: &DomTree, layout: &L) -> usize {
        let newly: Vec<NodeId> = self
            .watched
            .iter()
            .copied()
            .filter(|n| layout.in_viewport(tree, *n))
            .collect();
        for node in &newly {
            self.watched.remove(node);
            self.seen.insert(*node);
        }
        newly.len()
    }

    pub fn mark_seen(&mut self, node: NodeId) {
        self.watched.remove(&node);
        self.seen.insert(node);
    }

    pub fn is_seen(&self, node: NodeId) -> bool {
        self.seen.contains(&node)
    }

    pub fn is_watched(&self, node: NodeId) -> bool {
        self.watched.contains(&node)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.watched.clear();
    }
}

/// Round to three decimals
pub fn round_progress(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Tracks consumption of the selected content.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    start: Option<NodeId>,
    end: Option<NodeId>,
    duration_able: Option<NodeId>,
    seen: SeenElements,
    interval: Duration,
    next_tick: Option<Instant>,
    last_reported: Option<f64>,
}

impl ProgressTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            start: None,
            end: None,
            duration_able: None,
            seen: SeenElements::new(),
            interval,
            next_tick: None,
            last_reported: None,
        }
    }

    pub fn set_start(&mut self, node: NodeId) {
        self.start = Some(node);
    }

    pub fn set_end(&mut self, node: NodeId) {
        self.end = Some(node);
    }

    /// Track playback of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::InvalidDurationElement`] when the host reports
    /// no playback state for the element.
    pub fn set_duration_able<L: Layout + ?Sized>(&mut self, tree: &DomTree, layout: &L, node: NodeId) -> Result<()> {
        if layout.playback(tree, node).is_none() {
            return Err(FolioError::InvalidDurationElement {
                tag: tree.tag_name(node).unwrap_or("#text").to_string(),
            });
        }
        self.duration_able = Some(node);
        Ok(())
    }

    pub fn start(&self) -> Option<NodeId> {
        self.start
    }

    pub fn end(&self) -> Option<NodeId> {
        self.end
    }

    pub fn duration_able(&self) -> Option<NodeId> {
        self.duration_able
    }

    pub fn seen(&self) -> &SeenElements {
        &self.seen
    }

    pub fn seen_mut(&mut self) -> &mut SeenElements {
        &mut self.seen
    }

    /// Elements of the range in document order.
    ///
    /// The range runs from whichever bound comes first to the end of the
    /// other bound's subtree, inside their closest common ancestor.
    pub fn range_elements(&self, tree: &DomTree, index: &PositionIndex) -> Vec<NodeId> {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return Vec::new();
        };
        let Some(root) = index.closest_common_ancestor(tree, start, end) else {
            return Vec::new();
        };
        let (first, last) = match index.document_order(start, end) {
            Some(std::cmp::Ordering::Greater) => (end, start),
            _ => (start, end),
        };

        let mut elements = Vec::new();
        let mut started = false;
        let mut reached_last = false;
        for node in std::iter::once(root).chain(tree.descendants(root)) {
            if !tree.is_element(node) {
                continue;
            }
            if node == first {
                started = true;
            }
            if node == last {
                reached_last = true;
            } else if reached_last && !is_within(tree, node, last) {
                break;
            }
            if started {
                elements.push(node);
            }
        }
        elements
    }

    /// Seen share of the range's visible non-empty elements; `None` without a range
    pub fn range_fraction<L: Layout + ?Sized>(&self, tree: &DomTree, layout: &L, index: &PositionIndex) -> Option<f64> {
        self.start.zip(self.end)?;
        let counted: Vec<NodeId> = self
            .range_elements(tree, index)
            .into_iter()
            .filter(|n| is_non_empty(tree, *n) && layout.is_visible(tree, *n))
            .collect();
        if counted.is_empty() {
            return Some(0.0);
        }
        let seen = counted.iter().filter(|n| self.seen.is_seen(**n)).count();
        Some(seen as f64 / counted.len() as f64)
    }

    /// Current progress in `[0, 1]`
    pub fn progress<L: Layout + ?Sized>(&self, tree: &DomTree, layout: &L, index: &PositionIndex) -> f64 {
        let range = self.range_fraction(tree, layout, index);
        let Some(media) = self.duration_able else {
            return range.unwrap_or(0.0);
        };
        let playback = layout.playback(tree, media).map(|p| p.fraction()).unwrap_or(0.0);
        match range {
            Some(fraction) if fraction < 1.0 => 0.0,
            _ => playback,
        }
    }

    /// Start the interval, remembering the progress already reported
    pub fn arm(&mut self, now: Instant, reported: f64) {
        self.next_tick = Some(now + self.interval);
        self.last_reported = Some(round_progress(reported));
    }

    /// Stop the interval
    pub fn disarm(&mut self) {
        self.next_tick = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_tick.is_some()
    }

    /// When the next interval tick is due
    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Run the interval: when a tick is due, recompute progress and return it
    /// if its rounded value changed since the last report.
    pub fn tick<L: Layout + ?Sized>(
        &mut self, now: Instant, tree: &DomTree, layout: &L, index: &PositionIndex,
    ) -> Option<f64> {
        let due = self.next_tick?;
        if now < due {
            return None;
        }
        self.next_tick = Some(now + self.interval);

        let value = round_progress(self.progress(tree, layout, index));
        trace!(progress = value, "progress tick");
        if self.last_reported == Some(value) {
            return None;
        }
        self.last_reported = Some(value);
        Some(value)
    }
}

fn is_within(tree: &DomTree, node: NodeId, ancestor: NodeId) -> bool {
    tree.ancestors(node).any(|a| a == ancestor)
}

/// Has its own text or is a media element
fn is_non_empty(tree: &DomTree, node: NodeId) -> bool {
    tree.tag_name(node).is_some_and(|t| MEDIA_TAGS.contains(&t))
        || tree.children(node).iter().any(|c| tree.text_data(*c).is_some_and(|t| !t.trim().is_empty()))
}
