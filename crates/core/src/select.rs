//! Main content selection.
//!
//! Turns the candidates of a scoring pass into a single [`Selection`]: the
//! content type of the page and the first and last element of the range
//! that holds it.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dom_tree::{DomTree, NodeId};
use crate::layout::{INVISIBLE_TAGS, Layout};
use crate::position::PositionIndex;
use crate::scoring::{ContentRecord, MediaKind, ScoreOutcome, is_negative};
use crate::session::AnalysisConfig;

/// Kind of main content found on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Video,
    Audio,
    Toc,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Toc => "toc",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The chosen main content range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: NodeId,
    pub end: NodeId,
    pub content_type: ContentType,
    /// Whether progress follows viewport visibility of the range
    pub see_able: bool,
    /// Media element whose playback drives progress
    pub duration_able: Option<NodeId>,
}

/// Picks the main content out of a [`ScoreOutcome`].
pub struct ContentSelector<'a, L: Layout + ?Sized> {
    tree: &'a DomTree,
    layout: &'a L,
    index: &'a PositionIndex,
    outcome: &'a ScoreOutcome,
    config: &'a AnalysisConfig,
}

impl<'a, L: Layout + ?Sized> ContentSelector<'a, L> {
    pub fn new(
        tree: &'a DomTree, layout: &'a L, index: &'a PositionIndex, outcome: &'a ScoreOutcome,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self { tree, layout, index, outcome, config }
    }

    /// Choose the main content, or `None` when nothing qualifies.
    ///
    /// The content type follows a fixed precedence checked against the body
    /// record: text, then video, audio, image and table of contents. The
    /// first type that yields a range wins, regardless of score.
    pub fn select(&self) -> Option<Selection> {
        let body = self.outcome.body_record()?;
        let ranked = self.ranked();
        debug!(candidates = ranked.len(), "filtered candidates");

        let selection = (body.total_chars > 0)
            .then(|| self.select_text(&ranked))
            .flatten()
            .or_else(|| (!body.videos.is_empty()).then(|| self.select_media(&ranked, MediaKind::Video)).flatten())
            .or_else(|| (!body.audios.is_empty()).then(|| self.select_media(&ranked, MediaKind::Audio)).flatten())
            .or_else(|| (!body.images.is_empty()).then(|| self.select_images(&ranked)).flatten())
            .or_else(|| (!body.links.is_empty()).then(|| self.select_toc(&ranked)).flatten());

        match &selection {
            Some(s) => debug!(content_type = %s.content_type, "selected main content"),
            None => debug!("no main content found"),
        }
        selection
    }

    /// Candidates by descending score, filtered.
    ///
    /// The body record ranks last so that content sitting directly in
    /// `<body>` is still reachable.
    pub fn ranked(&self) -> Vec<&'a ContentRecord> {
        let mut records: Vec<&ContentRecord> =
            self.outcome.candidates.iter().filter_map(|n| self.outcome.record(*n)).collect();
        records.sort_by(|a, b| {
            b.content_score
                .partial_cmp(&a.content_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.index.document_order(a.node, b.node).unwrap_or(Ordering::Equal))
        });
        if let Some(body) = self.outcome.body_record()
            && !records.iter().any(|r| r.node == body.node)
        {
            records.push(body);
        }

        let mut kept: Vec<&ContentRecord> = Vec::with_capacity(records.len());
        for record in records {
            if record.media_count() == 0 && record.total_chars < self.config.min_candidate_chars {
                continue;
            }
            if !self.layout.is_visible(self.tree, record.node) {
                continue;
            }
            // Only media holders are folded into a richer ancestor; text
            // containers stay so the nested descent can tighten the range
            let covered = record.media_count() > 0
                && kept.iter().any(|outer| {
                    self.index.is_ancestor(record.node, outer.node)
                        && outer.audios.len() >= record.audios.len()
                        && outer.videos.len() >= record.videos.len()
                        && outer.images.len() >= record.images.len()
                });
            if !covered {
                kept.push(record);
            }
        }
        kept
    }

    fn select_text(&self, ranked: &[&ContentRecord]) -> Option<Selection> {
        let texts: Vec<&ContentRecord> = ranked
            .iter()
            .copied()
            .filter(|r| {
                !r.contents.is_empty() && non_negative_text_len(self.tree, r.node) > self.config.min_candidate_chars
            })
            .collect();
        let mut current = *texts.first()?;
        for next in texts.iter().skip(1) {
            if !self.index.is_ancestor(next.node, current.node) {
                break;
            }
            let diff = current.subtree_content_chars as i64 - next.subtree_content_chars as i64;
            if !(0..=self.config.nested_char_window as i64).contains(&diff) {
                break;
            }
            current = next;
        }

        debug!(selector = %current.selector, score = current.content_score, "text container");
        Some(Selection {
            start: *current.contents.first()?,
            end: *current.contents.last()?,
            content_type: ContentType::Text,
            see_able: true,
            duration_able: None,
        })
    }

    fn select_media(&self, ranked: &[&ContentRecord], kind: MediaKind) -> Option<Selection> {
        let (record, media) = ranked.iter().find_map(|r| {
            let list = match kind {
                MediaKind::Video => &r.videos,
                MediaKind::Audio => &r.audios,
                MediaKind::Image => &r.images,
            };
            list.first().map(|m| (r, *m))
        })?;
        let content_type = match kind {
            MediaKind::Video => ContentType::Video,
            MediaKind::Audio => ContentType::Audio,
            MediaKind::Image => ContentType::Image,
        };
        debug!(selector = %record.selector, "media container");
        Some(Selection { start: media, end: media, content_type, see_able: false, duration_able: Some(media) })
    }

    fn select_images(&self, ranked: &[&'a ContentRecord]) -> Option<Selection> {
        let (record, images) = self.image_container(ranked)?;
        debug!(selector = %record.selector, images = images.len(), "image container");
        Some(Selection {
            start: *images.first()?,
            end: *images.last()?,
            content_type: ContentType::Image,
            see_able: true,
            duration_able: None,
        })
    }

    /// Candidate with the most qualifying images and those images.
    ///
    /// Equal counts prefer the ancestor, then the higher score. The body
    /// holds every image on the page, so it is only used when no candidate
    /// has any.
    pub fn image_container(&self, ranked: &[&'a ContentRecord]) -> Option<(&'a ContentRecord, Vec<NodeId>)> {
        let (body, others) = self.split_body(ranked);
        self.most_images(&others).or_else(|| self.most_images(&body))
    }

    fn most_images(&self, records: &[&'a ContentRecord]) -> Option<(&'a ContentRecord, Vec<NodeId>)> {
        let mut best: Option<(&ContentRecord, Vec<NodeId>)> = None;
        for record in records.iter().copied() {
            let images: Vec<NodeId> = record.images.iter().copied().filter(|img| self.qualifying_image(*img)).collect();
            if images.is_empty() {
                continue;
            }
            let better = match &best {
                None => true,
                Some((current, current_images)) => match images.len().cmp(&current_images.len()) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => {
                        if self.index.is_ancestor(current.node, record.node) {
                            true
                        } else if self.index.is_ancestor(record.node, current.node) {
                            false
                        } else {
                            record.content_score > current.content_score
                        }
                    }
                },
            };
            if better {
                best = Some((record, images));
            }
        }
        best
    }

    /// `(body, everything else)`
    fn split_body(&self, ranked: &[&'a ContentRecord]) -> (Vec<&'a ContentRecord>, Vec<&'a ContentRecord>) {
        ranked.iter().copied().partition(|r| r.node == self.outcome.body)
    }

    fn qualifying_image(&self, image: NodeId) -> bool {
        let (width, height) = self.layout.rendered_size(self.tree, image);
        width > self.config.min_image_size
            && height > self.config.min_image_size
            && !self.tree.ancestors(image).any(|a| is_negative(self.tree, a))
    }

    fn select_toc(&self, ranked: &[&'a ContentRecord]) -> Option<Selection> {
        let (body, others) = self.split_body(ranked);
        let record = most_links(&others).or_else(|| most_links(&body))?;
        debug!(selector = %record.selector, links = record.links.len(), "table of contents");
        Some(Selection {
            start: *record.links.first()?,
            end: *record.links.last()?,
            content_type: ContentType::Toc,
            see_able: true,
            duration_able: None,
        })
    }
}

/// Record with the most links; ties keep the higher score
fn most_links<'r>(records: &[&'r ContentRecord]) -> Option<&'r ContentRecord> {
    records.iter().copied().filter(|r| !r.links.is_empty()).fold(None, |best, r| match best {
        Some(b) if b.links.len() > r.links.len() => Some(b),
        Some(b) if b.links.len() == r.links.len() && b.content_score >= r.content_score => Some(b),
        _ => Some(r),
    })
}

/// Length of the rendered text under `node`, ignoring subtrees whose
/// class or id matches the negative patterns.
pub fn non_negative_text_len(tree: &DomTree, node: NodeId) -> usize {
    let mut total = 0;
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if let Some(text) = tree.text_data(current) {
            total += text.split_whitespace().map(|w| w.chars().count() + 1).sum::<usize>();
            continue;
        }
        if let Some(tag) = tree.tag_name(current)
            && (INVISIBLE_TAGS.contains(&tag) || (current != node && is_negative(tree, current)))
        {
            continue;
        }
        stack.extend(tree.children(current).iter().copied());
    }
    total
}
