//! Content scoring.
//!
//! A single pre-order walk over the visible elements under `<body>` gives
//! every element that carries punctuated text or media a
//! [`ContentRecord`], then pushes that element's contribution up through
//! its ancestors with a decaying divider. Container elements reached this
//! way become candidates for the main content region.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::dom_tree::{DomTree, NodeId};
use crate::layout::Layout;
use crate::{FolioError, Result};

/// Configuration for content scoring algorithm
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Weight for positive class/ID patterns
    pub positive_weight: f64,
    /// Weight for negative class/ID patterns
    pub negative_weight: f64,
    /// Maximum bonus from own text length
    pub max_length_bonus: usize,
    /// Characters per point of length bonus
    pub chars_per_point: usize,
    /// Bonus for text, media, format and link elements
    pub tag_bonus: f64,
    /// Per-level ancestor bonus for a contained `<video>`
    pub video_bonus: f64,
    /// Per-level ancestor bonus for a contained `<audio>`
    pub audio_bonus: f64,
    /// Per-level ancestor bonus for a contained `<img>`
    pub image_bonus: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            positive_weight: 25.0,
            negative_weight: -25.0,
            max_length_bonus: 3,
            chars_per_point: 100,
            tag_bonus: 2.0,
            video_bonus: 20.0,
            audio_bonus: 12.0,
            image_bonus: 10.0,
        }
    }
}

/// Positive patterns that suggest an element contains main content
const POSITIVE_PATTERNS: &str =
    r"(?i)(article|body|content|entry|hentry|h-entry|main|page|post|text|blog|story|chapter|novel|reader|episode)";

/// Negative patterns that suggest an element does NOT contain main content
const NEGATIVE_PATTERNS: &str = r"(?i)(banner|breadcrumbs?|combx|comment|community|disqus|foot|header|menu|related|remark|rss|shoutbox|sidebar|sponsor|ad-break|agegate|pagination|pager|popup|share|social|widget|promo)";

static POSITIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(POSITIVE_PATTERNS).unwrap());
static NEGATIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(NEGATIVE_PATTERNS).unwrap());

/// Punctuation that marks prose
static CONTENT_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,.，。、]").unwrap());

/// Subtrees never walked: page chrome, controls and non-rendered content
pub const SKIP_TAGS: &[&str] = &[
    "aside", "button", "canvas", "dialog", "embed", "footer", "form", "head", "header", "iframe", "input", "label",
    "menu", "nav", "noscript", "object", "option", "script", "select", "style", "svg", "template", "textarea",
];

/// Tags that may hold the main content
pub const CONTAINER_TAGS: &[&str] = &["div", "main", "article", "section"];

/// Levels skipped during propagation: list and table rows are not containers
pub const LIST_WRAPPER_TAGS: &[&str] = &["li", "dl", "dt", "dd", "tr", "td", "thead", "tbody", "th"];

const TEXT_TAGS: &[&str] = &["p", "span", "h1", "h2", "h3", "h4", "h5", "h6"];
const MEDIA_TAGS: &[&str] = &["video", "audio", "img"];
const FORMAT_TAGS: &[&str] = &[
    "abbr", "b", "big", "cite", "code", "del", "em", "font", "i", "ins", "kbd", "mark", "q", "s", "small", "strong",
    "sub", "sup", "time", "u", "var",
];

/// Kind of media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

impl MediaKind {
    fn of(tag: &str) -> Option<Self> {
        match tag {
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "img" => Some(Self::Image),
            _ => None,
        }
    }
}

/// What a non-container element hands to its ancestors besides its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contribution {
    Media(MediaKind),
    Format,
    Content,
    Link,
    None,
}

impl Contribution {
    fn of(tag: &str) -> Self {
        if let Some(kind) = MediaKind::of(tag) {
            Self::Media(kind)
        } else if TEXT_TAGS.contains(&tag) {
            Self::Content
        } else if FORMAT_TAGS.contains(&tag) {
            Self::Format
        } else if tag == "a" {
            Self::Link
        } else {
            Self::None
        }
    }
}

/// Per-element scoring state.
#[derive(Debug, Clone)]
pub struct ContentRecord {
    /// Creation order within the scoring pass
    pub id: u64,
    pub node: NodeId,
    pub tag_name: String,
    /// Accumulated score
    pub content_score: f64,
    pub class_weight: f64,
    /// Commas and periods in the element's own text
    pub content_char_count: usize,
    pub length_bonus: usize,
    /// Own text length plus the own text length of every contributing descendant
    pub total_chars: usize,
    /// Own punctuation plus that of every contributing descendant
    pub subtree_content_chars: usize,
    /// Container tag, visible and holding content
    pub scoreable: bool,
    /// Visited by the walk (as opposed to created while propagating)
    pub visited: bool,
    pub contribution: Contribution,
    /// Text elements found below, in document order
    pub contents: Vec<NodeId>,
    pub videos: Vec<NodeId>,
    pub audios: Vec<NodeId>,
    pub images: Vec<NodeId>,
    pub links: Vec<NodeId>,
    /// CSS-like path, for diagnostics
    pub selector: String,
}

impl ContentRecord {
    pub fn is_media(&self) -> bool {
        matches!(self.contribution, Contribution::Media(_))
    }

    /// Number of media elements recorded below
    pub fn media_count(&self) -> usize {
        self.videos.len() + self.audios.len() + self.images.len()
    }
}

/// Content records keyed by node.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    records: HashMap<NodeId, ContentRecord>,
    next_id: u64,
}

impl RecordTable {
    pub fn get(&self, node: NodeId) -> Option<&ContentRecord> {
        self.records.get(&node)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentRecord> {
        self.records.values()
    }

    fn get_mut(&mut self, node: NodeId) -> Option<&mut ContentRecord> {
        self.records.get_mut(&node)
    }

    fn insert(&mut self, tree: &DomTree, node: NodeId, scoreable: bool, config: &ScoreConfig) -> &mut ContentRecord {
        let id = self.next_id;
        let next_id = &mut self.next_id;
        self.records.entry(node).or_insert_with(|| {
            *next_id += 1;
            let own = tree.own_text(node);
            let own = own.trim();
            let content_char_count = content_char_count(own);
            let length_bonus = length_bonus(own.chars().count(), config);
            let class_weight = class_weight(tree, node, config);
            ContentRecord {
                id,
                node,
                tag_name: tree.tag_name(node).unwrap_or_default().to_string(),
                content_score: class_weight + content_char_count as f64 + length_bonus as f64,
                class_weight,
                content_char_count,
                length_bonus,
                total_chars: own.chars().count(),
                subtree_content_chars: content_char_count,
                scoreable,
                visited: false,
                contribution: Contribution::None,
                contents: Vec::new(),
                videos: Vec::new(),
                audios: Vec::new(),
                images: Vec::new(),
                links: Vec::new(),
                selector: tree.css_path(node),
            }
        })
    }
}

/// Everything a scoring pass produces.
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub records: RecordTable,
    /// Candidate containers, in the order they were first reached
    pub candidates: Vec<NodeId>,
    /// The `<body>` element
    pub body: NodeId,
}

impl ScoreOutcome {
    pub fn record(&self, node: NodeId) -> Option<&ContentRecord> {
        self.records.get(node)
    }

    pub fn body_record(&self) -> Option<&ContentRecord> {
        self.records.get(self.body)
    }
}

/// Sum of the positive and negative class/ID adjustments
pub fn class_weight(tree: &DomTree, node: NodeId, config: &ScoreConfig) -> f64 {
    let names = tree.class_and_id(node);
    if names.is_empty() {
        return 0.0;
    }
    let mut weight = 0.0;
    if POSITIVE_REGEX.is_match(&names) {
        weight += config.positive_weight;
    }
    if NEGATIVE_REGEX.is_match(&names) {
        weight += config.negative_weight;
    }
    weight
}

/// Whether class or id matches the negative patterns
pub fn is_negative(tree: &DomTree, node: NodeId) -> bool {
    let names = tree.class_and_id(node);
    !names.is_empty() && NEGATIVE_REGEX.is_match(&names)
}

/// Number of commas and periods
pub fn content_char_count(text: &str) -> usize {
    CONTENT_CHARS.find_iter(text).count()
}

pub fn has_content_chars(text: &str) -> bool {
    CONTENT_CHARS.is_match(text)
}

/// One point per `chars_per_point` characters, capped
pub fn length_bonus(len: usize, config: &ScoreConfig) -> usize {
    (len / config.chars_per_point.max(1)).min(config.max_length_bonus)
}

/// Divider applied to a contribution `level` steps above its origin
pub fn divider(level: usize) -> f64 {
    match level {
        0 => 1.0,
        1 => 2.0,
        _ => (level * 3) as f64,
    }
}

/// Round half up, the way the contribution arithmetic expects for negative halves too
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Walks a document and produces a [`ScoreOutcome`].
pub struct ContentScorer<'a, L: Layout + ?Sized> {
    tree: &'a DomTree,
    layout: &'a L,
    config: &'a ScoreConfig,
}

impl<'a, L: Layout + ?Sized> ContentScorer<'a, L> {
    pub fn new(tree: &'a DomTree, layout: &'a L, config: &'a ScoreConfig) -> Self {
        Self { tree, layout, config }
    }

    /// Score every eligible element under `<body>`.
    ///
    /// The pass is a pure function of the tree and layout: calling it twice
    /// without mutations yields identical outcomes.
    pub fn score(&self) -> Result<ScoreOutcome> {
        let tree = self.tree;
        let body = tree
            .body()
            .ok_or_else(|| FolioError::StructuralMismatch("document has no <body>".to_string()))?;

        let (media_below, content_below) = self.mark_subtrees(body);
        let mut records = RecordTable::default();
        let mut candidates = Vec::new();
        let mut candidate_set = HashSet::new();

        let mut stack: Vec<NodeId> = tree.element_children(body).collect();
        stack.reverse();
        while let Some(node) = stack.pop() {
            let Some(tag) = tree.tag_name(node) else { continue };
            if SKIP_TAGS.contains(&tag) || !self.layout.is_visible(tree, node) {
                continue;
            }
            let children: Vec<NodeId> = tree.element_children(node).collect();
            stack.extend(children.into_iter().rev());

            let own = tree.own_text(node);
            if !has_content_chars(&own) && !media_below.contains(&node) {
                continue;
            }

            let scoreable = self.is_scoreable(node, &media_below, &content_below);
            let record = records.insert(tree, node, scoreable, self.config);
            record.visited = true;
            if !scoreable {
                record.contribution = Contribution::of(tag);
                if record.contribution != Contribution::None {
                    record.content_score += self.config.tag_bonus;
                }
            } else if candidate_set.insert(node) {
                candidates.push(node);
            }
            trace!(selector = %record.selector, score = record.content_score, "scored element");

            self.propagate(node, body, &mut records, &media_below, &content_below, &mut |candidate| {
                if candidate_set.insert(candidate) {
                    candidates.push(candidate);
                }
            });
        }

        debug!(records = records.len(), candidates = candidates.len(), "scoring pass finished");
        Ok(ScoreOutcome { records, candidates, body })
    }

    /// Nodes with a media element, and with punctuated text, in their subtree (self included)
    fn mark_subtrees(&self, body: NodeId) -> (HashSet<NodeId>, HashSet<NodeId>) {
        let tree = self.tree;
        let mut media_below = HashSet::new();
        let mut content_below = HashSet::new();
        for node in tree.descendants(body) {
            let marks = if tree.tag_name(node).is_some_and(|t| MEDIA_TAGS.contains(&t)) {
                Some(&mut media_below)
            } else if tree.text_data(node).is_some_and(has_content_chars) {
                Some(&mut content_below)
            } else {
                None
            };
            if let Some(marks) = marks {
                marks.insert(node);
                for ancestor in tree.ancestors(node) {
                    if !marks.insert(ancestor) || ancestor == body {
                        break;
                    }
                }
            }
        }
        (media_below, content_below)
    }

    fn is_scoreable(&self, node: NodeId, media_below: &HashSet<NodeId>, content_below: &HashSet<NodeId>) -> bool {
        self.tree.tag_name(node).is_some_and(|t| CONTAINER_TAGS.contains(&t))
            && (media_below.contains(&node) || content_below.contains(&node))
            && self.layout.is_visible(self.tree, node)
    }

    /// Push the contribution of `origin` up to `<body>`.
    ///
    /// Scoreable ancestors are reported as candidates and keep propagating
    /// past themselves.
    fn propagate(
        &self, origin: NodeId, body: NodeId, records: &mut RecordTable, media_below: &HashSet<NodeId>,
        content_below: &HashSet<NodeId>, on_candidate: &mut impl FnMut(NodeId),
    ) {
        let tree = self.tree;
        let Some(source) = records.get(origin) else { return };
        let own_score = source.content_score;
        let own_total = source.total_chars;
        let own_punct = source.content_char_count;
        let contribution = source.contribution;

        let mut level = 0;
        let mut current = tree.parent(origin);
        while let Some(ancestor) = current {
            let Some(tag) = tree.tag_name(ancestor) else { break };
            current = tree.parent(ancestor);
            if LIST_WRAPPER_TAGS.contains(&tag) {
                continue;
            }

            if records.get(ancestor).is_none() {
                let scoreable = self.is_scoreable(ancestor, media_below, content_below);
                records.insert(tree, ancestor, scoreable, self.config);
            }
            let Some(record) = records.get_mut(ancestor) else { break };

            match contribution {
                Contribution::Media(kind) => {
                    let (bonus, list) = match kind {
                        MediaKind::Video => (self.config.video_bonus, &mut record.videos),
                        MediaKind::Audio => (self.config.audio_bonus, &mut record.audios),
                        MediaKind::Image => (self.config.image_bonus, &mut record.images),
                    };
                    record.content_score += bonus;
                    list.push(origin);
                }
                Contribution::Format => record.content_score += 1.0,
                Contribution::Content => {
                    record.content_score += 1.0;
                    record.contents.push(origin);
                }
                Contribution::Link => record.links.push(origin),
                Contribution::None => {}
            }
            record.content_score += round_half_up(own_score / divider(level));
            record.total_chars += own_total;
            record.subtree_content_chars += own_punct;

            if record.scoreable {
                on_candidate(ancestor);
            }
            if ancestor == body {
                break;
            }
            level += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StaticLayout;
    use crate::parse::Document;
    use rstest::rstest;

    fn score(html: &str) -> (Document, ScoreOutcome) {
        let doc = Document::parse(html).unwrap();
        let layout = StaticLayout::new();
        let config = ScoreConfig::default();
        let outcome = ContentScorer::new(doc.tree(), &layout, &config).score().unwrap();
        (doc, outcome)
    }

    fn id(doc: &Document, name: &str) -> NodeId {
        doc.tree().element_by_id(name).unwrap()
    }

    #[rstest]
    #[case(10.0, 0, 10.0)]
    #[case(10.0, 1, 5.0)]
    #[case(10.0, 2, 2.0)]
    #[case(10.0, 3, 1.0)]
    #[case(11.0, 0, 11.0)]
    #[case(11.0, 1, 6.0)]
    #[case(11.0, 2, 2.0)]
    #[case(11.0, 3, 1.0)]
    #[case(100.0, 0, 100.0)]
    #[case(100.0, 1, 50.0)]
    #[case(100.0, 2, 17.0)]
    #[case(100.0, 3, 11.0)]
    fn test_divider_decay(#[case] score: f64, #[case] level: usize, #[case] expected: f64) {
        assert_eq!(round_half_up(score / divider(level)), expected);
    }

    #[test]
    fn test_round_half_up_negative() {
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(round_half_up(-2.6), -3.0);
    }

    #[test]
    fn test_class_weight_positive() {
        let doc = Document::parse(r#"<div id="x" class="article-content">Content</div>"#).unwrap();
        assert_eq!(class_weight(doc.tree(), id(&doc, "x"), &ScoreConfig::default()), 25.0);
    }

    #[test]
    fn test_class_weight_negative() {
        let doc = Document::parse(r#"<div id="sidebar">Content</div>"#).unwrap();
        assert_eq!(class_weight(doc.tree(), id(&doc, "sidebar"), &ScoreConfig::default()), -25.0);
    }

    #[test]
    fn test_class_weight_both_apply() {
        let doc = Document::parse(r#"<div id="x" class="post-comments">Content</div>"#).unwrap();
        assert_eq!(class_weight(doc.tree(), id(&doc, "x"), &ScoreConfig::default()), 0.0);
    }

    #[test]
    fn test_class_weight_no_match() {
        let doc = Document::parse(r#"<div class="container" id="wrapper">Content</div>"#).unwrap();
        assert_eq!(class_weight(doc.tree(), id(&doc, "wrapper"), &ScoreConfig::default()), 0.0);
    }

    #[test]
    fn test_length_bonus_capped() {
        let config = ScoreConfig::default();
        assert_eq!(length_bonus(99, &config), 0);
        assert_eq!(length_bonus(250, &config), 2);
        assert_eq!(length_bonus(5000, &config), 3);
    }

    #[test]
    fn test_paragraph_record_and_propagation() {
        let (doc, outcome) = score(
            r#"<body><article id="art"><p id="p">One, two, three. Four, five.</p></article></body>"#,
        );
        let p = outcome.record(id(&doc, "p")).unwrap();
        assert_eq!(p.content_char_count, 5);
        assert_eq!(p.contribution, Contribution::Content);
        assert_eq!(p.content_score, 7.0);

        let article = outcome.record(id(&doc, "art")).unwrap();
        assert!(article.scoreable);
        assert_eq!(article.contents, vec![id(&doc, "p")]);
        assert_eq!(article.content_score, 8.0);
        assert_eq!(outcome.candidates, vec![id(&doc, "art")]);

        let body = outcome.body_record().unwrap();
        assert_eq!(body.content_score, 1.0 + 4.0);
        assert_eq!(body.total_chars, 28);
    }

    #[test]
    fn test_media_bonus_per_level() {
        let (doc, outcome) = score(r#"<body><div id="outer"><div id="inner"><video id="v" width="640" height="360"></video></div></div></body>"#);
        let inner = outcome.record(id(&doc, "inner")).unwrap();
        let outer = outcome.record(id(&doc, "outer")).unwrap();
        assert_eq!(inner.videos, vec![id(&doc, "v")]);
        assert_eq!(outer.videos, vec![id(&doc, "v")]);
        assert_eq!(inner.content_score, 20.0 + 2.0);
        assert_eq!(outer.content_score, 20.0 + 1.0);
        assert_eq!(outcome.body_record().unwrap().videos.len(), 1);
    }

    #[test]
    fn test_list_wrappers_are_skipped() {
        let (doc, outcome) = score(r#"<body><div id="d"><ul id="u"><li id="l"><a id="a" href="/c1">Chapter 1.</a></li></ul></div></body>"#);
        assert!(outcome.record(id(&doc, "l")).is_none());
        assert_eq!(outcome.record(id(&doc, "u")).unwrap().links, vec![id(&doc, "a")]);
        assert_eq!(outcome.record(id(&doc, "d")).unwrap().links, vec![id(&doc, "a")]);
    }

    #[test]
    fn test_skipped_and_hidden_subtrees() {
        let (doc, outcome) = score(
            r#"<body><nav><p id="n">Nav, text.</p></nav><div style="display:none"><p id="h">Hidden, text.</p></div><p id="v">Shown, text.</p></body>"#,
        );
        assert!(outcome.record(id(&doc, "n")).is_none());
        assert!(outcome.record(id(&doc, "h")).is_none());
        assert!(outcome.record(id(&doc, "v")).is_some());
    }

    #[test]
    fn test_scoreable_element_is_candidate_and_keeps_propagating() {
        let (doc, outcome) = score(r#"<body><section id="s"><div id="d">Own text, with commas.</div></section></body>"#);
        let d = outcome.record(id(&doc, "d")).unwrap();
        assert!(d.scoreable);
        assert!(outcome.candidates.contains(&id(&doc, "d")));
        assert!(outcome.candidates.contains(&id(&doc, "s")));
        assert_eq!(outcome.record(id(&doc, "s")).unwrap().content_score, d.content_score);
    }

    #[test]
    fn test_candidates_independent_of_sibling_order() {
        let a = r#"<div id="x" class="content"><p>Alpha, beta, gamma.</p></div><div id="y"><img src="a.png" width="300" height="300"></div>"#;
        let b = r#"<div id="y"><img src="a.png" width="300" height="300"></div><div id="x" class="content"><p>Alpha, beta, gamma.</p></div>"#;
        let (doc_a, out_a) = score(&format!("<body>{a}</body>"));
        let (doc_b, out_b) = score(&format!("<body>{b}</body>"));

        let mut ids_a: Vec<_> = out_a.candidates.iter().filter_map(|n| doc_a.tree().attr(*n, "id")).collect();
        let mut ids_b: Vec<_> = out_b.candidates.iter().filter_map(|n| doc_b.tree().attr(*n, "id")).collect();
        ids_a.sort();
        ids_b.sort();
        assert_eq!(ids_a, ids_b);
        assert_eq!(
            out_a.record(id(&doc_a, "x")).unwrap().content_score,
            out_b.record(id(&doc_b, "x")).unwrap().content_score
        );
    }

    #[test]
    fn test_scoring_twice_is_identical() {
        let doc = Document::parse(r#"<body><article><p>One, two.</p><p>Three, four.</p></article></body>"#).unwrap();
        let layout = StaticLayout::new();
        let config = ScoreConfig::default();
        let scorer = ContentScorer::new(doc.tree(), &layout, &config);
        let first = scorer.score().unwrap();
        let second = scorer.score().unwrap();
        assert_eq!(first.candidates, second.candidates);
        for record in first.records.iter() {
            assert_eq!(second.record(record.node).unwrap().content_score, record.content_score);
        }
    }

    #[test]
    fn test_missing_body_is_structural_mismatch() {
        let tree = DomTree::new();
        let layout = StaticLayout::new();
        let config = ScoreConfig::default();
        let result = ContentScorer::new(&tree, &layout, &config).score();
        assert!(matches!(result, Err(FolioError::StructuralMismatch(_))));
    }
}
