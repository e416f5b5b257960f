//! Line collection and per-line signals.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;

use tracing::warn;

use super::patterns::{self, PagePatterns};
use crate::dom_tree::{DomTree, NodeId, collapse_whitespace, truncate_at_char_boundary};
use crate::layout::{INVISIBLE_TAGS, Layout};
use crate::position::PositionIndex;

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// One rendered line of text with the signals used to rank it.
#[derive(Debug, Clone)]
pub struct LineCandidate {
    /// First text node of the line
    pub node: NodeId,
    /// Closest element whose text holds the whole line
    pub element: NodeId,
    pub text: String,
    pub score: f64,
    pub heading: bool,
    pub breadcrumb: bool,
    /// `href` of the closest enclosing anchor
    pub link: Option<String>,
    pub near_hr: bool,
    pub path_fraction: f64,
    pub title_fraction: f64,
    /// Byte range of the chapter match within `text`
    pub chapter: Option<Range<usize>>,
    pub volume: Option<Range<usize>>,
    /// Chapter wording such as `Chapter` or `Ep.`
    pub chapter_word: bool,
    /// Volume wording such as `Vol.` or `Arc`
    pub volume_word: bool,
    /// `N-M` numbering
    pub compact: bool,
    /// Title abbreviation followed by a number
    pub abbreviation_number: bool,
    pub abbreviation: Option<Range<usize>>,
    pub part: bool,
    pub irrelevant: bool,
}

impl LineCandidate {
    /// Start of the earliest volume or chapter match
    pub fn label_start(&self) -> Option<usize> {
        match (&self.volume, &self.chapter) {
            (Some(v), Some(c)) => Some(v.start.min(c.start)),
            (Some(v), None) => Some(v.start),
            (None, Some(c)) => Some(c.start),
            (None, None) => None,
        }
    }
}

/// Limits applied while filtering lines.
#[derive(Debug, Clone, Copy)]
pub struct LineLimits {
    pub max_len: usize,
    pub max_repeats: usize,
}

/// Collects and scores the lines under a scan root.
pub struct LineCollector<'a, L: Layout + ?Sized> {
    tree: &'a DomTree,
    layout: &'a L,
    index: &'a PositionIndex,
    patterns: &'a PagePatterns,
    url: Option<&'a str>,
    limits: LineLimits,
}

impl<'a, L: Layout + ?Sized> LineCollector<'a, L> {
    pub fn new(
        tree: &'a DomTree, layout: &'a L, index: &'a PositionIndex, patterns: &'a PagePatterns, url: Option<&'a str>,
        limits: LineLimits,
    ) -> Self {
        Self { tree, layout, index, patterns, url, limits }
    }

    /// Lines of `root` in document order, signals computed and scored
    pub fn collect(&self, root: NodeId) -> Vec<LineCandidate> {
        let mut lines = self.map_lines(root);
        self.mark_hr_neighbours(root, &mut lines);
        self.mark_irrelevant(&mut lines);
        for line in &mut lines {
            line.score = score_line(line);
        }
        lines
    }

    fn is_rendered(&self, node: NodeId) -> bool {
        !self.tree.has_attr(node, "hidden") && !self.layout.computed_style(self.tree, node).display_none
    }

    /// Split the rendered text into lines and map each back to its text node.
    ///
    /// Lines are walked alongside the text nodes with a forward cursor; a
    /// line that maps to no remaining node is dropped.
    fn map_lines(&self, root: NodeId) -> Vec<LineCandidate> {
        let tree = self.tree;
        let rendered = tree.inner_text(root, |n| self.is_rendered(n));
        let texts: Vec<(NodeId, String)> = self
            .text_nodes(root)
            .into_iter()
            .map(|n| (n, collapse_whitespace(tree.text_data(n).unwrap_or_default())))
            .filter(|(_, t)| !t.is_empty())
            .collect();

        let mut lines = Vec::new();
        let mut cursor = 0;
        for text in rendered.lines() {
            let found = texts[cursor.min(texts.len())..]
                .iter()
                .position(|(_, data)| data.contains(text) || text.starts_with(data.as_str()));
            let Some(offset) = found else {
                warn!(line = truncate_at_char_boundary(text, 80), "line does not map to a text node; dropped");
                continue;
            };
            let first = cursor + offset;
            let (node, data) = &texts[first];
            cursor = first + 1;

            // Consume the following nodes that continue the same line
            if let Some(pos) = text.find(data.as_str()) {
                let mut consumed = pos + data.len();
                while let Some((_, next)) = texts.get(cursor) {
                    let rest = text[consumed..].trim_start();
                    if next.is_empty() || !rest.starts_with(next.as_str()) {
                        break;
                    }
                    consumed = text.len() - rest.len() + next.len();
                    cursor += 1;
                }
            }

            lines.push(self.build_line(*node, root, text));
        }
        lines
    }

    fn text_nodes(&self, root: NodeId) -> Vec<NodeId> {
        let tree = self.tree;
        let mut nodes = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if tree.is_text(node) {
                nodes.push(node);
                continue;
            }
            if tree.tag_name(node).is_some_and(|t| INVISIBLE_TAGS.contains(&t)) || !self.is_rendered(node) {
                continue;
            }
            stack.extend(tree.children(node).iter().rev());
        }
        nodes
    }

    fn build_line(&self, node: NodeId, root: NodeId, text: &str) -> LineCandidate {
        let tree = self.tree;
        let mut element = tree.parent(node).unwrap_or(root);
        while element != root && !collapse_whitespace(&tree.text(element)).contains(text) {
            match tree.parent(element) {
                Some(parent) => element = parent,
                None => break,
            }
        }

        let lineage: Vec<NodeId> = tree.ancestors(node).take_while(|n| tree.is_element(*n)).collect();
        let heading = lineage.iter().any(|n| {
            tree.tag_name(*n).is_some_and(|t| HEADING_TAGS.contains(&t))
                || tree.attr(*n, "class").is_some_and(|c| {
                    let c = c.to_lowercase();
                    c.contains("title") || c.contains("cat")
                })
        });
        let breadcrumb = lineage
            .iter()
            .any(|n| tree.class_and_id(*n).to_lowercase().contains("breadcrumb"));
        let link = lineage
            .iter()
            .find(|n| tree.tag_name(**n) == Some("a"))
            .and_then(|a| tree.attr(*a, "href"))
            .map(str::to_string);

        let mut line = LineCandidate {
            node,
            element,
            text: text.to_string(),
            score: 0.0,
            heading,
            breadcrumb,
            link,
            near_hr: false,
            path_fraction: self.patterns.path_fraction(text),
            title_fraction: self.patterns.title_fraction(text),
            chapter: None,
            volume: None,
            chapter_word: false,
            volume_word: false,
            compact: false,
            abbreviation_number: false,
            abbreviation: None,
            part: patterns::PART.is_match(text),
            irrelevant: false,
        };
        self.match_labels(&mut line);
        line
    }

    fn match_labels(&self, line: &mut LineCandidate) {
        let text = line.text.as_str();
        line.abbreviation = self.patterns.abbreviation.as_ref().and_then(|re| re.find(text)).map(|m| m.range());

        if let Some(m) = patterns::CHAPTER.find(text) {
            line.chapter = Some(m.range());
            line.chapter_word = true;
        }
        // Prefer volume wording that precedes the chapter, but keep a later one too
        let volumes: Vec<_> = patterns::VOLUME.find_iter(text).map(|m| m.range()).collect();
        line.volume = volumes
            .iter()
            .find(|v| line.chapter.as_ref().is_none_or(|c| v.start < c.start))
            .or_else(|| volumes.first())
            .cloned();
        line.volume_word = line.volume.is_some();

        if line.chapter.is_none()
            && line.volume.is_none()
            && let Some(caps) = patterns::COMPACT.captures(text)
            && let (Some(volume), Some(chapter)) = (caps.get(1), caps.get(2))
        {
            line.volume = Some(volume.range());
            line.chapter = Some(chapter.range());
            line.compact = true;
        }

        if line.chapter.is_none()
            && line.volume.is_none()
            && let Some(re) = &self.patterns.abbreviation_number
            && let Some(number) = re.captures(text).and_then(|c| c.get(1))
        {
            line.chapter = Some(number.range());
            line.abbreviation_number = true;
        }
    }

    /// Lines directly before and after an `<hr>` inside the root
    fn mark_hr_neighbours(&self, root: NodeId, lines: &mut [LineCandidate]) {
        for hr in self.tree.descendants(root).filter(|n| self.tree.tag_name(*n) == Some("hr")) {
            let after = lines
                .iter()
                .position(|l| self.index.document_order(l.node, hr) == Some(Ordering::Greater));
            let (before, after) = match after {
                Some(i) => (i.checked_sub(1), Some(i)),
                None => (lines.len().checked_sub(1), None),
            };
            for i in before.into_iter().chain(after) {
                lines[i].near_hr = true;
            }
        }
    }

    fn mark_irrelevant(&self, lines: &mut [LineCandidate]) {
        let mut repeats: HashMap<&str, usize> = HashMap::new();
        for line in lines.iter() {
            *repeats.entry(line.text.as_str()).or_default() += 1;
        }
        let repeated: Vec<bool> = lines
            .iter()
            .map(|l| repeats.get(l.text.as_str()).copied().unwrap_or_default() > self.limits.max_repeats)
            .collect();

        let viewport_width = self.layout.viewport().width;
        for (line, repeated) in lines.iter_mut().zip(repeated) {
            line.irrelevant = repeated
                || line.text.chars().count() > self.limits.max_len
                || patterns::NAVIGATION.is_match(&line.text)
                || self.url.is_some_and(|u| is_same_url(u, &line.text))
                || self.offscreen_left(line.node, viewport_width);
        }
    }

    fn offscreen_left(&self, node: NodeId, viewport_width: f64) -> bool {
        self.tree
            .ancestors(node)
            .take_while(|n| self.tree.is_element(*n))
            .any(|n| self.layout.computed_style(self.tree, n).left.is_some_and(|left| left <= -viewport_width))
    }
}

fn is_same_url(url: &str, text: &str) -> bool {
    url.trim_end_matches('/') == text.trim().trim_end_matches('/')
}

/// Score of one line from its signals
pub fn score_line(line: &LineCandidate) -> f64 {
    if line.irrelevant {
        return 0.0;
    }
    let mut score = 0.0;
    if line.chapter_word {
        score += 5.0;
    }
    if line.volume_word {
        score += 5.0;
    }
    if line.compact || line.abbreviation_number {
        score += 3.0;
    }
    if line.chapter.is_some() && patterns::DIGIT.is_match(&line.text) {
        score += 2.0;
    }
    if line.heading {
        score += 2.0;
    }
    for signal in [line.breadcrumb, line.part, line.abbreviation.is_some(), line.near_hr] {
        if signal {
            score += 1.0;
        }
    }
    if line.chapter.is_some() && line.link.is_some() {
        score -= 1.0;
    }
    score + 3.0 * line.path_fraction + 3.0 * line.title_fraction
}
