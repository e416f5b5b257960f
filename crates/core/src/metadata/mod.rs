//! Bibliographic metadata of a reading page.
//!
//! Given the bounds of the main content, [`MetaExtractor`] scans the lines
//! around it for the novel title, volume and chapter labels. Each line is
//! scored from wording (`Chapter`, `Vol.`), page context (URL path and
//! document title snippets) and markup (headings, breadcrumbs, links), and
//! the best chapter and volume lines supply the labels.
//!
//! # Example
//!
//! ```rust
//! use folio_core::layout::StaticLayout;
//! use folio_core::metadata::MetaExtractor;
//! use folio_core::parse::Document;
//! use folio_core::position::PositionIndex;
//! use folio_core::session::AnalysisConfig;
//!
//! let html = r#"<html><head><title>Dawn Road - Chapter 4</title></head>
//!     <body><div id="c"><h2 id="h">Dawn Road Chapter 4: Rain</h2><p id="p">It rained, and rained.</p></div></body></html>"#;
//! let doc = Document::parse_with_url(html, "https://example.com/dawn-road/chapter-4").unwrap();
//! let layout = StaticLayout::new();
//! let index = PositionIndex::build(doc.tree(), doc.tree().root());
//! let config = AnalysisConfig::default();
//!
//! let extractor = MetaExtractor::new(&doc, &layout, &index, &config);
//! let start = doc.tree().element_by_id("h").unwrap();
//! let end = doc.tree().element_by_id("p").unwrap();
//! let meta = extractor.extract(start, end).unwrap();
//! assert_eq!(meta.chapter.as_deref(), Some("Chapter 4: Rain"));
//! assert_eq!(meta.chap_index.as_deref(), Some("4"));
//! assert_eq!(meta.novel.as_deref(), Some("Dawn Road"));
//! ```

pub mod lines;
pub mod patterns;

use serde::Serialize;
use tracing::debug;

use crate::dom_tree::NodeId;
use crate::layout::Layout;
use crate::parse::Document;
use crate::position::PositionIndex;
use crate::session::AnalysisConfig;
use crate::{FolioError, Result};

pub use lines::{LineCandidate, LineCollector, LineLimits};
pub use patterns::PagePatterns;

/// Labels describing where in a work the page sits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub novel: Option<String>,
    pub volume: Option<String>,
    pub chapter: Option<String>,
    pub vol_index: Option<String>,
    pub chap_index: Option<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Extracts [`Metadata`] from the lines around a content range.
pub struct MetaExtractor<'a, L: Layout + ?Sized> {
    doc: &'a Document,
    layout: &'a L,
    index: &'a PositionIndex,
    config: &'a AnalysisConfig,
    patterns: PagePatterns,
}

impl<'a, L: Layout + ?Sized> MetaExtractor<'a, L> {
    /// Build an extractor; page patterns come from the current URL path and title
    pub fn new(doc: &'a Document, layout: &'a L, index: &'a PositionIndex, config: &'a AnalysisConfig) -> Self {
        let patterns = PagePatterns::new(doc.path(), doc.title());
        Self { doc, layout, index, config, patterns }
    }

    pub fn patterns(&self) -> &PagePatterns {
        &self.patterns
    }

    /// Scored lines under the closest common ancestor of `start` and `end`.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::StructuralMismatch`] when the two bounds share
    /// no ancestor in the position index.
    pub fn lines(&self, start: NodeId, end: NodeId) -> Result<Vec<LineCandidate>> {
        let tree = self.doc.tree();
        let root = self.index.closest_common_ancestor(tree, start, end).ok_or_else(|| {
            FolioError::StructuralMismatch(format!(
                "range {} .. {} has no common ancestor",
                tree.css_path(start),
                tree.css_path(end)
            ))
        })?;
        let limits = LineLimits { max_len: self.config.max_line_len, max_repeats: self.config.max_line_repeats };
        let url = self.doc.url().map(|u| u.as_str());
        let collector = LineCollector::new(tree, self.layout, self.index, &self.patterns, url, limits);
        Ok(collector.collect(root))
    }

    /// Extract labels for the range `start ..= end`
    pub fn extract(&self, start: NodeId, end: NodeId) -> Result<Metadata> {
        let lines = self.lines(start, end)?;
        Ok(self.extract_from_lines(&lines))
    }

    /// Pick labels from already scored lines.
    ///
    /// Missing pieces stay `None`: a chapter without a novel title is a
    /// valid outcome.
    pub fn extract_from_lines(&self, lines: &[LineCandidate]) -> Metadata {
        let mut meta = Metadata::default();

        let chapter_line = best(lines, 0..lines.len(), |l| l.chapter.is_some());
        if let Some(i) = chapter_line {
            let line = &lines[i];
            if let Some(chapter) = &line.chapter {
                let label = patterns::trim_label(&line.text[chapter.start..]);
                meta.chap_index = first_number(label);
                meta.chapter = non_empty(label);
            }
        }

        // Volume from the chapter line when it leads the chapter, else the
        // best line not below it (the chapter line included)
        let volume_line = match chapter_line {
            Some(i) if volume_leads_chapter(&lines[i]) => Some(i),
            Some(i) => best(lines, 0..i + 1, |l| l.volume.is_some()),
            None => best(lines, 0..lines.len(), |l| l.volume.is_some()),
        };
        if let Some(i) = volume_line {
            let line = &lines[i];
            if let Some(volume) = &line.volume {
                let end = match &line.chapter {
                    Some(chapter) if chapter.start > volume.start => chapter.start,
                    _ => line.text.len(),
                };
                let label = patterns::trim_label(&line.text[volume.start..end]);
                meta.vol_index = first_number(label);
                meta.volume = non_empty(label);
            }
        }

        let anchor = match (chapter_line, volume_line) {
            (Some(c), Some(v)) => Some(c.min(v)),
            (c, v) => c.or(v),
        };
        meta.novel = anchor
            .and_then(|i| lines[i].label_start().and_then(|s| non_empty(patterns::trim_label(&lines[i].text[..s]))))
            .or_else(|| self.novel_line(lines, anchor.unwrap_or(lines.len())))
            .or_else(|| self.patterns.abbreviations.first().cloned());

        debug!(
            chapter_line = chapter_line.map(|i| lines[i].text.as_str()),
            volume_line = volume_line.map(|i| lines[i].text.as_str()),
            novel = meta.novel.as_deref(),
            "metadata lines"
        );
        meta
    }

    /// Best line above `anchor` that looks like the work title
    fn novel_line(&self, lines: &[LineCandidate], anchor: usize) -> Option<String> {
        let i = best(lines, 0..anchor.min(lines.len()), |l| {
            l.chapter.is_none() && l.volume.is_none() && (3.0 * l.path_fraction > 1.5 || 3.0 * l.title_fraction > 1.5)
        })?;
        non_empty(patterns::trim_label(&lines[i].text))
    }
}

/// Index of the highest-scoring relevant line in `range` matching `filter`;
/// the earliest wins ties.
fn best(lines: &[LineCandidate], range: std::ops::Range<usize>, filter: impl Fn(&LineCandidate) -> bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for i in range {
        let line = &lines[i];
        if line.irrelevant || !filter(line) {
            continue;
        }
        if best.is_none_or(|b| line.score > lines[b].score) {
            best = Some(i);
        }
    }
    best
}

fn volume_leads_chapter(line: &LineCandidate) -> bool {
    match (&line.volume, &line.chapter) {
        (Some(volume), Some(chapter)) => volume.start < chapter.start,
        _ => false,
    }
}

fn first_number(text: &str) -> Option<String> {
    patterns::NUMBER.find(text).map(|m| m.as_str().to_string())
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StaticLayout;

    fn extract(html: &str, url: &str) -> Metadata {
        let doc = Document::parse_with_url(html, url).unwrap();
        let layout = StaticLayout::new();
        let index = PositionIndex::build(doc.tree(), doc.tree().root());
        let config = AnalysisConfig::default();
        let extractor = MetaExtractor::new(&doc, &layout, &index, &config);
        let start = doc.tree().element_by_id("start").unwrap();
        let end = doc.tree().element_by_id("end").unwrap();
        extractor.extract(start, end).unwrap()
    }

    #[test]
    fn test_abbreviated_title_and_chapter() {
        let html = r#"<html><head><title>MyNovelAbbr MNA - Chapter 12</title></head><body>
            <div><h3 id="start">MNA Chapter 12</h3><p>The bells rang, twice.</p><p id="end">She ran, and did not stop.</p></div>
        </body></html>"#;
        let meta = extract(html, "https://example.com/book/mna/chapter-12/");
        assert!(meta.chapter.as_deref().unwrap().contains("Chapter 12"));
        assert_eq!(meta.chap_index.as_deref(), Some("12"));
        assert_eq!(meta.novel.as_deref(), Some("MNA"));
    }

    #[test]
    fn test_volume_before_chapter_on_same_line() {
        let html = r#"<html><head><title>Sky Forge</title></head><body><div>
            <h1 id="start">Sky Forge - Volume 2 - Chapter 7.5 - The Anvil</h1>
            <p id="end">Sparks flew, and the hammer fell.</p>
        </div></body></html>"#;
        let meta = extract(html, "https://example.com/sky-forge/v2/c7");
        assert_eq!(meta.novel.as_deref(), Some("Sky Forge"));
        assert_eq!(meta.volume.as_deref(), Some("Volume 2"));
        assert_eq!(meta.vol_index.as_deref(), Some("2"));
        assert_eq!(meta.chapter.as_deref(), Some("Chapter 7.5 - The Anvil"));
        assert_eq!(meta.chap_index.as_deref(), Some("7.5"));
    }

    #[test]
    fn test_volume_from_line_above_chapter() {
        let html = r#"<html><head><title>Tides</title></head><body><div>
            <div class="breadcrumb" id="start">Tides / Arc 3</div>
            <h2>Chapter 40</h2>
            <p id="end">Water rose, slowly.</p>
        </div></body></html>"#;
        let meta = extract(html, "https://example.com/tides/40");
        assert_eq!(meta.chapter.as_deref(), Some("Chapter 40"));
        assert_eq!(meta.volume.as_deref(), Some("Arc 3"));
        assert_eq!(meta.vol_index.as_deref(), Some("3"));
        assert_eq!(meta.novel.as_deref(), Some("Tides"));
    }

    #[test]
    fn test_navigation_and_long_lines_are_ignored() {
        let long = "word ".repeat(60);
        let html = format!(
            r#"<html><head><title>Moss</title></head><body><div>
            <a id="start" href="/moss/3">Next Chapter</a>
            <p>{long} Chapter 99</p>
            <h2>Chapter 2</h2>
            <p id="end">Green, and damp.</p>
        </div></body></html>"#
        );
        let meta = extract(&html, "https://example.com/moss/2");
        assert_eq!(meta.chapter.as_deref(), Some("Chapter 2"));
    }

    #[test]
    fn test_repeated_lines_are_irrelevant() {
        let html = r#"<html><head><title>Reeds</title></head><body><div id="start">
            <p>Chapter 1</p><p>Chapter 1</p><p>Chapter 1</p><p>Chapter 1</p><p>Chapter 1</p>
            <p id="end">Wind, reeds.</p>
        </div></body></html>"#;
        let meta = extract(html, "https://example.com/reeds");
        assert_eq!(meta.chapter, None);
    }

    fn root_lines(html: &str, url: &str) -> Vec<LineCandidate> {
        let doc = Document::parse_with_url(html, url).unwrap();
        let layout = StaticLayout::new();
        let index = PositionIndex::build(doc.tree(), doc.tree().root());
        let config = AnalysisConfig::default();
        let extractor = MetaExtractor::new(&doc, &layout, &index, &config);
        let root = doc.tree().element_by_id("root").unwrap();
        extractor.lines(root, root).unwrap()
    }

    #[test]
    fn test_volume_after_chapter_wording() {
        let html = r#"<html><body><div>
            <h2 id="start">Chapter 3: Storm</h2><h2>Chapter 3 of Book 2</h2><p id="end">It rained, hard.</p>
        </div></body></html>"#;
        let meta = extract(html, "https://example.com/");
        assert_eq!(meta.chapter.as_deref(), Some("Chapter 3 of Book 2"));
        assert_eq!(meta.volume.as_deref(), Some("Book 2"));
        assert_eq!(meta.vol_index.as_deref(), Some("2"));
        assert_eq!(meta.chap_index.as_deref(), Some("3"));
    }

    #[test]
    fn test_offscreen_line_is_irrelevant() {
        let lines = root_lines(
            r#"<body><div id="root"><p style="position:absolute;left:-9999px">Chapter 9</p><h2>Chapter 2</h2></div></body>"#,
            "https://example.com/",
        );
        assert_eq!(lines.len(), 2);
        assert!(lines[0].irrelevant);
        assert_eq!(lines[0].score, 0.0);
        assert!(!lines[1].irrelevant);
    }

    #[test]
    fn test_line_repeating_page_url_is_irrelevant() {
        let lines = root_lines(
            r#"<body><div id="root"><p>https://example.com/moss/chapter-2/</p><p>Moss chapter, two.</p></div></body>"#,
            "https://example.com/moss/chapter-2",
        );
        assert!(lines[0].irrelevant);
        assert_eq!(lines[0].score, 0.0);
        assert!(!lines[1].irrelevant);
        assert!(lines[1].score > 0.0);
    }

    #[test]
    fn test_part_wording_adds_a_point() {
        let lines = root_lines(
            r#"<body><div id="root"><p>Part 2</p><p>Plain words, here.</p></div></body>"#,
            "https://example.com/",
        );
        assert!(lines[0].part);
        assert_eq!(lines[0].chapter, None);
        assert_eq!(lines[0].score, 1.0);
        assert_eq!(lines[1].score, 0.0);
    }

    #[test]
    fn test_chapter_inside_link_loses_a_point() {
        let lines = root_lines(
            r#"<body><div id="root"><p>Chapter 5</p><p><a href="/moss/5">Chapter 5</a></p></div></body>"#,
            "https://example.com/",
        );
        assert_eq!(lines[0].link, None);
        assert_eq!(lines[1].link.as_deref(), Some("/moss/5"));
        assert_eq!(lines[0].score - lines[1].score, 1.0);
    }

    #[test]
    fn test_abbreviation_number_without_chapter_wording() {
        let html = r#"<html><head><title>Iron Tide ITD</title></head><body><div>
            <h3 id="start">ITD 14</h3><p id="end">Waves, again and again.</p>
        </div></body></html>"#;
        let meta = extract(html, "https://example.com/");
        assert_eq!(meta.chap_index.as_deref(), Some("14"));
        assert_eq!(meta.novel.as_deref(), Some("ITD"));

        let lines = root_lines(
            r#"<html><head><title>Iron Tide ITD</title></head><body><div id="root"><h3>ITD 14</h3></div></body></html>"#,
            "https://example.com/",
        );
        assert!(lines[0].abbreviation_number);
        assert!(!lines[0].chapter_word);
    }

    #[test]
    fn test_compact_numbering() {
        let html = r#"<html><head><title>Stone Path</title></head><body><div>
            <h2 id="start">Stone Path 3-14</h2><p id="end">Dust, then rain.</p>
        </div></body></html>"#;
        let meta = extract(html, "https://example.com/stone-path/3-14");
        assert_eq!(meta.vol_index.as_deref(), Some("3"));
        assert_eq!(meta.chap_index.as_deref(), Some("14"));
        assert_eq!(meta.novel.as_deref(), Some("Stone Path"));
    }

    #[test]
    fn test_novel_from_title_line_without_labels() {
        let html = r#"<html><head><title>Glass Harbour | Reading</title></head><body><div>
            <h1 id="start">Glass Harbour</h1><p id="end">Nothing here is numbered, at all.</p>
        </div></body></html>"#;
        let meta = extract(html, "https://example.com/glass-harbour");
        assert_eq!(meta.chapter, None);
        assert_eq!(meta.novel.as_deref(), Some("Glass Harbour"));
    }

    #[test]
    fn test_hr_neighbours_are_marked() {
        let doc = Document::parse(
            r#"<body><div id="root"><p>Before, one.</p><p id="a">Before, two.</p><hr><p id="b">After, one.</p><p>After, two.</p></div></body>"#,
        )
        .unwrap();
        let layout = StaticLayout::new();
        let index = PositionIndex::build(doc.tree(), doc.tree().root());
        let config = AnalysisConfig::default();
        let extractor = MetaExtractor::new(&doc, &layout, &index, &config);
        let root = doc.tree().element_by_id("root").unwrap();
        let lines = extractor.lines(root, root).unwrap();
        let near: Vec<bool> = lines.iter().map(|l| l.near_hr).collect();
        assert_eq!(near, vec![false, true, true, false]);
    }

    #[test]
    fn test_detached_bound_is_structural_mismatch() {
        let mut doc = Document::parse(r#"<body><p id="p">Text, here.</p></body>"#).unwrap();
        let index = PositionIndex::build(doc.tree(), doc.tree().root());
        let p = doc.tree().element_by_id("p").unwrap();
        let body = doc.body().unwrap();
        let late = doc.tree_mut().append_html(body, "<p>Late, text.</p>").unwrap()[0];

        let layout = StaticLayout::new();
        let config = AnalysisConfig::default();
        let extractor = MetaExtractor::new(&doc, &layout, &index, &config);
        assert!(matches!(extractor.extract(p, late), Err(FolioError::StructuralMismatch(_))));
    }
}
