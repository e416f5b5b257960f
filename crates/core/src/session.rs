//! Analysis sessions.
//!
//! A [`Session`] owns everything known about one loaded page: the document,
//! the host layout, the position index, the chosen content and the progress
//! tracker. It runs the analysis once, then follows page events (mutations,
//! title changes, scrolling) until it is disposed.
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use folio_core::session::Session;
//! use folio_core::ContentType;
//!
//! let html = r#"<html><head><title>Dawn Road - Chapter 4</title></head><body>
//!     <article>
//!         <h2>Chapter 4</h2>
//!         <p>It rained all morning, and the road turned to mud before noon.</p>
//!         <p>By evening, the wagons had stopped, one after another, in a line.</p>
//!     </article>
//! </body></html>"#;
//!
//! let mut session = Session::from_html(html, Some("https://example.com/dawn-road/4"), Default::default()).unwrap();
//! let report = session.analyze(Instant::now()).unwrap();
//! assert_eq!(report.content_type, Some(ContentType::Text));
//! assert_eq!(report.chap_index.as_deref(), Some("4"));
//!
//! // Analysis runs once per page
//! assert!(session.analyze(Instant::now()).is_none());
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::dom_tree::NodeId;
use crate::layout::{Layout, StaticLayout};
use crate::metadata::{MetaExtractor, Metadata};
use crate::parse::Document;
use crate::position::{Debounce, PositionIndex, is_foreign_addition};
use crate::progress::ProgressTracker;
use crate::report::Report;
use crate::scoring::{ContentScorer, ScoreConfig, ScoreOutcome};
use crate::select::{ContentSelector, Selection};
use crate::{FolioError, Result};

/// Configuration for an analysis session.
///
/// # Example
///
/// ```rust
/// use folio_core::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .min_candidate_chars(80)
///     .progress_interval_ms(500)
///     .build();
/// assert_eq!(config.min_candidate_chars, 80);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Content scoring weights.
    pub score: ScoreConfig,

    /// Minimum text length of a candidate without media (default: 50).
    pub min_candidate_chars: usize,

    /// Minimum width and height of a gallery image in pixels (default: 200).
    pub min_image_size: f64,

    /// Largest punctuation difference for preferring a nested candidate (default: 5).
    pub nested_char_window: usize,

    /// Lines longer than this are ignored for metadata (default: 200).
    pub max_line_len: usize,

    /// Lines repeated more often than this are ignored for metadata (default: 4).
    pub max_line_repeats: usize,

    /// Progress recomputation interval in milliseconds (default: 300).
    pub progress_interval_ms: u64,

    /// Quiet period before re-indexing after mutations, in milliseconds (default: 500).
    pub index_debounce_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            score: ScoreConfig::default(),
            min_candidate_chars: 50,
            min_image_size: 200.0,
            nested_char_window: 5,
            max_line_len: 200,
            max_line_repeats: 4,
            progress_interval_ms: 300,
            index_debounce_ms: 500,
        }
    }
}

impl AnalysisConfig {
    /// Creates a new builder for AnalysisConfig.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
    }

    /// Loads a JSON configuration file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FolioError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "loaded analysis config");
        Ok(config)
    }

    /// `<config dir>/folio/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("folio").join("config.json"))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn index_debounce(&self) -> Duration {
        Duration::from_millis(self.index_debounce_ms)
    }
}

/// Builder for AnalysisConfig.
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self { config: AnalysisConfig::default() }
    }

    /// Sets the content scoring weights.
    pub fn score(mut self, value: ScoreConfig) -> Self {
        self.config.score = value;
        self
    }

    /// Sets the minimum candidate text length.
    pub fn min_candidate_chars(mut self, value: usize) -> Self {
        self.config.min_candidate_chars = value;
        self
    }

    /// Sets the minimum gallery image size.
    pub fn min_image_size(mut self, value: f64) -> Self {
        self.config.min_image_size = value;
        self
    }

    /// Sets the nested candidate punctuation window.
    pub fn nested_char_window(mut self, value: usize) -> Self {
        self.config.nested_char_window = value;
        self
    }

    /// Sets the maximum metadata line length.
    pub fn max_line_len(mut self, value: usize) -> Self {
        self.config.max_line_len = value;
        self
    }

    /// Sets how often a line may repeat before it is ignored.
    pub fn max_line_repeats(mut self, value: usize) -> Self {
        self.config.max_line_repeats = value;
        self
    }

    /// Sets the progress interval.
    pub fn progress_interval_ms(mut self, value: u64) -> Self {
        self.config.progress_interval_ms = value;
        self
    }

    /// Sets the re-index debounce delay.
    pub fn index_debounce_ms(mut self, value: u64) -> Self {
        self.config.index_debounce_ms = value;
        self
    }

    /// Builds the config.
    pub fn build(self) -> AnalysisConfig {
        self.config
    }
}

impl Default for AnalysisConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A change to the page.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Parse `html` and append the resulting nodes to `parent`
    Append { parent: NodeId, html: String },
    /// Detach `node` from the tree
    Remove { node: NodeId },
    /// Replace the children of `node` with a text node
    SetText { node: NodeId, text: String },
    SetAttribute { node: NodeId, name: String, value: String },
}

/// Per-page analysis state: `new`, `analyze` once, follow events, `dispose`.
pub struct Session<L: Layout> {
    doc: Document,
    layout: L,
    config: AnalysisConfig,
    index: PositionIndex,
    reindex: Debounce,
    outcome: Option<ScoreOutcome>,
    selection: Option<Selection>,
    metadata: Metadata,
    tracker: ProgressTracker,
    analyzed: bool,
    disposed: bool,
}

impl Session<StaticLayout> {
    /// Parse `html` and lay it out with a [`StaticLayout`].
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::InvalidUrl`] if `url` is given and invalid.
    pub fn from_html(html: &str, url: Option<&str>, config: AnalysisConfig) -> Result<Self> {
        let doc = match url {
            Some(url) => Document::parse_with_url(html, url)?,
            None => Document::parse(html)?,
        };
        let mut layout = StaticLayout::new();
        layout.register_media(doc.tree());
        if let Some(body) = doc.body() {
            layout.flow(doc.tree(), body);
        }
        Ok(Self::with_config(doc, layout, config))
    }
}

impl<L: Layout> Session<L> {
    pub fn new(doc: Document, layout: L) -> Self {
        Self::with_config(doc, layout, AnalysisConfig::default())
    }

    pub fn with_config(doc: Document, layout: L, config: AnalysisConfig) -> Self {
        let index = PositionIndex::build(doc.tree(), doc.tree().root());
        let mut tracker = ProgressTracker::new(config.progress_interval());
        if let Some(body) = doc.body() {
            tracker.seen_mut().watch_subtree(doc.tree(), body);
        }
        Self {
            reindex: Debounce::new(config.index_debounce()),
            doc,
            layout,
            config,
            index,
            outcome: None,
            selection: None,
            metadata: Metadata::default(),
            tracker,
            analyzed: false,
            disposed: false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    /// Mutable access to the host layout; call [`Session::viewport_changed`]
    /// after moving the viewport
    pub fn layout_mut(&mut self) -> &mut L {
        &mut self.layout
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn index(&self) -> &PositionIndex {
        &self.index
    }

    pub fn score_outcome(&self) -> Option<&ScoreOutcome> {
        self.outcome.as_ref()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ProgressTracker {
        &mut self.tracker
    }

    pub fn is_analyzed(&self) -> bool {
        self.analyzed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Run the analysis; only the first call on a live session does anything.
    ///
    /// Scoring failures are logged and reported as "no content found".
    pub fn analyze(&mut self, now: Instant) -> Option<Report> {
        if self.analyzed || self.disposed {
            debug!("analysis already ran; ignoring");
            return None;
        }
        self.analyzed = true;
        self.index.compute(self.doc.tree(), self.doc.tree().root());

        let outcome = match ContentScorer::new(self.doc.tree(), &self.layout, &self.config.score).score() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "scoring failed; no content found");
                return Some(Report::empty());
            }
        };
        let selection = ContentSelector::new(self.doc.tree(), &self.layout, &self.index, &outcome, &self.config).select();
        self.outcome = Some(outcome);

        let Some(selection) = selection else {
            info!("no content found");
            return Some(Report::empty());
        };
        self.selection = Some(selection);
        self.metadata = self.extract_metadata(&selection);

        if selection.see_able {
            self.tracker.set_start(selection.start);
            self.tracker.set_end(selection.end);
        }
        if let Some(media) = selection.duration_able
            && let Err(e) = self.tracker.set_duration_able(self.doc.tree(), &self.layout, media)
        {
            warn!(error = %e, "media progress unavailable");
        }

        self.tracker.seen_mut().on_viewport_event(self.doc.tree(), &self.layout);
        let progress = self.progress();
        self.tracker.arm(now, progress);
        info!(content_type = %selection.content_type, progress, "analysis complete");
        Some(self.report(progress))
    }

    fn extract_metadata(&self, selection: &Selection) -> Metadata {
        let extractor = MetaExtractor::new(&self.doc, &self.layout, &self.index, &self.config);
        extractor.extract(selection.start, selection.end).unwrap_or_else(|e| {
            warn!(error = %e, "metadata extraction skipped");
            Metadata::default()
        })
    }

    /// Current progress, rounded to three decimals
    pub fn progress(&self) -> f64 {
        crate::progress::round_progress(self.tracker.progress(self.doc.tree(), &self.layout, &self.index))
    }

    /// Current report
    pub fn report(&self, progress: f64) -> Report {
        Report::new(&self.metadata, self.selection.map(|s| s.content_type), progress)
    }

    /// Apply a page mutation.
    ///
    /// Nodes added outside host-injected elements schedule a re-index after
    /// the debounce delay; every added element is watched for visibility.
    pub fn apply_mutation(&mut self, mutation: Mutation, now: Instant) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let tree = self.doc.tree_mut();
        let added = match mutation {
            Mutation::Append { parent, html } => tree.append_html(parent, &html)?,
            Mutation::Remove { node } => {
                tree.remove(node)?;
                self.tracker.seen_mut().forget_detached(self.doc.tree());
                Vec::new()
            }
            Mutation::SetText { node, text } => {
                tree.set_text(node, &text)?;
                self.doc.tree().children(node).to_vec()
            }
            Mutation::SetAttribute { node, name, value } => {
                tree.set_attr(node, &name, &value)?;
                Vec::new()
            }
        };

        let tree = self.doc.tree();
        let mut foreign = false;
        for node in added {
            foreign |= is_foreign_addition(tree, node);
            if tree.is_element(node) {
                self.tracker.seen_mut().watch_subtree(tree, node);
            }
        }
        if foreign {
            self.reindex.note(now);
        }
        Ok(())
    }

    /// Replace the document title; the index is rebuilt at once and metadata
    /// derived again. Returns a report when the metadata changed.
    pub fn set_title(&mut self, title: &str) -> Option<Report> {
        if self.disposed || !self.doc.set_title(title) {
            return None;
        }
        self.reindex.cancel();
        self.index.compute(self.doc.tree(), self.doc.tree().root());
        let selection = self.selection?;
        let metadata = self.extract_metadata(&selection);
        if metadata == self.metadata {
            return None;
        }
        self.metadata = metadata;
        Some(self.report(self.progress()))
    }

    /// Scroll, resize or load happened: mark watched elements in view as seen
    pub fn viewport_changed(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        self.tracker.seen_mut().on_viewport_event(self.doc.tree(), &self.layout)
    }

    /// Run due timers: the re-index debounce and the progress interval.
    /// Returns a report when the rounded progress changed.
    pub fn poll(&mut self, now: Instant) -> Option<Report> {
        if self.disposed {
            return None;
        }
        if self.reindex.take_due(now) {
            self.index.compute(self.doc.tree(), self.doc.tree().root());
            debug!(nodes = self.index.len(), "position index rebuilt");
        }
        let progress = self.tracker.tick(now, self.doc.tree(), &self.layout, &self.index)?;
        debug!(progress, "progress changed");
        Some(self.report(progress))
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.reindex.deadline(), self.tracker.next_tick()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Pending re-index deadline
    pub fn reindex_deadline(&self) -> Option<Instant> {
        self.reindex.deadline()
    }

    /// Stop timers and observers; later events and polls are ignored
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.reindex.cancel();
        self.tracker.disarm();
        self.tracker.seen_mut().clear();
        debug!("session disposed");
    }
}

/// Analyse an HTML page in one go, without following later events.
///
/// # Example
///
/// ```rust
/// use folio_core::{AnalysisConfig, analyze_html};
///
/// let html = "<html><body><video src=\"clip.mp4\"></video></body></html>";
/// let report = analyze_html(html, None, &AnalysisConfig::default()).unwrap();
/// assert_eq!(report.content_type.map(|t| t.as_str()), Some("video"));
/// ```
pub fn analyze_html(html: &str, url: Option<&str>, config: &AnalysisConfig) -> Result<Report> {
    let mut session = Session::from_html(html, url, config.clone())?;
    Ok(session.analyze(Instant::now()).unwrap_or_default())
}

/// Fetch a page and analyse it.
#[cfg(feature = "fetch")]
pub async fn fetch_and_analyze(
    url: &str, fetch_config: &crate::fetch::FetchConfig, config: &AnalysisConfig,
) -> Result<Report> {
    let page = crate::fetch::fetch_url(url, fetch_config).await?;
    analyze_html(&page.html, Some(&page.final_url), config)
}
