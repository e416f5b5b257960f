pub mod dom_tree;
#[cfg(feature = "runtime")]
pub mod driver;
pub mod error;
pub mod fetch;
pub mod formatters;
pub mod layout;
pub mod metadata;
pub mod parse;
pub mod position;
pub mod progress;
pub mod report;
pub mod scoring;
pub mod select;
pub mod session;

#[doc(hidden)]
pub use dom_tree::{DomNode, DomTree, NodeId};
#[cfg(feature = "runtime")]
pub use driver::{PageEvent, drive};
pub use error::{FolioError, Result};
pub use fetch::{FetchConfig, FetchedPage, fetch_file, fetch_stdin};
#[cfg(feature = "fetch")]
pub use fetch::fetch_url;
pub use formatters::{JsonConfig, JsonFormatter, TextConfig, TextFormatter};
pub use formatters::{metadata_to_json, report_to_json, report_to_text};
pub use layout::{ComputedStyle, Layout, LiveLayout, PlaybackState, Rect, StaticLayout, Viewport};
pub use metadata::{MetaExtractor, Metadata};
pub use parse::Document;
pub use position::{NodePosition, PositionIndex};
pub use progress::{ProgressTracker, SeenElements};
pub use report::{OutputFormat, Report};
#[doc(hidden)]
pub use scoring::{ContentRecord, ContentScorer, ScoreConfig, ScoreOutcome};
pub use select::{ContentSelector, ContentType, Selection};
#[cfg(feature = "fetch")]
pub use session::fetch_and_analyze;
pub use session::{AnalysisConfig, AnalysisConfigBuilder, Mutation, Session, analyze_html};
