pub mod json;
pub mod text;

pub use json::{JsonConfig, JsonFormatter, metadata_to_json, report_to_json};
pub use text::{TextConfig, TextFormatter, report_to_text};
