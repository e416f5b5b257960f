use crate::metadata::Metadata;
use crate::report::Report;
use crate::{FolioError, Result};
use serde::Serialize;

/// Configuration for JSON output
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Pretty print JSON output
    pub pretty: bool,
}

fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.map_err(|e| FolioError::SerializationError(e.to_string()))
}

/// Convert a report to JSON
pub fn report_to_json(report: &Report, config: &JsonConfig) -> Result<String> {
    to_json(report, config.pretty)
}

/// Convert metadata alone to JSON
pub fn metadata_to_json(metadata: &Metadata, pretty: bool) -> Result<String> {
    to_json(metadata, pretty)
}

/// JSON formatter with configurable options
pub struct JsonFormatter {
    config: JsonConfig,
}

impl JsonFormatter {
    pub fn new(config: JsonConfig) -> Self {
        Self { config }
    }

    pub fn convert(&self, report: &Report) -> Result<String> {
        report_to_json(report, &self.config)
    }

    pub fn metadata_only(&self, metadata: &Metadata) -> Result<String> {
        metadata_to_json(metadata, self.config.pretty)
    }
}
