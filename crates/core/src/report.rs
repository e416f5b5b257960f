//! Report output type.
//!
//! A [`Report`] is what an analysis session hands to the outside world: the
//! metadata labels, the kind of content found and the reading progress. It
//! carries no node handles, so it can be serialized and sent anywhere.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::formatters::{JsonConfig, TextConfig, report_to_json, report_to_text};
use crate::metadata::Metadata;
use crate::select::ContentType;

/// Output format options for a Report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON object with camelCase keys.
    Json,
    /// Aligned key/value listing.
    Text,
}

/// Metadata and progress of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Title of the work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vol_index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chap_index: Option<String>,

    /// Kind of main content, `null` when none was found
    #[serde(rename = "type")]
    pub content_type: Option<ContentType>,

    /// Consumed fraction in `[0, 1]`, three decimals
    pub progress: f64,
}

impl Report {
    pub fn new(metadata: &Metadata, content_type: Option<ContentType>, progress: f64) -> Self {
        Self {
            novel: metadata.novel.clone(),
            volume: metadata.volume.clone(),
            chapter: metadata.chapter.clone(),
            vol_index: metadata.vol_index.clone(),
            chap_index: metadata.chap_index.clone(),
            content_type,
            progress,
        }
    }

    /// The "no content found" report
    pub fn empty() -> Self {
        Self::new(&Metadata::default(), None, 0.0)
    }

    pub fn has_content(&self) -> bool {
        self.content_type.is_some()
    }

    /// The metadata part of the report
    pub fn metadata(&self) -> Metadata {
        Metadata {
            novel: self.novel.clone(),
            volume: self.volume.clone(),
            chapter: self.chapter.clone(),
            vol_index: self.vol_index.clone(),
            chap_index: self.chap_index.clone(),
        }
    }

    /// Renders the report in the given format.
    pub fn to_format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => report_to_json(self, &JsonConfig::default()),
            OutputFormat::Text => Ok(report_to_text(self, &TextConfig::default())),
        }
    }

    /// Gets the report as a JSON value.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| crate::FolioError::SerializationError(e.to_string()))
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::empty()
    }
}
