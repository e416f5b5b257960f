//! Error types for Folio operations.
//!
//! This module defines the main error type [`FolioError`] which represents
//! all possible errors that can occur while loading a page, analysing it,
//! and tracking reading progress.
//!
//! Not every unhappy path is an error: a page without a usable content
//! region is a valid outcome and is reported as `None` by the selector.
//!
//! # Example
//!
//! ```rust
//! use folio_core::{FolioError, Result};
//!
//! fn require_html(html: &str) -> Result<&str> {
//!     if html.is_empty() {
//!         return Err(FolioError::HtmlParseError("empty input".to_string()));
//!     }
//!     Ok(html)
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for content analysis operations.
#[derive(Error, Debug)]
pub enum FolioError {
    /// HTTP request errors from reqwest.
    ///
    /// This variant wraps network errors, DNS failures, connection issues,
    /// and other HTTP-related problems.
    #[cfg(feature = "fetch")]
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Request timeout.
    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTML parsing errors, including malformed fragments.
    #[error("Failed to parse HTML: {0}")]
    HtmlParseError(String),

    /// Two nodes expected to live in the same tree do not share an ancestor,
    /// or a text line could not be traced back to a node.
    ///
    /// Analysis stages drop the offending line or range instead of aborting.
    #[error("Structural mismatch: {0}")]
    StructuralMismatch(String),

    /// A node handle does not belong to the document it was used with.
    #[error("Unknown node: {0}")]
    UnknownNode(usize),

    /// An element without playback position, duration and ended state was
    /// registered for time-based progress.
    ///
    /// This is a programming error on the caller's side and is never
    /// degraded silently.
    #[error("Element <{tag}> does not expose playback state")]
    InvalidDurationElement { tag: String },

    /// Local input file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// A report could not be serialized.
    #[error("Failed to serialize report: {0}")]
    SerializationError(String),

    /// Configuration file is missing or malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// File I/O errors.
    #[error("Failed to write to file: {0}")]
    WriteError(#[from] std::io::Error),
}

impl From<serde_json::Error> for FolioError {
    fn from(err: serde_json::Error) -> Self {
        FolioError::ConfigError(err.to_string())
    }
}

/// Result type alias for FolioError.
pub type Result<T> = std::result::Result<T, FolioError>;
