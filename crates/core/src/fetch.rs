//! Page loading from URLs, files, and stdin.
//!
//! This module provides functions for retrieving HTML pages from
//! various sources: HTTP/HTTPS URLs, local files, and standard input.
//! URL fetching needs the `fetch` feature.

use std::fs;
use std::path::PathBuf;

#[cfg(feature = "fetch")]
use std::time::Duration;

#[cfg(feature = "fetch")]
use reqwest::Client;
#[cfg(feature = "fetch")]
use tracing::debug;
#[cfg(feature = "fetch")]
use url::Url;

use crate::{FolioError, Result};

/// HTTP client configuration for fetching web pages.
///
/// This struct controls timeout and user agent settings for HTTP requests.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Custom User-Agent string.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout: 30, user_agent: "Mozilla/5.0 (compatible; Folio/0.1; reading progress tracker)".to_string() }
    }
}

/// A fetched page and the URL it was finally served from.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub html: String,
    /// Location after redirects; metadata extraction reads its path
    pub final_url: String,
}

/// Fetches an HTML page from a URL.
///
/// This function performs an HTTP GET request and returns the response body
/// together with the final URL. It follows redirects, respects the configured
/// timeout, and uses a browser-like User-Agent for better compatibility.
#[cfg(feature = "fetch")]
pub async fn fetch_url(url: &str, config: &FetchConfig) -> Result<FetchedPage> {
    let parsed_url = Url::parse(url).map_err(|e| FolioError::InvalidUrl(e.to_string()))?;

    if !matches!(parsed_url.scheme(), "http" | "https") {
        return Err(FolioError::InvalidUrl(format!("unsupported scheme: {}", parsed_url.scheme())));
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout))
        .build()
        .map_err(FolioError::HttpError)?;

    let response = client
        .get(parsed_url)
        .header("User-Agent", &config.user_agent)
        .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
        .header("Accept-Language", "en-US,en;q=0.9")
        .send()
        .await
        .map_err(|e| if e.is_timeout() { FolioError::Timeout { timeout: config.timeout } } else { FolioError::HttpError(e) })?;

    let final_url = response.url().to_string();
    let html = response.text().await?;
    debug!(url = %final_url, bytes = html.len(), "fetched page");

    Ok(FetchedPage { html, final_url })
}

/// Reads an HTML page from a local file.
///
/// Callers should validate and sanitize the path when accepting user input.
pub fn fetch_file(path: &str) -> Result<String> {
    let path_buf = PathBuf::from(path);

    if !path_buf.exists() {
        Err(FolioError::FileNotFound(path_buf))
    } else {
        fs::read_to_string(&path_buf).map_err(FolioError::from)
    }
}

/// Reads an HTML page from standard input until EOF.
pub fn fetch_stdin() -> Result<String> {
    use std::io::{self, Read};

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(FolioError::from)?;

    Ok(buffer)
}
