//! HTML parsing into an analysable page.
//!
//! This module provides the [`Document`] type: a [`DomTree`] together with
//! the page URL and title that drive metadata extraction.
//!
//! # Example
//!
//! ```rust
//! use folio_core::parse::Document;
//!
//! let html = r#"
//!     <html>
//!         <head><title>My Novel - Chapter 3</title></head>
//!         <body><p class="content">Paragraph</p></body>
//!     </html>
//! "#;
//!
//! let doc = Document::parse_with_url(html, "https://example.com/my-novel/chapter-3/").unwrap();
//! assert_eq!(doc.title(), "My Novel - Chapter 3");
//! assert_eq!(doc.path(), "/my-novel/chapter-3/");
//! ```

use scraper::Html;
use url::Url;

use crate::dom_tree::{DomTree, NodeId, collapse_whitespace};
use crate::{FolioError, Result};

/// Represents a parsed HTML page.
///
/// The title is read from `<title>` at parse time and can be replaced later,
/// mirroring a script assigning `document.title`.
#[derive(Debug, Clone)]
pub struct Document {
    tree: DomTree,
    url: Option<Url>,
    title: String,
}

impl Document {
    /// Parses HTML from a string.
    ///
    /// # Example
    ///
    /// ```rust
    /// use folio_core::parse::Document;
    ///
    /// let doc = Document::parse("<html><body><h1>Title</h1></body></html>").unwrap();
    /// assert!(doc.body().is_some());
    /// ```
    pub fn parse(html: &str) -> Result<Self> {
        let parsed = Html::parse_document(html);
        let tree = DomTree::from_html(&parsed);
        let title = read_title(&tree);
        Ok(Self { tree, url: None, title })
    }

    /// Parses HTML with a known page URL.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::InvalidUrl`] if the URL is invalid.
    pub fn parse_with_url(html: &str, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| FolioError::InvalidUrl(e.to_string()))?;
        let mut doc = Self::parse(html)?;
        doc.url = Some(url);
        Ok(doc)
    }

    /// The node tree
    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    /// Mutable access to the node tree, for applying page mutations
    pub fn tree_mut(&mut self) -> &mut DomTree {
        &mut self.tree
    }

    /// The `<body>` element
    pub fn body(&self) -> Option<NodeId> {
        self.tree.body()
    }

    /// The page URL, if known
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// The URL path, `/` when no URL is known
    pub fn path(&self) -> &str {
        self.url.as_ref().map(|u| u.path()).unwrap_or("/")
    }

    /// The current page title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Replace the page title; returns whether it changed
    pub fn set_title(&mut self, title: &str) -> bool {
        let title = collapse_whitespace(title);
        if title == self.title {
            return false;
        }
        self.title = title;
        true
    }
}

fn read_title(tree: &DomTree) -> String {
    tree.elements_by_tag("title")
        .first()
        .map(|t| collapse_whitespace(&tree.text(*t)))
        .unwrap_or_default()
}
