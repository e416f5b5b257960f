//! Regular expressions used to recognise bibliographic lines.
//!
//! Fixed patterns cover chapter/volume wording and navigation links;
//! [`PagePatterns`] holds the per-page patterns derived from the URL path
//! and the document title.

use std::sync::LazyLock;

use regex::Regex;

/// Chapter wording. `SS` (side story) only matches in upper case.
pub static CHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(?i:\b(?:chapter\b|chap\.|ch\.|c\d+\b|episode\b|ep\.|extra\b|intermission\b|side story\b|prologue\b|epilogue\b))|\bSS\b)").unwrap()
});

/// Volume wording
pub static VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:volume\b|vol\.|v\d+\b|arc\b|book\b)").unwrap());

/// `3-12` style volume-chapter numbering
pub static COMPACT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d+)\s*-\s*(\d+)\b").unwrap());

/// First standalone number, with at most one decimal group
pub static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());

pub static PART: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpart\s*\d+").unwrap());

pub static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

/// Next/previous navigation wording
pub static NAVIGATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^\W*(?:next|prev|previous|back|index|home|toc|table of contents)\W*$|\b(?:next|prev|previous)\s+(?:chapter|page|episode|part)\b|[«»]\s*$|^\s*[«»])").unwrap()
});

/// Separators between title parts
pub static TITLE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[|\-–/>»]").unwrap());

/// Characters trimmed from both ends of extracted labels
pub const LABEL_TRIM: &[char] = &['|', '-', '–', '/', '\\', '>', '»', ':', ',', ' '];

/// Trim separator punctuation and whitespace from both ends
pub fn trim_label(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || LABEL_TRIM.contains(&c))
}

fn snippet_regex(snippet: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b{}s?\b", regex::escape(snippet))).ok()
}

/// Patterns derived from one page's URL path and title.
#[derive(Debug, Clone, Default)]
pub struct PagePatterns {
    pub path_snippets: Vec<Regex>,
    pub title_snippets: Vec<Regex>,
    /// Multi-capital abbreviations of the title, e.g. `MNA`
    pub abbreviations: Vec<String>,
    /// Any abbreviation as a whole word
    pub abbreviation: Option<Regex>,
    /// An abbreviation followed by a number; group 1 is the number
    pub abbreviation_number: Option<Regex>,
}

impl PagePatterns {
    pub fn new(path: &str, title: &str) -> Self {
        let path_snippets = path_snippets(path).iter().filter_map(|s| snippet_regex(s)).collect();
        let title_snippets = title_snippets(title).iter().filter_map(|s| snippet_regex(s)).collect();
        let abbreviations = abbreviations(title);

        let (abbreviation, abbreviation_number) = if abbreviations.is_empty() {
            (None, None)
        } else {
            let alternation = abbreviations.iter().map(|a| regex::escape(a)).collect::<Vec<_>>().join("|");
            (
                Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).ok(),
                Regex::new(&format!(r"(?i)\b(?:{alternation})\s*[-:#.]?\s*(\d+(?:[.,]\d+)?)\b")).ok(),
            )
        };

        Self { path_snippets, title_snippets, abbreviations, abbreviation, abbreviation_number }
    }

    /// Fraction of path snippets found in `text`
    pub fn path_fraction(&self, text: &str) -> f64 {
        fraction(&self.path_snippets, text)
    }

    /// Fraction of title snippets found in `text`
    pub fn title_fraction(&self, text: &str) -> f64 {
        fraction(&self.title_snippets, text)
    }
}

fn fraction(patterns: &[Regex], text: &str) -> f64 {
    if patterns.is_empty() {
        return 0.0;
    }
    let hits = patterns.iter().filter(|p| p.is_match(text)).count();
    hits as f64 / patterns.len() as f64
}

/// Path segments split on hyphens and underscores, without file extensions
pub fn path_snippets(path: &str) -> Vec<String> {
    let mut snippets = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let segment = match segment.rsplit_once('.') {
            Some((stem, ext)) if ext.chars().all(|c| c.is_ascii_alphabetic()) && !stem.is_empty() => stem,
            _ => segment,
        };
        for part in segment.split(['-', '_']).filter(|p| !p.is_empty()) {
            let part = part.to_lowercase();
            if !snippets.contains(&part) {
                snippets.push(part);
            }
        }
    }
    snippets
}

/// Title parts split on separators, then on whitespace
pub fn title_snippets(title: &str) -> Vec<String> {
    let mut snippets = Vec::new();
    for part in TITLE_SEPARATOR.split(title) {
        for word in part.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if !word.is_empty() && !snippets.contains(&word) {
                snippets.push(word);
            }
        }
    }
    snippets
}

/// Abbreviations a site may use for the work named in `title`.
///
/// Collects all-caps words (`MNA`), the capitals of camel-cased words
/// (`MyNovelAbbr` gives `MNA`) and the initials of runs of capitalised words
/// (`My Novel Abbr` gives `MNA`).
pub fn abbreviations(title: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |abbr: String| {
        if abbr.chars().count() >= 2 && !found.contains(&abbr) {
            found.push(abbr);
        }
    };

    for part in TITLE_SEPARATOR.split(title) {
        let mut initials = String::new();
        for word in part.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            let capitals: String = word.chars().filter(|c| c.is_uppercase()).collect();
            let letters = word.chars().filter(|c| c.is_alphabetic()).count();

            if letters >= 2 && capitals.chars().count() == letters {
                push(word.to_string());
            } else if capitals.chars().count() >= 2 {
                push(capitals);
            }

            if word.chars().next().is_some_and(|c| c.is_uppercase()) && word.chars().any(|c| c.is_lowercase()) {
                initials.extend(word.chars().next());
            } else {
                push(std::mem::take(&mut initials));
            }
        }
        push(initials);
    }
    found.retain(|a| !CHAPTER.is_match(a) && !VOLUME.is_match(a));
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_pattern() {
        for line in ["Chapter 12", "ch. 4", "C45", "Episode 3", "Side Story 2", "SS 1", "Extra"] {
            assert!(CHAPTER.is_match(line), "{line}");
        }
        for line in ["chapters of life", "ss 1", "Chancellor", "which"] {
            assert!(!CHAPTER.is_match(line), "{line}");
        }
    }

    #[test]
    fn test_volume_pattern() {
        for line in ["Volume 2", "vol. 3", "V2", "Arc 1", "Book 4"] {
            assert!(VOLUME.is_match(line), "{line}");
        }
        assert!(!VOLUME.is_match("Bookmark"));
    }

    #[test]
    fn test_navigation_pattern() {
        for line in ["Next", "« Previous", "Next Chapter", "Table of Contents", "Prev Chapter »"] {
            assert!(NAVIGATION.is_match(line), "{line}");
        }
        assert!(!NAVIGATION.is_match("The next morning, she left."));
    }

    #[test]
    fn test_path_snippets() {
        assert_eq!(path_snippets("/book/mna/chapter-12/"), vec!["book", "mna", "chapter", "12"]);
        assert_eq!(path_snippets("/novel/my_story/ch-3.html"), vec!["novel", "my", "story", "ch", "3"]);
    }

    #[test]
    fn test_title_snippets() {
        assert_eq!(title_snippets("MyNovelAbbr MNA - Chapter 12"), vec!["mynovelabbr", "mna", "chapter", "12"]);
        assert_eq!(title_snippets("A | B » C"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_abbreviations() {
        assert_eq!(abbreviations("MyNovelAbbr MNA - Chapter 12"), vec!["MNA"]);
        assert_eq!(abbreviations("Against The Gods | Read Online"), vec!["ATG", "RO"]);
        assert!(abbreviations("chapter twelve").is_empty());
    }

    #[test]
    fn test_snippet_regex_tolerates_plural() {
        let re = snippet_regex("chapter").unwrap();
        assert!(re.is_match("Chapters 1-3"));
        assert!(!re.is_match("chaptered"));
    }

    #[test]
    fn test_page_patterns_fractions() {
        let patterns = PagePatterns::new("/book/mna/chapter-12/", "MyNovelAbbr MNA - Chapter 12");
        assert_eq!(patterns.path_fraction("MNA Chapter 12"), 0.75);
        assert_eq!(patterns.title_fraction("MNA Chapter 12"), 0.75);
        let abbr = patterns.abbreviation_number.unwrap();
        assert_eq!(&abbr.captures("MNA 7").unwrap()[1], "7");
    }

    #[test]
    fn test_trim_label() {
        assert_eq!(trim_label(" - Chapter 12 | "), "Chapter 12");
        assert_eq!(trim_label("»"), "");
    }
}
