//! Search queries and identifier recognizers.

use regex::Regex;
use std::sync::OnceLock;

/// The enumerated query fields a caller can fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    FreeText,
    Title,
    Author,
    Year,
}

/// A user query: free text, title, author, and year terms plus the number
/// of results requested. Each provider clamps `num_results` to its own cap.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub free_text: String,
    pub title: String,
    pub author: String,
    pub year: String,
    pub num_results: u32,
}

impl SearchQuery {
    #[must_use]
    pub fn free_text(text: impl Into<String>, num_results: u32) -> Self {
        Self {
            free_text: text.into(),
            num_results,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn get(&self, key: QueryKey) -> &str {
        match key {
            QueryKey::FreeText => &self.free_text,
            QueryKey::Title => &self.title,
            QueryKey::Author => &self.author,
            QueryKey::Year => &self.year,
        }
    }

    pub fn set(&mut self, key: QueryKey, value: impl Into<String>) {
        let slot = match key {
            QueryKey::FreeText => &mut self.free_text,
            QueryKey::Title => &mut self.title,
            QueryKey::Author => &mut self.author,
            QueryKey::Year => &mut self.year,
        };
        *slot = value.into();
    }

    /// All non-empty term strings in key order.
    #[must_use]
    pub fn term_strings(&self) -> Vec<&str> {
        [
            self.free_text.as_str(),
            self.title.as_str(),
            self.author.as_str(),
            self.year.as_str(),
        ]
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.term_strings().is_empty()
    }

    /// A DOI found anywhere in the query terms.
    #[must_use]
    pub fn doi(&self) -> Option<&str> {
        self.term_strings()
            .into_iter()
            .find_map(|term| doi_regex().find(term).map(|m| m.as_str()))
    }

    /// An arXiv identifier found anywhere in the query terms.
    #[must_use]
    pub fn arxiv_id(&self) -> Option<&str> {
        self.term_strings()
            .into_iter()
            .find_map(|term| arxiv_regex().find(term).map(|m| m.as_str()))
    }

    /// A checksum-valid ISBN found anywhere in the query terms.
    #[must_use]
    pub fn isbn(&self) -> Option<String> {
        self.term_strings().into_iter().find_map(extract_isbn)
    }
}

/// The DOI pattern: `10.<registrant>/<suffix>`.
pub fn doi_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"10\.\d{4,}/[^\s"]+"#).expect("DOI pattern is valid"))
}

/// Modern (`2301.12345v2`) and legacy (`math.CV/0403448`) arXiv ids.
pub fn arxiv_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?:\d{4}\.\d{4,5}|[a-z-]+(?:\.[A-Z]{2})?/\d{7})(?:v\d+)?")
            .expect("arXiv pattern is valid")
    })
}

/// Extract an ISBN-10 or ISBN-13 with a valid checksum from free text.
#[must_use]
pub fn extract_isbn(text: &str) -> Option<String> {
    let candidates = isbn_candidate_regex().find_iter(text);
    for candidate in candidates {
        let digits: String = candidate
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
            .collect();
        let valid = match digits.len() {
            10 => isbn10_checksum_ok(&digits),
            13 => isbn13_checksum_ok(&digits),
            _ => false,
        };
        if valid {
            return Some(digits.to_uppercase());
        }
    }
    None
}

fn isbn_candidate_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\b[0-9][0-9Xx -]{8,16}[0-9Xx]\b").expect("ISBN pattern is valid")
    })
}

fn isbn10_checksum_ok(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().enumerate() {
        let value = match c {
            'X' | 'x' if i == 9 => 10,
            c => match c.to_digit(10) {
                Some(d) => d,
                None => return false,
            },
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn isbn13_checksum_ok(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().enumerate() {
        let Some(d) = c.to_digit(10) else { return false };
        sum += d * if i % 2 == 0 { 1 } else { 3 };
    }
    sum % 10 == 0
}
