//! Canonical in-memory model for bibliographic entries.
//!
//! Every provider response, whatever its wire format, is normalized into a
//! [`BibEntry`]: an entry kind, a citation id, and an ordered mapping from
//! field name to a list of typed value items.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The twelve BibTeX month macro keys, in calendar order.
pub const MONTH_MACROS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Map a month given as a name ("September"), a macro key ("sep"), or a
/// number ("04") onto the corresponding macro key.
#[must_use]
pub fn month_macro(text: &str) -> Option<&'static str> {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    if let Ok(num) = lowered.parse::<usize>() {
        if (1..=12).contains(&num) {
            return Some(MONTH_MACROS[num - 1]);
        }
        return None;
    }
    for (i, name) in MONTH_NAMES.iter().enumerate() {
        if name.starts_with(&lowered) && lowered.len() >= 3 {
            return Some(MONTH_MACROS[i]);
        }
    }
    None
}

/// Kind of a bibliographic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Article,
    Book,
    InBook,
    InProceedings,
    PhdThesis,
    MastersThesis,
    TechReport,
    Misc,
}

impl EntryKind {
    /// BibTeX type token for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Book => "book",
            Self::InBook => "inbook",
            Self::InProceedings => "inproceedings",
            Self::PhdThesis => "phdthesis",
            Self::MastersThesis => "mastersthesis",
            Self::TechReport => "techreport",
            Self::Misc => "misc",
        }
    }

    /// Parse a BibTeX type token; unknown kinds collapse to `Misc`.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token.to_lowercase().as_str() {
            "article" => Self::Article,
            "book" => Self::Book,
            "inbook" | "incollection" => Self::InBook,
            "inproceedings" | "conference" => Self::InProceedings,
            "phdthesis" => Self::PhdThesis,
            "mastersthesis" => Self::MastersThesis,
            "techreport" => Self::TechReport,
            _ => Self::Misc,
        }
    }
}

/// A person name, split into its components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first: String,
    pub last: String,
    pub suffix: Option<String>,
}

impl Person {
    #[must_use]
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            last: last.into(),
            suffix: None,
        }
    }
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.first.is_empty() {
            write!(f, "{}", self.last)?;
        } else {
            write!(f, "{} {}", self.first, self.last)?;
        }
        if let Some(suffix) = &self.suffix {
            write!(f, " {suffix}")?;
        }
        Ok(())
    }
}

/// One unit of a field's value list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ValueItem {
    /// Free text subject to normalization and case folding by formatters.
    PlainText(String),
    /// Text that must be passed through untouched (DOIs, URLs, ids).
    VerbatimText(String),
    /// A person, used in `author` and `editor` fields.
    Person(Person),
    /// Reference to a macro such as a month key.
    MacroKey(String),
    /// A single keyword.
    Keyword(String),
}

impl ValueItem {
    /// Plain-text rendering of this item.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::PlainText(s) | Self::VerbatimText(s) | Self::MacroKey(s) | Self::Keyword(s) => {
                s.clone()
            }
            Self::Person(p) => p.to_string(),
        }
    }
}

/// Ordered list of value items stored under one field.
pub type Value = Vec<ValueItem>;

/// A single bibliographic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibEntry {
    pub kind: EntryKind,
    pub id: String,
    fields: IndexMap<String, Value>,
}

impl BibEntry {
    pub const TITLE: &'static str = "title";
    pub const AUTHOR: &'static str = "author";
    pub const EDITOR: &'static str = "editor";
    pub const YEAR: &'static str = "year";
    pub const MONTH: &'static str = "month";
    pub const DOI: &'static str = "doi";
    pub const URL: &'static str = "url";
    pub const JOURNAL: &'static str = "journal";
    pub const VOLUME: &'static str = "volume";
    pub const NUMBER: &'static str = "number";
    pub const PAGES: &'static str = "pages";
    pub const ISSN: &'static str = "issn";
    pub const ISBN: &'static str = "isbn";
    pub const PUBLISHER: &'static str = "publisher";
    pub const ABSTRACT: &'static str = "abstract";
    pub const KEYWORDS: &'static str = "keywords";
    pub const CROSSREF: &'static str = "crossref";
    pub const FILE: &'static str = "file";
    pub const LOCALFILE: &'static str = "localfile";
    /// Name of the provider that produced an entry.
    pub const FETCHED_FROM: &'static str = "x-fetchedfrom";

    #[must_use]
    pub fn new(kind: EntryKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            fields: IndexMap::new(),
        }
    }

    /// Replace the value list stored under `field`.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Convenience: store a single plain-text item.
    pub fn set_plain(&mut self, field: impl Into<String>, text: impl Into<String>) {
        self.insert(field, vec![ValueItem::PlainText(text.into())]);
    }

    /// Convenience: store a single verbatim item.
    pub fn set_verbatim(&mut self, field: impl Into<String>, text: impl Into<String>) {
        self.insert(field, vec![ValueItem::VerbatimText(text.into())]);
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Plain-text rendering of a field, items joined by a single space.
    #[must_use]
    pub fn field_text(&self, field: &str) -> String {
        self.fields
            .get(field)
            .map(|value| {
                value
                    .iter()
                    .map(ValueItem::text)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }

    /// First person stored under `author`, if any.
    #[must_use]
    pub fn first_author(&self) -> Option<&Person> {
        self.fields.get(Self::AUTHOR).and_then(|value| {
            value.iter().find_map(|item| match item {
                ValueItem::Person(p) => Some(p),
                _ => None,
            })
        })
    }

    /// Drop every field whose rendering is empty.
    pub fn remove_empty_fields(&mut self) {
        self.fields
            .retain(|_, value| value.iter().any(|item| !item.text().trim().is_empty()));
    }
}
