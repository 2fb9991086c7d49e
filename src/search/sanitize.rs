//! Post-parse cleanup applied to every entry between the provider parser
//! and emission to the consumer.

use crate::model::{month_macro, BibEntry, ValueItem};
use crate::search::query::doi_regex;
use regex::Regex;
use std::sync::OnceLock;

fn doi_url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"https?://(?:dx\.)?doi\.org/(10\.\d{4,}/[^\s"]+)"#)
            .expect("DOI URL pattern is valid")
    })
}

/// Normalize one entry in place. Field-level failures are resolved by
/// dropping the offending value, never by failing the search.
pub fn sanitize_entry(entry: &mut BibEntry) {
    rename_if_absent(entry, "description", BibEntry::ABSTRACT);

    // zbMATH publishes the full journal name under "fjournal"
    if let Some(fjournal) = entry.remove("fjournal") {
        entry.insert(BibEntry::JOURNAL, fjournal);
    }

    move_doi_urls(entry);
    doi_from_id(entry);

    rename_if_absent(entry, "bookauthor", BibEntry::AUTHOR);

    // A crossref consisting of a single macro key points at an entry that
    // does not exist in a search result list
    if let Some(value) = entry.get(BibEntry::CROSSREF) {
        if matches!(value.as_slice(), [ValueItem::MacroKey(_)]) {
            entry.remove(BibEntry::CROSSREF);
        }
    }

    infer_month_macro(entry);
    entry.remove_empty_fields();
}

/// Attach the provider label after sanitizing; every emitted entry carries
/// exactly one `x-fetchedfrom`.
pub fn stamp_origin(entry: &mut BibEntry, label: &str) {
    entry.insert(
        BibEntry::FETCHED_FROM,
        vec![ValueItem::VerbatimText(label.to_string())],
    );
}

fn rename_if_absent(entry: &mut BibEntry, from: &str, to: &str) {
    if entry.contains(from) && !entry.contains(to) {
        if let Some(value) = entry.remove(from) {
            entry.insert(to, value);
        }
    }
}

/// Move `https://dx.doi.org/<doi>` values out of `url` into `doi`,
/// deduplicating against DOIs already present.
fn move_doi_urls(entry: &mut BibEntry) {
    let Some(url_value) = entry.remove(BibEntry::URL) else {
        return;
    };

    let mut existing_dois: Vec<String> = entry
        .get(BibEntry::DOI)
        .map(|value| value.iter().map(ValueItem::text).collect())
        .unwrap_or_default();
    let mut remaining_urls = Vec::new();
    let mut new_dois = Vec::new();

    for item in url_value {
        let text = item.text();
        if let Some(captures) = doi_url_regex().captures(&text) {
            let doi = captures[1].to_string();
            if !existing_dois.contains(&doi) {
                existing_dois.push(doi.clone());
                new_dois.push(ValueItem::VerbatimText(doi));
            }
        } else {
            remaining_urls.push(item);
        }
    }

    if !remaining_urls.is_empty() {
        entry.insert(BibEntry::URL, remaining_urls);
    }
    if !new_dois.is_empty() {
        let mut doi_value = entry.remove(BibEntry::DOI).unwrap_or_default();
        doi_value.extend(new_dois);
        entry.insert(BibEntry::DOI, doi_value);
    }
}

/// Some providers use the DOI itself as the citation id.
fn doi_from_id(entry: &mut BibEntry) {
    if entry.contains(BibEntry::DOI) {
        return;
    }
    if let Some(m) = doi_regex().find(&entry.id) {
        let doi = m.as_str().to_string();
        entry.insert(BibEntry::DOI, vec![ValueItem::VerbatimText(doi)]);
    }
}

/// Replace a plain-text month by its macro key where possible; otherwise
/// try to isolate a meaningful comma-separated prefix such as a season.
fn infer_month_macro(entry: &mut BibEntry) {
    let Some(value) = entry.get_mut(BibEntry::MONTH) else {
        return;
    };
    for item in value.iter_mut() {
        let ValueItem::PlainText(text) = item else {
            continue;
        };
        if let Some(key) = month_macro(text) {
            *item = ValueItem::MacroKey(key.to_string());
        } else if let Some((prefix, rest)) = text.split_once(',') {
            if !rest.trim().is_empty() && !prefix.trim().is_empty() {
                *item = ValueItem::PlainText(prefix.trim().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;

    fn entry() -> BibEntry {
        BibEntry::new(EntryKind::Article, "test2020")
    }

    #[test]
    fn description_becomes_abstract() {
        let mut e = entry();
        e.set_plain("description", "An abstract.");
        sanitize_entry(&mut e);
        assert_eq!(e.field_text(BibEntry::ABSTRACT), "An abstract.");
        assert!(!e.contains("description"));
    }

    #[test]
    fn fjournal_replaces_journal() {
        let mut e = entry();
        e.set_plain(BibEntry::JOURNAL, "Abbrev. J.");
        e.set_plain("fjournal", "The Full Journal Name");
        sanitize_entry(&mut e);
        assert_eq!(e.field_text(BibEntry::JOURNAL), "The Full Journal Name");
        assert!(!e.contains("fjournal"));
    }

    #[test]
    fn doi_url_moves_into_doi_field() {
        let mut e = entry();
        e.insert(
            BibEntry::URL,
            vec![
                ValueItem::VerbatimText("https://dx.doi.org/10.1000/182".to_string()),
                ValueItem::VerbatimText("https://example.org/paper.pdf".to_string()),
            ],
        );
        sanitize_entry(&mut e);
        assert_eq!(e.field_text(BibEntry::DOI), "10.1000/182");
        assert_eq!(e.field_text(BibEntry::URL), "https://example.org/paper.pdf");
    }

    #[test]
    fn doi_url_deduplicates_against_existing() {
        let mut e = entry();
        e.set_verbatim(BibEntry::DOI, "10.1000/182");
        e.insert(
            BibEntry::URL,
            vec![ValueItem::VerbatimText(
                "https://doi.org/10.1000/182".to_string(),
            )],
        );
        sanitize_entry(&mut e);
        let dois = e.get(BibEntry::DOI).unwrap();
        assert_eq!(dois.len(), 1);
        assert!(!e.contains(BibEntry::URL));
    }

    #[test]
    fn doi_is_taken_from_entry_id() {
        let mut e = BibEntry::new(EntryKind::Misc, "10.1000/182");
        e.set_plain(BibEntry::TITLE, "A title");
        sanitize_entry(&mut e);
        assert_eq!(e.field_text(BibEntry::DOI), "10.1000/182");
    }

    #[test]
    fn lone_macro_crossref_is_dropped() {
        let mut e = entry();
        e.insert(
            BibEntry::CROSSREF,
            vec![ValueItem::MacroKey("someotherentry".to_string())],
        );
        sanitize_entry(&mut e);
        assert!(!e.contains(BibEntry::CROSSREF));
    }

    /// Scenario: month name inference and season prefix isolation.
    #[test]
    fn month_name_becomes_macro_key() {
        let mut e = entry();
        e.set_plain(BibEntry::MONTH, "September");
        sanitize_entry(&mut e);
        assert_eq!(
            e.get(BibEntry::MONTH).unwrap(),
            &vec![ValueItem::MacroKey("sep".to_string())]
        );

        let mut e = entry();
        e.set_plain(BibEntry::MONTH, "Winter, late");
        sanitize_entry(&mut e);
        assert_eq!(
            e.get(BibEntry::MONTH).unwrap(),
            &vec![ValueItem::PlainText("Winter".to_string())]
        );
    }

    #[test]
    fn empty_fields_are_removed() {
        let mut e = entry();
        e.set_plain(BibEntry::TITLE, "Kept");
        e.set_plain(BibEntry::PAGES, "   ");
        sanitize_entry(&mut e);
        assert!(e.contains(BibEntry::TITLE));
        assert!(!e.contains(BibEntry::PAGES));
    }

    #[test]
    fn stamp_origin_sets_fetched_from() {
        let mut e = entry();
        stamp_origin(&mut e, "arXiv.org");
        assert_eq!(e.field_text(BibEntry::FETCHED_FROM), "arXiv.org");
    }

    #[test]
    fn bookauthor_fills_missing_author() {
        let mut e = entry();
        e.insert(
            "bookauthor",
            vec![ValueItem::Person(crate::model::Person::new("A", "B"))],
        );
        sanitize_entry(&mut e);
        assert!(e.contains(BibEntry::AUTHOR));
        assert!(!e.contains("bookauthor"));
    }
}
