//! bioRxiv/medRxiv provider: the details API answers with a JSON
//! collection for a DOI; both preprint servers share one wire format.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, EntryKind, ValueItem};
use crate::search::spec_parser::{parse_json_entries, FieldRule, JsonEntrySpec, RuleValue};
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use url::Url;

const API_BASE: &str = "https://api.biorxiv.org/details";

const BIORXIV_SPEC: JsonEntrySpec = JsonEntrySpec {
    collection_pointer: "/collection",
    kind: EntryKind::Article,
    id_pointer: "/doi",
    id_prefix: "",
    fields: &[
        FieldRule {
            field: BibEntry::TITLE,
            path: "/title",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::ABSTRACT,
            path: "/abstract",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::DOI,
            path: "/doi",
            value: RuleValue::Verbatim,
        },
        FieldRule {
            field: "x-authors",
            path: "/authors",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: "x-date",
            path: "/date",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: "x-server",
            path: "/server",
            value: RuleValue::Plain,
        },
    ],
};

pub struct BiorxivSearch {
    http: HttpClient,
}

impl BiorxivSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Reduce the various bioRxiv DOI and URL spellings to the bare DOI.
    fn extract_biorxiv_doi(text: &str) -> Option<String> {
        let start = text.find("10.1101/")?;
        let doi = &text[start..];
        let doi = doi
            .split(|c: char| c.is_whitespace() || c == '"')
            .next()
            .unwrap_or(doi);
        // Strip a trailing version marker such as "v2" (not part of the DOI)
        if let Some(version_pos) = doi.rfind('v') {
            if version_pos > 8 && doi[version_pos + 1..].chars().all(|c| c.is_ascii_digit()) {
                return Some(doi[..version_pos].to_string());
            }
        }
        Some(doi.to_string())
    }

    /// Post-process the raw collection fields: author list, date split,
    /// journal note naming the server.
    fn sanitize(entry: &mut BibEntry) {
        if let Some(authors) = entry.remove("x-authors") {
            let joined = authors
                .iter()
                .map(ValueItem::text)
                .collect::<Vec<_>>()
                .join("; ");
            let persons: Vec<ValueItem> = crate::bibtex::split_names(&joined)
                .into_iter()
                .map(ValueItem::Person)
                .collect();
            if !persons.is_empty() {
                entry.insert(BibEntry::AUTHOR, persons);
            }
        }
        if let Some(date) = entry.remove("x-date") {
            // "YYYY-MM-DD"
            let text = date.first().map(ValueItem::text).unwrap_or_default();
            let mut parts = text.split('-');
            if let Some(year) = parts.next().filter(|y| y.len() == 4) {
                entry.set_plain(BibEntry::YEAR, year);
            }
            if let Some(month_key) = parts.next().and_then(crate::model::month_macro) {
                entry.insert(
                    BibEntry::MONTH,
                    vec![ValueItem::MacroKey(month_key.to_string())],
                );
            }
        }
        if let Some(server) = entry.remove("x-server") {
            let name = server.first().map(ValueItem::text).unwrap_or_default();
            if !name.is_empty() {
                entry.set_plain(BibEntry::JOURNAL, format!("{name} preprint"));
            }
        }
    }
}

#[async_trait]
impl OnlineSearch for BiorxivSearch {
    fn label(&self) -> &'static str {
        "bioRxiv"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://www.biorxiv.org/").expect("static URL is valid")
    }

    async fn execute(
        &self,
        session: &SearchSession,
        query: &SearchQuery,
    ) -> Result<(), SearchError> {
        let doi = query
            .term_strings()
            .into_iter()
            .find_map(Self::extract_biorxiv_doi);
        let Some(doi) = doi else {
            return Err(delayed_stop(SearchError::InvalidArguments(
                "bioRxiv requires a 10.1101/... DOI".to_string(),
            ))
            .await);
        };

        // Both servers answer the same DOI namespace; try bioRxiv first,
        // fall back to medRxiv when the collection is empty
        session.progress_init(2);
        for server in ["biorxiv", "medrxiv"] {
            let url = Url::parse(&format!("{API_BASE}/{server}/{doi}"))
                .map_err(|e| SearchError::Unspecified(e.to_string()))?;
            let response = session.guard(self.http.get(&url, None).await)?;
            session.step();
            let body = session.read_text(response).await?;

            let mut published = false;
            for mut entry in parse_json_entries(&BIORXIV_SPEC, &body)? {
                Self::sanitize(&mut entry);
                published |= session.publish(entry);
            }
            if published {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAILS_SAMPLE: &str = r#"{
      "messages": [{"status": "ok"}],
      "collection": [
        {
          "doi": "10.1101/2023.01.02.522437",
          "title": "A preprint about proteins",
          "authors": "Smith, A.; Jones, B.",
          "date": "2023-01-04",
          "version": 1,
          "category": "biophysics",
          "abstract": "We fold proteins.",
          "server": "biorxiv"
        }
      ]
    }"#;

    #[test]
    fn details_collection_maps_onto_entry() {
        let mut entries = parse_json_entries(&BIORXIV_SPEC, DETAILS_SAMPLE).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &mut entries[0];
        BiorxivSearch::sanitize(entry);
        assert_eq!(entry.id, "10.1101/2023.01.02.522437");
        assert_eq!(entry.field_text(BibEntry::YEAR), "2023");
        assert_eq!(
            entry.get(BibEntry::MONTH).unwrap(),
            &vec![ValueItem::MacroKey("jan".to_string())]
        );
        assert_eq!(entry.field_text(BibEntry::JOURNAL), "biorxiv preprint");
        let authors = entry.get(BibEntry::AUTHOR).unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(entry.first_author().unwrap().last, "Smith");
    }

    #[test]
    fn doi_extraction_handles_urls_and_versions() {
        assert_eq!(
            BiorxivSearch::extract_biorxiv_doi("https://www.biorxiv.org/content/10.1101/2023.01.02.522437v2"),
            Some("10.1101/2023.01.02.522437".to_string())
        );
        assert_eq!(
            BiorxivSearch::extract_biorxiv_doi("10.1101/2023.01.02.522437"),
            Some("10.1101/2023.01.02.522437".to_string())
        );
        assert!(BiorxivSearch::extract_biorxiv_doi("10.1000/182").is_none());
    }
}
