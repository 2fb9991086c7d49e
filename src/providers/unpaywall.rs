//! Unpaywall provider: DOI lookup against the v2 API, which requires a
//! contact email and answers with open-access location data.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, EntryKind, Person, ValueItem};
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const API_BASE: &str = "https://api.unpaywall.org/v2";
const DEFAULT_EMAIL: &str = "unpaywall@impactstory.org";

#[derive(Debug, Deserialize)]
struct UnpaywallRecord {
    doi: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    journal_name: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    z_authors: Vec<UnpaywallAuthor>,
    #[serde(default)]
    best_oa_location: Option<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct UnpaywallAuthor {
    #[serde(default)]
    given: Option<String>,
    #[serde(default)]
    family: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    #[serde(default)]
    url_for_pdf: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct UnpaywallSearch {
    http: HttpClient,
    email: String,
}

impl UnpaywallSearch {
    #[must_use]
    pub fn new(http: HttpClient, email: String) -> Self {
        let email = if email.is_empty() {
            DEFAULT_EMAIL.to_string()
        } else {
            email
        };
        Self { http, email }
    }

    fn build_lookup_url(&self, doi: &str) -> Result<Url, SearchError> {
        let mut url = Url::parse(&format!("{API_BASE}/{doi}"))
            .map_err(|e| SearchError::Unspecified(e.to_string()))?;
        url.query_pairs_mut().append_pair("email", &self.email);
        Ok(url)
    }

    fn convert(record: UnpaywallRecord) -> BibEntry {
        let mut entry = BibEntry::new(EntryKind::Article, record.doi.clone());
        entry.set_verbatim(BibEntry::DOI, record.doi);
        if let Some(title) = record.title {
            entry.set_plain(BibEntry::TITLE, title);
        }
        if let Some(journal) = record.journal_name {
            entry.set_plain(BibEntry::JOURNAL, journal);
        }
        if let Some(publisher) = record.publisher {
            entry.set_plain(BibEntry::PUBLISHER, publisher);
        }
        if let Some(year) = record.year {
            entry.set_plain(BibEntry::YEAR, year.to_string());
        }
        let persons: Vec<ValueItem> = record
            .z_authors
            .into_iter()
            .filter_map(|author| match (author.given, author.family) {
                (Some(given), Some(family)) => Some(Person::new(given, family)),
                (None, Some(family)) => Some(Person::new("", family)),
                _ => None,
            })
            .map(ValueItem::Person)
            .collect();
        if !persons.is_empty() {
            entry.insert(BibEntry::AUTHOR, persons);
        }
        if let Some(location) = record.best_oa_location {
            if let Some(pdf) = location.url_for_pdf.or(location.url) {
                entry.set_verbatim(BibEntry::URL, pdf);
            }
        }
        entry
    }
}

#[async_trait]
impl OnlineSearch for UnpaywallSearch {
    fn label(&self) -> &'static str {
        "Unpaywall"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://unpaywall.org/").expect("static URL is valid")
    }

    async fn execute(
        &self,
        session: &SearchSession,
        query: &SearchQuery,
    ) -> Result<(), SearchError> {
        let Some(doi) = query.doi() else {
            return Err(delayed_stop(SearchError::InvalidArguments(
                "query contains no DOI".to_string(),
            ))
            .await);
        };

        session.progress_init(1);
        let url = self.build_lookup_url(doi)?;
        let response = session.guard(self.http.get(&url, None).await)?;
        session.step();
        let body = session.read_text(response).await?;

        let record: UnpaywallRecord = serde_json::from_str(&body)
            .map_err(|e| SearchError::Unspecified(format!("Unpaywall parse failure: {e}")))?;
        session.publish(Self::convert(record));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD_SAMPLE: &str = r#"{
      "doi": "10.1038/nature12373",
      "title": "Nanometre-scale thermometry in a living cell",
      "journal_name": "Nature",
      "publisher": "Springer Nature",
      "year": 2013,
      "z_authors": [
        {"given": "Georg", "family": "Kucsko"},
        {"given": "Peter", "family": "Maurer"}
      ],
      "best_oa_location": {"url_for_pdf": "https://europepmc.org/articles/pmc4221854?pdf=render"}
    }"#;

    #[test]
    fn record_converts_to_entry() {
        let record: UnpaywallRecord = serde_json::from_str(RECORD_SAMPLE).unwrap();
        let entry = UnpaywallSearch::convert(record);
        assert_eq!(entry.id, "10.1038/nature12373");
        assert_eq!(entry.field_text(BibEntry::JOURNAL), "Nature");
        assert_eq!(entry.field_text(BibEntry::YEAR), "2013");
        assert_eq!(entry.first_author().unwrap().last, "Kucsko");
        assert!(entry.field_text(BibEntry::URL).contains("europepmc"));
    }

    #[test]
    fn lookup_url_carries_email_and_redacts() {
        let engine = UnpaywallSearch::new(HttpClient::new().unwrap(), String::new());
        let url = engine.build_lookup_url("10.1038/nature12373").unwrap();
        assert!(url.as_str().contains("email="));
        assert!(!crate::http::remove_api_key(&url).contains("impactstory"));
    }
}
