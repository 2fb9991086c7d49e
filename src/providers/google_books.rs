//! Google Books provider: the volumes API, preferring an ISBN lookup when
//! the query contains one.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, EntryKind, ValueItem};
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const API_BASE: &str = "https://www.googleapis.com/books/v1/volumes";
const MAX_RESULTS: u32 = 40;

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: String,
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
}

#[derive(Debug, Deserialize)]
struct VolumeInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default, rename = "publishedDate")]
    published_date: Option<String>,
    #[serde(default, rename = "industryIdentifiers")]
    industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

pub struct GoogleBooksSearch {
    http: HttpClient,
}

impl GoogleBooksSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_query_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let expression = match query.isbn() {
            Some(isbn) => format!("isbn:{isbn}"),
            None => query.term_strings().join(" "),
        };
        let mut url = Url::parse(API_BASE).expect("static URL is valid");
        url.query_pairs_mut()
            .append_pair("q", &expression)
            .append_pair("maxResults", &query.num_results.min(MAX_RESULTS).to_string());
        Ok(url)
    }

    fn convert(volume: Volume) -> BibEntry {
        let info = volume.volume_info;
        let mut entry = BibEntry::new(EntryKind::Book, format!("gbv_{}", volume.id));
        if let Some(title) = info.title {
            let full_title = match info.subtitle {
                Some(subtitle) => format!("{title}: {subtitle}"),
                None => title,
            };
            entry.set_plain(BibEntry::TITLE, full_title);
        }
        let persons: Vec<ValueItem> = info
            .authors
            .iter()
            .map(|name| ValueItem::Person(crate::bibtex::parse_person(name)))
            .collect();
        if !persons.is_empty() {
            entry.insert(BibEntry::AUTHOR, persons);
        }
        if let Some(publisher) = info.publisher {
            entry.set_plain(BibEntry::PUBLISHER, publisher);
        }
        if let Some(date) = info.published_date {
            if let Some(year) = date.split('-').next().filter(|y| y.len() == 4) {
                entry.set_plain(BibEntry::YEAR, year);
            }
        }
        // Prefer the 13-digit identifier when both are listed
        let isbn13 = info
            .industry_identifiers
            .iter()
            .find(|id| id.kind == "ISBN_13");
        let isbn10 = info
            .industry_identifiers
            .iter()
            .find(|id| id.kind == "ISBN_10");
        if let Some(identifier) = isbn13.or(isbn10) {
            entry.set_plain(BibEntry::ISBN, identifier.identifier.clone());
        }
        entry
    }
}

#[async_trait]
impl OnlineSearch for GoogleBooksSearch {
    fn label(&self) -> &'static str {
        "Google Books"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://books.google.com/").expect("static URL is valid")
    }

    async fn execute(
        &self,
        session: &SearchSession,
        query: &SearchQuery,
    ) -> Result<(), SearchError> {
        if query.is_empty() {
            return Err(delayed_stop(SearchError::InvalidArguments(
                "empty query".to_string(),
            ))
            .await);
        }

        session.progress_init(1);
        let url = Self::build_query_url(query)?;
        let response = session.guard(self.http.get(&url, None).await)?;
        session.step();
        let body = session.read_text(response).await?;

        let parsed: VolumesResponse = serde_json::from_str(&body)
            .map_err(|e| SearchError::Unspecified(format!("Google Books parse failure: {e}")))?;
        for volume in parsed.items {
            session.publish(Self::convert(volume));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOLUMES_SAMPLE: &str = r#"{
      "totalItems": 1,
      "items": [
        {
          "id": "zyTCAlFPjgYC",
          "volumeInfo": {
            "title": "The Google Story",
            "authors": ["David A. Vise", "Mark Malseed"],
            "publisher": "Random House Digital",
            "publishedDate": "2005-11-15",
            "industryIdentifiers": [
              {"type": "ISBN_10", "identifier": "055380457X"},
              {"type": "ISBN_13", "identifier": "9780553804577"}
            ]
          }
        }
      ]
    }"#;

    #[test]
    fn volume_converts_to_book_entry() {
        let parsed: VolumesResponse = serde_json::from_str(VOLUMES_SAMPLE).unwrap();
        let entry = GoogleBooksSearch::convert(parsed.items.into_iter().next().unwrap());
        assert_eq!(entry.kind, EntryKind::Book);
        assert_eq!(entry.id, "gbv_zyTCAlFPjgYC");
        assert_eq!(entry.field_text(BibEntry::TITLE), "The Google Story");
        assert_eq!(entry.field_text(BibEntry::YEAR), "2005");
        assert_eq!(entry.field_text(BibEntry::ISBN), "9780553804577");
        assert_eq!(entry.first_author().unwrap().last, "Vise");
    }

    #[test]
    fn isbn_query_uses_isbn_expression() {
        let query = SearchQuery::free_text("978-0-13-110362-7", 5);
        let url = GoogleBooksSearch::build_query_url(&query).unwrap();
        assert!(url.as_str().contains("q=isbn%3A9780131103627"));
    }
}
