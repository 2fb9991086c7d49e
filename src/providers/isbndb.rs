//! ISBNdb provider: book lookups keyed by ISBN or free text, answered in
//! the BookList XML format.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, EntryKind};
use crate::search::spec_parser::{parse_xml_entries, FieldRule, RuleValue, XmlEntrySpec};
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use tracing::warn;
use url::Url;

const API_BASE: &str = "https://isbndb.com/api/books.xml";

const ISBNDB_SPEC: XmlEntrySpec = XmlEntrySpec {
    entry_path: "ISBNdb/BookList/BookData",
    kind: EntryKind::Book,
    id_path: "ISBN",
    id_prefix: "isbn",
    fields: &[
        FieldRule {
            field: BibEntry::TITLE,
            path: "Title",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::AUTHOR,
            path: "Authors/Person",
            value: RuleValue::PersonList { first_path: "" },
        },
        FieldRule {
            field: BibEntry::PUBLISHER,
            path: "PublisherText",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::ISBN,
            path: "ISBN",
            value: RuleValue::Verbatim,
        },
    ],
};

pub struct IsbnDbSearch {
    http: HttpClient,
    access_key: String,
}

impl IsbnDbSearch {
    #[must_use]
    pub fn new(http: HttpClient, access_key: String) -> Self {
        Self { http, access_key }
    }

    fn build_query_url(&self, query: &SearchQuery) -> Result<Url, SearchError> {
        let mut url = Url::parse(API_BASE).expect("static URL is valid");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("access_key", &self.access_key);
            if let Some(isbn) = query.isbn() {
                pairs.append_pair("index1", "isbn");
                pairs.append_pair("value1", &isbn);
            } else {
                pairs.append_pair("index1", "combined");
                pairs.append_pair("value1", &query.term_strings().join(" "));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl OnlineSearch for IsbnDbSearch {
    fn label(&self) -> &'static str {
        "ISBNdb"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://isbndb.com/").expect("static URL is valid")
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
        if self.access_key.is_empty() {
            warn!("ISBNdb has no access key configured");
            return Err(delayed_stop(SearchError::AuthorizationRequired(
                "ISBNdb requires an access key".to_string(),
            ))
            .await);
        }

        session.progress_init(1);
        let url = self.build_query_url(query)?;
        let response = session.guard(self.http.get(&url, None).await)?;
        session.step();
        let body = session.read_text(response).await?;

        let mut published = 0u32;
        for entry in parse_xml_entries(&ISBNDB_SPEC, &body)? {
            if published >= query.num_results {
                break;
            }
            if session.publish(entry) {
                published += 1;
            }
        }
        Ok(())
    }
}
