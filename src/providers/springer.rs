//! SpringerLink provider: the Springer Nature metadata API delivers PAM
//! (PRISM aggregator message) XML; one record per article.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, EntryKind};
use crate::search::spec_parser::{parse_xml_entries, FieldRule, RuleValue, XmlEntrySpec};
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use tracing::warn;
use url::Url;

const API_BASE: &str = "https://api.springernature.com/metadata/pam";
const MAX_RESULTS: u32 = 25;

const SPRINGER_SPEC: XmlEntrySpec = XmlEntrySpec {
    entry_path: "response/records/message/xhtml/head",
    kind: EntryKind::Article,
    id_path: "article/doi",
    id_prefix: "",
    fields: &[
        FieldRule {
            field: BibEntry::TITLE,
            path: "article/title",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::AUTHOR,
            path: "article/creator",
            value: RuleValue::PersonList { first_path: "" },
        },
        FieldRule {
            field: BibEntry::JOURNAL,
            path: "article/publicationName",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::DOI,
            path: "article/doi",
            value: RuleValue::Verbatim,
        },
        FieldRule {
            field: BibEntry::VOLUME,
            path: "article/volume",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::NUMBER,
            path: "article/number",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::ISSN,
            path: "article/issn",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::PUBLISHER,
            path: "article/publisher",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::ABSTRACT,
            path: "article/abstract",
            value: RuleValue::Plain,
        },
    ],
};

pub struct SpringerLinkSearch {
    http: HttpClient,
    api_key: String,
}

impl SpringerLinkSearch {
    #[must_use]
    pub fn new(http: HttpClient, api_key: String) -> Self {
        Self { http, api_key }
    }

    fn build_query_url(&self, query: &SearchQuery) -> Result<Url, SearchError> {
        let mut clauses = Vec::new();
        let title = query.get(QueryKey::Title).trim();
        if !title.is_empty() {
            clauses.push(format!("title:\"{title}\""));
        }
        let author = query.get(QueryKey::Author).trim();
        if !author.is_empty() {
            clauses.push(format!("name:\"{author}\""));
        }
        let year = query.get(QueryKey::Year).trim();
        if !year.is_empty() {
            clauses.push(format!("year:{year}"));
        }
        let free = query.get(QueryKey::FreeText).trim();
        if !free.is_empty() {
            clauses.push(free.to_string());
        }

        let mut url = Url::parse(API_BASE).expect("static URL is valid");
        url.query_pairs_mut()
            .append_pair("q", &clauses.join(" AND "))
            .append_pair("p", &query.num_results.min(MAX_RESULTS).to_string())
            .append_pair("api_key", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl OnlineSearch for SpringerLinkSearch {
    fn label(&self) -> &'static str {
        "SpringerLink"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://link.springer.com/").expect("static URL is valid")
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
        if self.api_key.is_empty() {
            warn!("SpringerLink has no API key configured");
            return Err(delayed_stop(SearchError::AuthorizationRequired(
                "SpringerLink requires an API key".to_string(),
            ))
            .await);
        }

        session.progress_init(1);
        let url = self.build_query_url(query)?;
        let response = session.guard(self.http.get(&url, None).await)?;
        session.step();
        let body = session.read_text(response).await?;

        for entry in parse_xml_entries(&SPRINGER_SPEC, &body)? {
            session.publish(entry);
        }
        Ok(())
    }
}
