//! zbMATH Open provider: OAI-PMH preview records mapped onto entries with a
//! declarative rule table.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, EntryKind};
use crate::search::spec_parser::{parse_xml_entries, FieldRule, RuleValue, XmlEntrySpec};
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use url::Url;

const API_BASE: &str = "https://oai.zbmath.org/v1/";

/// Mapping for `zbmath` preview records inside an OAI `ListRecords`
/// response. The `fjournal`/`journal` split is resolved by the sanitizer.
const ZBMATH_SPEC: XmlEntrySpec = XmlEntrySpec {
    entry_path: "OAI-PMH/ListRecords/record/metadata/zbmath",
    kind: EntryKind::Article,
    id_path: "document_id",
    id_prefix: "zbMATH",
    fields: &[
        FieldRule {
            field: BibEntry::TITLE,
            path: "document_title",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::AUTHOR,
            path: "author",
            value: RuleValue::PersonList { first_path: "" },
        },
        FieldRule {
            field: BibEntry::YEAR,
            path: "publication_year",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: "fjournal",
            path: "serial_title",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::PAGES,
            path: "pagination",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::DOI,
            path: "doi",
            value: RuleValue::Verbatim,
        },
        FieldRule {
            field: BibEntry::KEYWORDS,
            path: "keywords/keyword",
            value: RuleValue::Keywords,
        },
        FieldRule {
            field: "zbl",
            path: "zbl_id",
            value: RuleValue::Verbatim,
        },
    ],
};

pub struct ZbMathSearch {
    http: HttpClient,
}

impl ZbMathSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_query_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let mut url = Url::parse(API_BASE).expect("static URL is valid");
        let terms = query.term_strings().join(" ");
        url.query_pairs_mut()
            .append_pair("verb", "ListRecords")
            .append_pair("metadataPrefix", "oai_zb_preview")
            .append_pair("set", "search")
            .append_pair("search_string", &terms);
        Ok(url)
    }
}

#[async_trait]
impl OnlineSearch for ZbMathSearch {
    fn label(&self) -> &'static str {
        "zbMATH"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://zbmath.org/").expect("static URL is valid")
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

        let mut published = 0u32;
        for entry in parse_xml_entries(&ZBMATH_SPEC, &body)? {
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
