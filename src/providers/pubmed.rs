//! PubMed provider: a two-step eSearch → eFetch chain against the NCBI
//! E-utilities, with the article XML mapped onto entries by a declarative
//! rule table.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, EntryKind};
use crate::search::helpers::split_respecting_quotation_marks;
use crate::search::spec_parser::{parse_xml_entries, FieldRule, RuleValue, XmlEntrySpec};
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use roxmltree::Document;
use tracing::debug;
use url::Url;

const EUTILS_PREFIX: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/";
const MAX_RESULTS: u32 = 50;

/// Field mapping for one `<PubmedArticle>`.
const PUBMED_SPEC: XmlEntrySpec = XmlEntrySpec {
    entry_path: "PubmedArticleSet/PubmedArticle",
    kind: EntryKind::Article,
    id_path: "MedlineCitation/PMID",
    id_prefix: "pmid",
    fields: &[
        FieldRule {
            field: BibEntry::TITLE,
            path: "MedlineCitation/Article/ArticleTitle",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::ABSTRACT,
            path: "MedlineCitation/Article/Abstract/AbstractText",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::JOURNAL,
            path: "MedlineCitation/Article/Journal/Title",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::ISSN,
            path: "MedlineCitation/Article/Journal/ISSN",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::VOLUME,
            path: "MedlineCitation/Article/Journal/JournalIssue/Volume",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::NUMBER,
            path: "MedlineCitation/Article/Journal/JournalIssue/Issue",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::PAGES,
            path: "MedlineCitation/Article/Pagination/MedlinePgn",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::YEAR,
            path: "MedlineCitation/Article/ArticleDate/Year",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::MONTH,
            path: "MedlineCitation/Article/ArticleDate/Month",
            value: RuleValue::MonthMacro,
        },
        FieldRule {
            field: BibEntry::AUTHOR,
            path: "MedlineCitation/Article/AuthorList/Author/LastName",
            value: RuleValue::PersonList {
                first_path: "MedlineCitation/Article/AuthorList/Author/ForeName",
            },
        },
        FieldRule {
            field: BibEntry::DOI,
            path: "PubmedData/ArticleIdList/ArticleId[@IdType=doi]",
            value: RuleValue::Verbatim,
        },
        FieldRule {
            field: "pmid",
            path: "PubmedData/ArticleIdList/ArticleId[@IdType=pubmed]",
            value: RuleValue::Verbatim,
        },
        FieldRule {
            field: "pii",
            path: "PubmedData/ArticleIdList/ArticleId[@IdType=pii]",
            value: RuleValue::Verbatim,
        },
    ],
};

pub struct PubMedSearch {
    http: HttpClient,
}

impl PubMedSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_search_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let mut fragments = Vec::new();
        for word in split_respecting_quotation_marks(query.get(QueryKey::FreeText)) {
            // Bare PMIDs search all fields on their own
            let qualifier = if word.chars().all(|c| c.is_ascii_digit()) {
                ""
            } else {
                "[All Fields]"
            };
            fragments.push(format!("{word}{qualifier}"));
        }
        for word in split_respecting_quotation_marks(query.get(QueryKey::Year)) {
            fragments.push(word);
        }
        for word in split_respecting_quotation_marks(query.get(QueryKey::Title)) {
            fragments.push(format!("{word}[Title]"));
        }
        for word in split_respecting_quotation_marks(query.get(QueryKey::Author)) {
            fragments.push(format!("{word}[Author]"));
        }

        let term = fragments.join("+AND+").replace('"', "%22");
        let num_results = query.num_results.min(MAX_RESULTS);
        let url = format!(
            "{EUTILS_PREFIX}esearch.fcgi?db=pubmed&tool=bibfetch&term={term}&retstart=0&retmax={num_results}&retmode=xml"
        );
        Url::parse(&url).map_err(|e| SearchError::Unspecified(e.to_string()))
    }

    fn build_fetch_url(ids: &[String]) -> Result<Url, SearchError> {
        let url = format!(
            "{EUTILS_PREFIX}efetch.fcgi?retmode=xml&db=pubmed&id={}",
            ids.join(",")
        );
        Url::parse(&url).map_err(|e| SearchError::Unspecified(e.to_string()))
    }
}

#[async_trait]
impl OnlineSearch for PubMedSearch {
    fn label(&self) -> &'static str {
        "PubMed"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://www.pubmed.gov/").expect("static URL is valid")
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

        session.progress_init(2);

        // Step 1: eSearch resolves the query to PMIDs
        let search_url = Self::build_search_url(query)?;
        let response = session.guard(self.http.get(&search_url, None).await)?;
        session.step();
        let body = session.read_text(response).await?;

        if body.contains("<Count>0</Count>") {
            // PubMed itself says the search has no hits
            return Ok(());
        }
        let ids = extract_id_list(&body)?;
        if ids.is_empty() {
            return Err(SearchError::Unspecified(
                "eSearch response listed no PubMed ids".to_string(),
            ));
        }
        debug!(count = ids.len(), "PubMed eSearch returned ids");

        // Step 2: eFetch delivers the article XML for all ids at once
        let fetch_url = Self::build_fetch_url(&ids)?;
        let response = session.guard(self.http.get(&fetch_url, Some(&search_url)).await)?;
        session.step();
        let body = session.read_text(response).await?;

        for entry in parse_xml_entries(&PUBMED_SPEC, &body)? {
            session.publish(entry);
        }
        Ok(())
    }
}

/// Pull every `<Id>` out of an eSearch response.
fn extract_id_list(xml: &str) -> Result<Vec<String>, SearchError> {
    let document = Document::parse(xml)
        .map_err(|e| SearchError::Unspecified(format!("eSearch parse failure: {e}")))?;
    Ok(document
        .descendants()
        .filter(|n| n.has_tag_name("IdList"))
        .flat_map(|list| {
            list.children()
                .filter(|n| n.has_tag_name("Id"))
                .filter_map(|n| n.text())
                .map(|t| t.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|id| !id.is_empty())
        .collect())
}
