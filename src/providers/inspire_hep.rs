//! Inspire-HEP provider: the literature API answers directly in BibTeX
//! when asked via the `format` parameter.

use super::simple_bibtex::fetch_and_publish;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::search::helpers::split_respecting_quotation_marks;
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use url::Url;

const API_BASE: &str = "https://inspirehep.net/api/literature";
const MAX_RESULTS: u32 = 25;

pub struct InspireHepSearch {
    http: HttpClient,
}

impl InspireHepSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_query_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let mut clauses = Vec::new();
        for term in split_respecting_quotation_marks(query.get(QueryKey::FreeText)) {
            clauses.push(term);
        }
        for term in split_respecting_quotation_marks(query.get(QueryKey::Title)) {
            clauses.push(format!("t {term}"));
        }
        for term in split_respecting_quotation_marks(query.get(QueryKey::Author)) {
            clauses.push(format!("a {term}"));
        }
        let year = query.get(QueryKey::Year).trim();
        if !year.is_empty() {
            clauses.push(format!("d {year}"));
        }

        let mut url = Url::parse(API_BASE).expect("static URL is valid");
        url.query_pairs_mut()
            .append_pair("q", &clauses.join(" and "))
            .append_pair("sort", "mostrecent")
            .append_pair("size", &query.num_results.min(MAX_RESULTS).to_string())
            .append_pair("format", "bibtex");
        Ok(url)
    }
}

#[async_trait]
impl OnlineSearch for InspireHepSearch {
    fn label(&self) -> &'static str {
        "Inspire-HEP"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://inspirehep.net/").expect("static URL is valid")
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
        fetch_and_publish(&self.http, session, &url, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_url_uses_spires_style_clauses() {
        let mut query = SearchQuery::default();
        query.set(QueryKey::Title, "neutrino");
        query.set(QueryKey::Author, "Fukuda");
        query.num_results = 10;
        let url = InspireHepSearch::build_query_url(&query).unwrap();
        let text = url.as_str();
        assert!(text.contains("q=t+neutrino+and+a+Fukuda"));
        assert!(text.contains("format=bibtex"));
        assert!(text.contains("size=10"));
    }

    #[test]
    fn result_cap_is_applied() {
        let query = SearchQuery::free_text("higgs", 500);
        let url = InspireHepSearch::build_query_url(&query).unwrap();
        assert!(url.as_str().contains("size=25"));
    }
}
