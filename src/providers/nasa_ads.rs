//! NASA ADS provider: a two-step chain: the search API resolves the query
//! to bibcodes, the export API renders them as BibTeX.

use super::simple_bibtex::publish_bibtex;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use url::Url;

const SEARCH_URL: &str = "https://api.adsabs.harvard.edu/v1/search/query";
const EXPORT_URL: &str = "https://api.adsabs.harvard.edu/v1/export/bibtex";
const MAX_RESULTS: u32 = 25;

#[derive(Debug, Deserialize)]
struct AdsSearchResponse {
    response: AdsResponseBody,
}

#[derive(Debug, Deserialize)]
struct AdsResponseBody {
    #[serde(default)]
    docs: Vec<AdsDoc>,
}

#[derive(Debug, Deserialize)]
struct AdsDoc {
    #[serde(default)]
    bibcode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdsExportResponse {
    export: String,
}

pub struct NasaAdsSearch {
    http: HttpClient,
    api_token: String,
}

impl NasaAdsSearch {
    #[must_use]
    pub fn new(http: HttpClient, api_token: String) -> Self {
        Self { http, api_token }
    }

    fn build_search_url(&self, query: &SearchQuery) -> Result<Url, SearchError> {
        let mut clauses = Vec::new();
        let title = query.get(QueryKey::Title).trim();
        if !title.is_empty() {
            clauses.push(format!("title:\"{title}\""));
        }
        let author = query.get(QueryKey::Author).trim();
        if !author.is_empty() {
            clauses.push(format!("author:\"{author}\""));
        }
        let year = query.get(QueryKey::Year).trim();
        if !year.is_empty() {
            clauses.push(format!("year:{year}"));
        }
        let free = query.get(QueryKey::FreeText).trim();
        if !free.is_empty() {
            clauses.push(free.to_string());
        }

        let mut url = Url::parse(SEARCH_URL).expect("static URL is valid");
        url.query_pairs_mut()
            .append_pair("q", &clauses.join(" "))
            .append_pair("fl", "bibcode")
            .append_pair("rows", &query.num_results.min(MAX_RESULTS).to_string());
        Ok(url)
    }
}

#[async_trait]
impl OnlineSearch for NasaAdsSearch {
    fn label(&self) -> &'static str {
        "NASA ADS"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://ui.adsabs.harvard.edu/").expect("static URL is valid")
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
        if self.api_token.is_empty() {
            warn!("NASA ADS has no API token configured");
            return Err(delayed_stop(SearchError::AuthorizationRequired(
                "NASA ADS requires an API token".to_string(),
            ))
            .await);
        }

        session.progress_init(2);

        // Step 1: resolve the query to bibcodes
        let search_url = self.build_search_url(query)?;
        let request = self
            .http
            .inner()
            .get(search_url.clone())
            .bearer_auth(&self.api_token)
            .timeout(crate::http::DEFAULT_TIMEOUT);
        let response = session.guard(request.send().await)?;
        session.step();
        let body = session.read_text(response).await?;
        let parsed: AdsSearchResponse = serde_json::from_str(&body)
            .map_err(|e| SearchError::Unspecified(format!("ADS search parse failure: {e}")))?;

        let bibcodes: Vec<String> = parsed
            .response
            .docs
            .into_iter()
            .filter_map(|doc| doc.bibcode)
            .collect();
        if bibcodes.is_empty() {
            return Ok(());
        }

        // Step 2: export the bibcodes as BibTeX
        let export_url = Url::parse(EXPORT_URL).expect("static URL is valid");
        let payload = json!({ "bibcode": bibcodes });
        let response = session.guard(
            self.http
                .post_json(&export_url, &payload, Some(&self.api_token))
                .await,
        )?;
        session.step();
        let body = session.read_text(response).await?;
        let export: AdsExportResponse = serde_json::from_str(&body)
            .map_err(|e| SearchError::Unspecified(format!("ADS export parse failure: {e}")))?;

        publish_bibtex(session, &export.export)?;
        Ok(())
    }
}
