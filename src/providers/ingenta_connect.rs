//! IngentaConnect provider: a search request followed by one BibTeX export
//! per hit found on the result page.

use super::simple_bibtex::fetch_and_publish;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::search::helpers::{encode_url, split_respecting_quotation_marks};
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

const BASE_URL: &str = "https://www.ingentaconnect.com";
const MAX_RESULTS: u32 = 25;

fn article_link_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"href="(/content/[a-z0-9/.;_-]+art\d+)[";]"#).expect("valid pattern")
    })
}

pub struct IngentaConnectSearch {
    http: HttpClient,
}

impl IngentaConnectSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_query_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let mut clauses = Vec::new();
        let add = |clauses: &mut Vec<String>, field: &str, text: &str| {
            for term in split_respecting_quotation_marks(text) {
                clauses.push(format!("{field}:{}", encode_url(term.trim_matches('"'))));
            }
        };
        add(&mut clauses, "title", query.get(QueryKey::Title));
        add(&mut clauses, "author", query.get(QueryKey::Author));
        let free: Vec<String> = split_respecting_quotation_marks(query.get(QueryKey::FreeText))
            .iter()
            .map(|t| encode_url(t.trim_matches('"')))
            .collect();
        if !free.is_empty() {
            clauses.push(free.join("+"));
        }

        let url = format!(
            "{BASE_URL}/search?format=bib&pageSize={}&value1={}&option1=tka",
            query.num_results.min(MAX_RESULTS),
            clauses.join("+AND+")
        );
        Url::parse(&url).map_err(|e| SearchError::Unspecified(e.to_string()))
    }
}

#[async_trait]
impl OnlineSearch for IngentaConnectSearch {
    fn label(&self) -> &'static str {
        "IngentaConnect"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://www.ingentaconnect.com/").expect("static URL is valid")
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

        let search_url = Self::build_query_url(query)?;
        session.progress_init(1 + query.num_results.min(MAX_RESULTS));

        let response = session.guard(self.http.get(&search_url, None).await)?;
        session.step();
        let html = session.read_text(response).await?;

        let mut article_paths: Vec<String> = Vec::new();
        for captures in article_link_regex().captures_iter(&html) {
            let path = captures[1].to_string();
            if !article_paths.contains(&path) {
                article_paths.push(path);
            }
            if article_paths.len() as u32 >= query.num_results.min(MAX_RESULTS) {
                break;
            }
        }

        for path in article_paths {
            let export_url = Url::parse(&format!("{BASE_URL}{path}?format=bib"))
                .map_err(|e| SearchError::Unspecified(e.to_string()))?;
            fetch_and_publish(&self.http, session, &export_url, Some(&search_url)).await?;
        }
        Ok(())
    }
}
