//! Google Scholar provider, a four-step chain: fetch the settings page,
//! submit the preference form asking for BibTeX citation links, run the
//! search, then download every `.bib` link found among the results.

use super::simple_bibtex::fetch_and_publish;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::search::helpers::{encode_url, form_body, form_parameters};
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;
use url::Url;

const SCHOLAR_BASE: &str = "https://scholar.google.com/";
const MAX_RESULTS: u32 = 20;

fn bib_link_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"href="([^"]*scholar\.bib[^"]*)""#).expect("valid pattern")
    })
}

pub struct GoogleScholarSearch {
    http: HttpClient,
}

impl GoogleScholarSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_search_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let joined = query.term_strings().join(" ");
        let url = format!(
            "{SCHOLAR_BASE}scholar?q={}&num={}",
            encode_url(&joined),
            query.num_results.min(MAX_RESULTS)
        );
        Url::parse(&url).map_err(|e| SearchError::Unspecified(e.to_string()))
    }
}

#[async_trait]
impl OnlineSearch for GoogleScholarSearch {
    fn label(&self) -> &'static str {
        "Google Scholar"
    }

    fn homepage(&self) -> Url {
        Url::parse(SCHOLAR_BASE).expect("static URL is valid")
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

        let expected = query.num_results.min(MAX_RESULTS);
        session.progress_init(expected + 3);

        // Step 1: settings page (also the cookie bootstrap)
        let settings_url = Url::parse(&format!("{SCHOLAR_BASE}scholar_settings"))
            .expect("static URL is valid");
        let response = session.guard(self.http.get(&settings_url, None).await)?;
        session.step();
        let settings_html = session.read_text(response).await?;

        // Step 2: persist "show BibTeX citation links" via the prefs form
        let mut parameters = form_parameters(&settings_html, "<form ");
        if parameters.is_empty() {
            warn!("Google Scholar settings page carried no preference form");
        }
        parameters.retain(|(name, _)| name != "scisf");
        parameters.push(("scisf".to_string(), "4".to_string()));
        parameters.push(("save".to_string(), String::new()));
        let prefs_url = Url::parse(&format!("{SCHOLAR_BASE}scholar_setprefs"))
            .expect("static URL is valid");
        let response = session.guard(
            self.http
                .post_form(&prefs_url, form_body(&parameters), Some(&settings_url))
                .await,
        )?;
        session.step();
        session.read_text(response).await?;

        // Step 3: the search itself
        let search_url = Self::build_search_url(query)?;
        let response = session.guard(self.http.get(&search_url, Some(&prefs_url)).await)?;
        session.step();
        let results_html = session.read_text(response).await?;

        // Step 4: one .bib download per hit
        let mut seen: Vec<String> = Vec::new();
        for captures in bib_link_regex().captures_iter(&results_html) {
            if seen.len() as u32 >= expected {
                break;
            }
            let href = captures[1].replace("&amp;", "&");
            if seen.contains(&href) {
                continue;
            }
            seen.push(href.clone());

            let bib_url = search_url
                .join(&href)
                .map_err(|e| SearchError::Unspecified(e.to_string()))?;
            fetch_and_publish(&self.http, session, &bib_url, Some(&search_url)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bib_links_are_found_and_entities_resolved() {
        let html = r#"
            <a href="/scholar.bib?q=info:abc:scholar.google.com/&amp;output=citation">Import into BibTeX</a>
            <a href="/scholar.bib?q=info:def:scholar.google.com/&amp;output=citation">Import into BibTeX</a>
        "#;
        let links: Vec<String> = bib_link_regex()
            .captures_iter(html)
            .map(|c| c[1].replace("&amp;", "&"))
            .collect();
        assert_eq!(links.len(), 2);
        assert!(links[0].contains("output=citation"));
        assert!(!links[0].contains("&amp;"));
    }

    #[test]
    fn search_url_embeds_query_terms() {
        let query = SearchQuery::free_text("deep learning", 10);
        let url = GoogleScholarSearch::build_search_url(&query).unwrap();
        assert!(url.as_str().contains("scholar?q=deep+learning"));
        assert!(url.as_str().contains("num=10"));
    }
}
