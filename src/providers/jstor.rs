//! JSTOR provider, a three-step chain:
//! 1. fetch the landing page to collect session cookies (including the
//!    cookie hidden in an HTML `<meta http-equiv="Set-Cookie">` tag),
//! 2. run the basic search and collect per-result DOIs,
//! 3. download one citation export per DOI.
//!
//! JSTOR increasingly demands JavaScript on its result pages; when the
//! response shows the JS bootstrap instead of a result list, the search
//! degrades to `InvalidArguments` rather than scraping garbage.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, ValueItem};
use crate::search::helpers::encode_url;
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;
use url::Url;

const HOME_URL: &str = "https://www.jstor.org/";
const MAX_RESULTS: u32 = 25;

fn result_doi_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"<input[^>]+name="doi"[^>]+value="([^"]+)""#).expect("valid pattern")
    })
}

fn js_wall_markers() -> [&'static str; 3] {
    [
        "enable JavaScript",
        "js-disabled",
        "window.__INITIAL_STATE__",
    ]
}

pub struct JstorSearch {
    http: HttpClient,
}

impl JstorSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_search_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let joined = query.term_strings().join(" ");
        let url = format!(
            "{HOME_URL}action/doBasicSearch?Query={}&acc=off&wc=on",
            encode_url(&joined)
        );
        Url::parse(&url).map_err(|e| SearchError::Unspecified(e.to_string()))
    }

    fn build_citation_url(doi: &str) -> Result<Url, SearchError> {
        let url = format!(
            "{HOME_URL}action/downloadSingleCitation?format=bibtex&include=abs&singleCitation=true&noDoi=yesDoi&doi={}",
            encode_url(doi)
        );
        Url::parse(&url).map_err(|e| SearchError::Unspecified(e.to_string()))
    }

    /// Strip the markup JSTOR leaves in titles and normalize the id.
    fn sanitize(entry: &mut BibEntry) {
        if let Some(value) = entry.get_mut(BibEntry::TITLE) {
            for item in value.iter_mut() {
                if let ValueItem::PlainText(text) = item {
                    *text = text.trim_matches(|c| c == '"' || c == ' ').to_string();
                }
            }
        }
    }
}

#[async_trait]
impl OnlineSearch for JstorSearch {
    fn label(&self) -> &'static str {
        "JSTOR"
    }

    fn homepage(&self) -> Url {
        Url::parse(HOME_URL).expect("static URL is valid")
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
        session.progress_init(expected + 2);

        // Step 1: landing page, session cookies
        let home_url = Url::parse(HOME_URL).expect("static URL is valid");
        let response = session.guard(self.http.get(&home_url, None).await)?;
        session.step();
        let html = session.read_text(response).await?;
        self.http.merge_html_head_cookies(&html, &home_url);

        // Step 2: the search itself
        let search_url = Self::build_search_url(query)?;
        let response = session.guard(self.http.get(&search_url, Some(&home_url)).await)?;
        session.step();
        let results_html = session.read_text(response).await?;

        let mut dois: Vec<String> = Vec::new();
        for captures in result_doi_regex().captures_iter(&results_html) {
            let doi = captures[1].to_string();
            if !dois.contains(&doi) {
                dois.push(doi);
            }
            if dois.len() as u32 >= expected {
                break;
            }
        }

        if dois.is_empty() {
            if js_wall_markers().iter().any(|m| results_html.contains(m)) {
                warn!("JSTOR result page requires JavaScript; cannot proceed without it");
                return Err(SearchError::InvalidArguments(
                    "JSTOR requires JavaScript execution".to_string(),
                ));
            }
            return Ok(());
        }

        // Step 3: citation export per DOI
        for doi in dois {
            let citation_url = Self::build_citation_url(&doi)?;
            let response = session.guard(self.http.get(&citation_url, Some(&search_url)).await)?;
            session.step();
            let body = session.read_text(response).await?;
            for mut entry in crate::bibtex::parse(&body) {
                Self::sanitize(&mut entry);
                session.publish(entry);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_dois_are_collected_from_checkboxes() {
        let html = r#"
            <input type="checkbox" name="doi" value="10.2307/30078535" id="cite1"/>
            <input type="checkbox" name="doi" value="10.2307/20441266" id="cite2"/>
            <input type="checkbox" name="doi" value="10.2307/30078535" id="dup"/>
        "#;
        let dois: Vec<String> = result_doi_regex()
            .captures_iter(html)
            .map(|c| c[1].to_string())
            .collect();
        assert_eq!(dois.len(), 3);
        assert_eq!(dois[0], "10.2307/30078535");
    }

    #[test]
    fn citation_url_embeds_encoded_doi() {
        let url = JstorSearch::build_citation_url("10.2307/30078535").unwrap();
        assert!(url.as_str().contains("format=bibtex"));
        assert!(url.as_str().contains("doi=10.2307%2f30078535"));
    }

    #[test]
    fn js_wall_is_recognized() {
        let html = "<html><body>Please enable JavaScript to continue.</body></html>";
        assert!(js_wall_markers().iter().any(|m| html.contains(m)));
    }
}
