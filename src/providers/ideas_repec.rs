//! IDEAS (RePEc) provider: the htsearch CGI delivers an HTML result list;
//! each hit's publication page carries an export form that answers with
//! BibTeX when asked for output format 2.

use super::simple_bibtex::publish_bibtex;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::search::helpers::{form_body, form_parameters};
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;
use url::Url;

const SEARCH_BASE: &str =
    "https://ideas.repec.org/cgi-bin/htsearch?cmd=Search%21&form=extended&m=all&fmt=url&wm=wrd&sp=1&sy=1&dt=range";
const EXPORT_FORM_PREFIX: &str = "<form method=\"post\" action=\"/cgi-bin/refs.cgi\"";
const MAX_RESULTS: u32 = 20;

fn publication_link_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"href="(https?://ideas\.repec\.org/[a-z]/[a-z0-9]+/[a-z0-9]+/[A-Za-z0-9:._-]+\.html)""#)
            .expect("valid pattern")
    })
}

fn year_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^(19|20)[0-9]{2}$").expect("valid pattern"))
}

pub struct IdeasRepecSearch {
    http: HttpClient,
}

impl IdeasRepecSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_query_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let has_free = !query.free_text.trim().is_empty();
        let has_title = !query.title.trim().is_empty();
        let has_author = !query.author.trim().is_empty();
        let has_year = year_regex().is_match(query.year.trim());

        // Search the whole record by default; narrow to one index when only
        // that one field is filled in
        let (field_wf, field_q) = if has_author && !has_free && !has_title {
            ("000F", query.author.trim().to_string())
        } else if !has_author && !has_free && has_title {
            ("00F0", query.title.trim().to_string())
        } else {
            (
                "4BFF",
                format!(
                    "{} {} {}",
                    query.free_text.trim(),
                    query.title.trim(),
                    query.author.trim()
                )
                .trim()
                .to_string(),
            )
        };
        let (field_db, field_de) = if has_year {
            (
                format!("01/01/{}", query.year.trim()),
                format!("31/12/{}", query.year.trim()),
            )
        } else {
            (String::new(), String::new())
        };

        let mut url =
            Url::parse(SEARCH_BASE).map_err(|e| SearchError::Unspecified(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("ps", &query.num_results.min(MAX_RESULTS).to_string())
            .append_pair("db", &field_db)
            .append_pair("de", &field_de)
            .append_pair("q", &field_q)
            .append_pair("wf", field_wf);
        Ok(url)
    }

    /// The ordered list of publication detail links inside the result
    /// page's `<ol>...</ol>`.
    fn extract_publication_links(html: &str, cap: usize) -> Vec<String> {
        let list_start = html.find("<ol>").map_or(0, |p| p);
        let list_end = html[list_start..]
            .find("</ol>")
            .map_or(html.len(), |p| p + list_start);
        let list = &html[list_start..list_end];

        let mut links = Vec::new();
        for captures in publication_link_regex().captures_iter(list) {
            let link = captures[1].to_string();
            if !links.contains(&link) {
                links.push(link);
            }
            if links.len() >= cap {
                break;
            }
        }
        links
    }
}

#[async_trait]
impl OnlineSearch for IdeasRepecSearch {
    fn label(&self) -> &'static str {
        "IDEAS (RePEc)"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://ideas.repec.org/").expect("static URL is valid")
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
        // One list request plus a page fetch and an export per result
        session.progress_init(2 * expected + 1);

        let search_url = Self::build_query_url(query)?;
        let response = session.guard(self.http.get(&search_url, None).await)?;
        session.step();
        let html = session.read_text(response).await?;

        let links = Self::extract_publication_links(&html, expected as usize);
        for link in links {
            let page_url =
                Url::parse(&link).map_err(|e| SearchError::Unspecified(e.to_string()))?;
            let response = session.guard(self.http.get(&page_url, Some(&search_url)).await)?;
            session.step();
            let page_html = session.read_text(response).await?;

            // The publication page embeds an export form whose hidden
            // fields identify the record; output=2 selects BibTeX
            let mut parameters = form_parameters(&page_html, EXPORT_FORM_PREFIX);
            if parameters.is_empty() {
                warn!(url = %page_url, "No export form on IDEAS publication page");
                session.step();
                continue;
            }
            if let Some(output) = parameters.iter_mut().find(|(name, _)| name == "output") {
                output.1 = "2".to_string();
            } else {
                parameters.push(("output".to_string(), "2".to_string()));
            }

            let export_url = page_url
                .join("/cgi-bin/refs.cgi")
                .map_err(|e| SearchError::Unspecified(e.to_string()))?;
            let response = session.guard(
                self.http
                    .post_form(&export_url, form_body(&parameters), Some(&page_url))
                    .await,
            )?;
            session.step();
            let body = session.read_text(response).await?;
            publish_bibtex(session, &body)?;
        }
        Ok(())
    }
}
