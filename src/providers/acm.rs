//! ACM Digital Library provider, a three-step chain:
//! 1. fetch the portal root and extract the quick-search form,
//! 2. submit the search (paging through results if necessary),
//! 3. download one BibTeX export per collected result.

use super::simple_bibtex::fetch_and_publish;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, Value, ValueItem};
use crate::search::helpers::decode_url;
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

const PORTAL_URL: &str = "https://portal.acm.org/";
const RESULTS_PER_PAGE: u32 = 20;
const MAX_PAGES: u32 = 5;

fn result_id_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"citation\.cfm\?id=(\d+)\.(\d+)[^>]*CFID=(\d+)[^>]*CFTOKEN=(\d+)")
            .expect("valid pattern")
    })
}

pub struct AcmPortalSearch {
    http: HttpClient,
}

impl AcmPortalSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Extract the `action` attribute of the quick-search form.
    fn extract_form_action(html: &str) -> Option<String> {
        let form_pos = html.find("<form name=\"qiksearch\"")?;
        let action_pos = html[form_pos..].find("action=").map(|p| p + form_pos)?;
        let value_start = action_pos + "action=\"".len();
        let value_end = html[value_start..].find('"').map(|p| p + value_start)?;
        Some(decode_url(&html[value_start..value_end]))
    }

    /// ACM uses "issue" where the entry model says "number".
    fn sanitize(entry: &mut BibEntry) {
        if let Some(issue) = entry.remove("issue") {
            let value: Value = issue
                .into_iter()
                .map(|item| match item {
                    ValueItem::MacroKey(text) => ValueItem::PlainText(text),
                    other => other,
                })
                .collect();
            entry.insert(BibEntry::NUMBER, value);
        }
    }
}

#[async_trait]
impl OnlineSearch for AcmPortalSearch {
    fn label(&self) -> &'static str {
        "ACM Digital Library"
    }

    fn homepage(&self) -> Url {
        Url::parse(PORTAL_URL).expect("static URL is valid")
    }

    async fn execute(
        &self,
        session: &SearchSession,
        query: &SearchQuery,
    ) -> Result<(), SearchError> {
        let joined_query = query.term_strings().join(" ");
        if joined_query.trim().is_empty() {
            return Err(delayed_stop(SearchError::InvalidArguments(
                "empty query".to_string(),
            ))
            .await);
        }

        let expected = query.num_results;
        session.progress_init(expected + 2);

        // Step 1: the portal root carries the quick-search form
        let portal_url = Url::parse(PORTAL_URL).expect("static URL is valid");
        let response = session.guard(self.http.get(&portal_url, None).await)?;
        session.step();
        let html = session.read_text(response).await?;

        let Some(action) = Self::extract_form_action(&html) else {
            warn!("Could not extract the quick-search form from ACM's start page");
            return Err(SearchError::Unspecified(
                "no quick-search form on ACM start page".to_string(),
            ));
        };
        let search_url = portal_url
            .join(&action)
            .map_err(|e| SearchError::Unspecified(e.to_string()))?;

        // Step 2: submit the search, paging until enough exports are known
        let mut export_urls: Vec<Url> = Vec::new();
        let mut start = 0u32;
        for _page in 0..MAX_PAGES {
            let body = format!("Go=&query={}&start={start}", joined_query.trim())
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let response = session.guard(
                self.http
                    .post_form(&search_url, body, Some(&portal_url))
                    .await,
            )?;
            session.step();
            session.add_steps(1);
            let results_html = session.read_text(response).await?;

            let before = export_urls.len();
            for captures in result_id_regex().captures_iter(&results_html) {
                let export = format!(
                    "https://portal.acm.org/exportformats.cfm?id={}.{}&expformat=bibtex&CFID={}&CFTOKEN={}",
                    &captures[1], &captures[2], &captures[3], &captures[4]
                );
                if let Ok(url) = Url::parse(&export) {
                    if !export_urls.contains(&url) {
                        export_urls.push(url);
                    }
                }
                if export_urls.len() as u32 >= expected {
                    break;
                }
            }

            if export_urls.len() as u32 >= expected || export_urls.len() == before {
                break;
            }
            start += RESULTS_PER_PAGE;
        }
        debug!(count = export_urls.len(), "Collected ACM export URLs");

        // Step 3: download each BibTeX export
        for export_url in export_urls {
            let response = session.guard(self.http.get(&export_url, Some(&search_url)).await)?;
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
    use crate::model::EntryKind;

    #[test]
    fn form_action_is_extracted_and_decoded() {
        let html = r#"<body><form name="qiksearch" action="results.cfm%3Fquery%3Dx" method="post">"#;
        assert_eq!(
            AcmPortalSearch::extract_form_action(html).unwrap(),
            "results.cfm?query=x"
        );
    }

    #[test]
    fn result_ids_with_session_tokens_are_captured() {
        let html = r#"
            <a href="citation.cfm?id=1064830.1064837&coll=ACM&CFID=60279569&CFTOKEN=92809880">Paper one</a>
            <a href="citation.cfm?id=1064830.1064840&coll=ACM&CFID=60279569&CFTOKEN=92809880">Paper two</a>
        "#;
        let ids: Vec<(String, String)> = result_id_regex()
            .captures_iter(html)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ("1064830".to_string(), "1064837".to_string()));
    }

    #[test]
    fn sanitize_renames_issue_to_number() {
        let mut entry = BibEntry::new(EntryKind::Article, "acm1");
        entry.set_plain("issue", "4");
        AcmPortalSearch::sanitize(&mut entry);
        assert!(!entry.contains("issue"));
        assert_eq!(entry.field_text(BibEntry::NUMBER), "4");
    }
}
