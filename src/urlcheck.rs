//! URL checker: a bounded-concurrency verifier that probes every URL
//! referenced by a set of entries and classifies each response.
//!
//! At most four requests are in flight at any time; the remaining URLs
//! wait in a FIFO. Only the first kilobyte of each body is read, enough
//! to compare the filename suffix against the content's magic bytes.

use crate::http::HttpClient;
use crate::model::{BibEntry, ValueItem};
use futures::future::join_all;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};
use url::Url;

/// Ceiling for simultaneous in-flight requests.
const MAX_IN_FLIGHT: usize = 4;
/// How much of each body is inspected.
const PROBE_BYTES: usize = 1024;
/// Trailing completions are coalesced before `Finished` is emitted.
const FINISH_DEBOUNCE: Duration = Duration::from_millis(100);

/// Classification of one checked URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlStatus {
    UrlValid,
    UnexpectedFileType,
    Error404,
    NetworkError,
    UnknownError,
}

/// Events streamed while a check runs.
#[derive(Debug)]
pub enum UrlCheckEvent {
    UrlChecked {
        url: Url,
        status: UrlStatus,
        message: String,
    },
    Finished,
}

pub struct UrlChecker {
    http: HttpClient,
}

impl UrlChecker {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Collect the URLs referenced by `url`, `doi`, and `file`/`localfile`
    /// fields across all entries, deduplicated.
    #[must_use]
    pub fn collect_urls(entries: &[BibEntry]) -> Vec<Url> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        let mut push = |candidate: Option<Url>| {
            if let Some(url) = candidate {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        };

        for entry in entries {
            for field in [BibEntry::URL, BibEntry::FILE, BibEntry::LOCALFILE] {
                if let Some(value) = entry.get(field) {
                    for item in value {
                        push(Url::parse(item.text().trim()).ok());
                    }
                }
            }
            if let Some(value) = entry.get(BibEntry::DOI) {
                for item in value {
                    if let ValueItem::VerbatimText(doi) = item {
                        push(Url::parse(&format!("https://dx.doi.org/{doi}")).ok());
                    }
                }
            }
        }
        urls
    }

    /// Check every URL referenced by the entries. The returned stream
    /// carries one `UrlChecked` per URL and ends with `Finished`.
    #[must_use]
    pub fn start_checking(&self, entries: &[BibEntry]) -> mpsc::UnboundedReceiver<UrlCheckEvent> {
        let urls = Self::collect_urls(entries);
        let (tx, rx) = mpsc::unbounded_channel();
        let http = self.http.clone();

        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
            let mut joins = Vec::new();
            for url in urls {
                let semaphore = Arc::clone(&semaphore);
                let http = http.clone();
                let tx = tx.clone();
                joins.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closes");
                    let (status, message) = check_one(&http, &url).await;
                    match status {
                        UrlStatus::UrlValid => debug!(%url, "UrlValid"),
                        _ => warn!(%url, ?status, message, "URL check flagged a problem"),
                    }
                    let _ = tx.send(UrlCheckEvent::UrlChecked {
                        url,
                        status,
                        message,
                    });
                }));
            }
            join_all(joins).await;
            tokio::time::sleep(FINISH_DEBOUNCE).await;
            let _ = tx.send(UrlCheckEvent::Finished);
        });

        rx
    }
}

async fn check_one(http: &HttpClient, url: &Url) -> (UrlStatus, String) {
    let response = match http.get(url, None).await {
        Ok(response) => response,
        Err(error) => return (UrlStatus::NetworkError, error.to_string()),
    };
    if let Err(error) = response.error_for_status_ref() {
        return (UrlStatus::NetworkError, error.to_string());
    }

    let mut response = response;
    let mut data: Vec<u8> = Vec::with_capacity(PROBE_BYTES);
    while data.len() < PROBE_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => data.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(error) => return (UrlStatus::NetworkError, error.to_string()),
        }
    }
    data.truncate(PROBE_BYTES);

    classify(url, &data)
}

/// Classify a response from its URL's filename suffix and the body's
/// leading bytes.
#[must_use]
pub fn classify(url: &Url, data: &[u8]) -> (UrlStatus, String) {
    if data.is_empty() {
        return (UrlStatus::UnknownError, "No data received".to_string());
    }

    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or_default()
        .to_lowercase();
    let suggests_html =
        filename.is_empty() || filename.ends_with(".html") || filename.ends_with(".htm");
    let suggests_pdf = filename.ends_with(".pdf");
    let suggests_postscript = filename.ends_with(".ps");

    let text = String::from_utf8_lossy(data);
    let contains_html = text.contains("<!DOCTYPE HTML")
        || text.contains("<!DOCTYPE html")
        || text.contains("<html")
        || text.contains("<HTML")
        || text.contains("<body")
        || text.contains("<BODY");
    let contains_pdf = data.starts_with(b"%PDF");
    let contains_postscript = data.starts_with(b"%!");

    static ERROR_404: OnceLock<Regex> = OnceLock::new();
    let error404 = ERROR_404.get_or_init(|| Regex::new(r"\b404\b").expect("valid pattern"));

    if suggests_pdf && contains_pdf {
        (UrlStatus::UrlValid, String::new())
    } else if suggests_postscript && contains_postscript {
        (UrlStatus::UrlValid, String::new())
    } else if contains_html {
        if error404.is_match(&text) {
            (UrlStatus::Error404, "Got error 404".to_string())
        } else if suggests_html {
            (UrlStatus::UrlValid, String::new())
        } else {
            (
                UrlStatus::UnexpectedFileType,
                "Filename's extension does not match content".to_string(),
            )
        }
    } else if suggests_pdf != contains_pdf || suggests_postscript != contains_postscript {
        (
            UrlStatus::UnexpectedFileType,
            "Filename's extension does not match content".to_string(),
        )
    } else {
        (UrlStatus::UrlValid, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    /// Scenario: matching suffix and magic bytes are valid; an HTML body
    /// with a standalone 404 behind a .pdf name is an Error404.
    #[test]
    fn pdf_with_pdf_magic_is_valid() {
        let (status, _) = classify(&url("https://x.org/paper.pdf"), b"%PDF-1.5 rest");
        assert_eq!(status, UrlStatus::UrlValid);
    }

    #[test]
    fn html_with_404_token_is_error404() {
        let (status, message) = classify(
            &url("https://x.org/paper.pdf"),
            b"<!DOCTYPE HTML><html><body>Error 404 - not found</body></html>",
        );
        assert_eq!(status, UrlStatus::Error404);
        assert_eq!(message, "Got error 404");
    }

    #[test]
    fn html_behind_pdf_name_is_unexpected_type() {
        let (status, _) = classify(
            &url("https://x.org/paper.pdf"),
            b"<html><body>This is a landing page</body></html>",
        );
        assert_eq!(status, UrlStatus::UnexpectedFileType);
    }

    #[test]
    fn html_behind_html_name_is_valid() {
        let (status, _) = classify(
            &url("https://x.org/article.html"),
            b"<html><body>content</body></html>",
        );
        assert_eq!(status, UrlStatus::UrlValid);
        // Extension-less URLs also count as HTML-ish
        let (status, _) = classify(&url("https://x.org/"), b"<html></html>");
        assert_eq!(status, UrlStatus::UrlValid);
    }

    #[test]
    fn empty_body_is_unknown_error() {
        let (status, message) = classify(&url("https://x.org/a.pdf"), b"");
        assert_eq!(status, UrlStatus::UnknownError);
        assert_eq!(message, "No data received");
    }

    #[test]
    fn postscript_pairing() {
        let (status, _) = classify(&url("https://x.org/figure.ps"), b"%!PS-Adobe-3.0");
        assert_eq!(status, UrlStatus::UrlValid);
        let (status, _) = classify(&url("https://x.org/figure.ps"), b"plain text");
        assert_eq!(status, UrlStatus::UnexpectedFileType);
    }

    #[test]
    fn urls_are_collected_and_deduplicated() {
        let mut first = BibEntry::new(EntryKind::Article, "a1");
        first.set_verbatim(BibEntry::URL, "https://example.org/a.pdf");
        first.set_verbatim(BibEntry::DOI, "10.1000/182");
        let mut second = BibEntry::new(EntryKind::Article, "a2");
        second.set_verbatim(BibEntry::URL, "https://example.org/a.pdf");

        let urls = UrlChecker::collect_urls(&[first, second]);
        assert_eq!(urls.len(), 2);
        assert!(urls
            .iter()
            .any(|u| u.as_str() == "https://dx.doi.org/10.1000/182"));
    }

    #[tokio::test]
    async fn empty_bibliography_finishes_immediately() {
        let checker = UrlChecker::new(HttpClient::new().unwrap());
        let mut rx = checker.start_checking(&[]);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, UrlCheckEvent::Finished));
    }
}
