//! Favicon locator: a chained lookup for a site's icon, backed by an
//! on-disk cache with a 90-day expiry.
//!
//! The lookup is a LIFO stack of typed URLs. The cache check runs first;
//! then the suggested icon URL (if any), the website's HTML `<link
//! rel=icon>`, and the default `/favicon.ico` are tried in turn. Fetched
//! icons are sniffed by magic bytes before being cached.

use crate::http::{remove_api_key, HttpClient};
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Cached icons older than this are discarded and refetched.
const CACHE_MAX_AGE_DAYS: i64 = 90;
/// Icon markup is assumed to sit within the first 16 KiB of a page.
const HTML_SCAN_LIMIT: usize = 16 * 1024;
/// Debounce before reporting a located icon.
const EMIT_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
enum TypedUrl {
    Cache,
    FavIcon(Url),
    Website(Url),
}

pub struct FavIconLocator {
    http: HttpClient,
    cache_dir: PathBuf,
}

impl FavIconLocator {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("bibfetch")
            .join("favicons");
        Self { http, cache_dir }
    }

    /// Override the cache directory (used by tests).
    #[must_use]
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = dir;
        self
    }

    /// Locate the icon for `webpage_url`, optionally trying a suggested
    /// icon URL first. Returns the path of the cached icon file, or `None`
    /// when every method is exhausted.
    pub async fn locate(
        &self,
        webpage_url: &Url,
        suggested_favicon_url: Option<&Url>,
    ) -> Option<PathBuf> {
        if tokio::fs::create_dir_all(&self.cache_dir).await.is_err() {
            warn!(dir = %self.cache_dir.display(), "Cannot create favicon cache directory");
            return None;
        }
        let stem = self.file_name_stem(webpage_url);

        let mut stack: Vec<TypedUrl> = Vec::new();
        let mut default_icon_url = webpage_url.clone();
        default_icon_url.set_path("/favicon.ico");
        default_icon_url.set_query(None);
        stack.push(TypedUrl::FavIcon(default_icon_url));
        stack.push(TypedUrl::Website(webpage_url.clone()));
        if let Some(suggested) = suggested_favicon_url {
            stack.push(TypedUrl::FavIcon(suggested.clone()));
        }
        stack.push(TypedUrl::Cache);

        while let Some(current) = stack.pop() {
            match current {
                TypedUrl::Cache => {
                    if let Some(path) = self.check_cache(&stem).await {
                        tokio::time::sleep(EMIT_DELAY).await;
                        return Some(path);
                    }
                }
                TypedUrl::FavIcon(url) => {
                    if let Some(path) = self.fetch_icon(&url, &stem).await {
                        tokio::time::sleep(EMIT_DELAY).await;
                        return Some(path);
                    }
                }
                TypedUrl::Website(url) => {
                    if let Some(found) = self.scan_website(&url).await {
                        stack.push(TypedUrl::FavIcon(found));
                    }
                }
            }
        }

        warn!(
            url = %remove_api_key(webpage_url),
            "All methods to locate favicon exhausted, giving up"
        );
        None
    }

    /// Locate the icon of a search provider, trying the provider's own
    /// favicon URL before falling back to its homepage.
    pub async fn locate_for_engine(
        &self,
        engine: &dyn crate::search::OnlineSearch,
    ) -> Option<PathBuf> {
        let suggested = engine.favicon_url();
        self.locate(&engine.homepage(), Some(&suggested)).await
    }

    /// Cache file name: host and path reduced to a safe character set.
    fn file_name_stem(&self, url: &Url) -> PathBuf {
        let reduced: String = url
            .as_str()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        self.cache_dir.join(reduced)
    }

    async fn check_cache(&self, stem: &Path) -> Option<PathBuf> {
        for extension in ["png", "ico"] {
            let path = stem.with_extension(extension);
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };
            let age_days = metadata
                .modified()
                .ok()
                .map_or(i64::MAX, |modified| {
                    let modified: chrono::DateTime<chrono::Utc> = modified.into();
                    (chrono::Utc::now() - modified).num_days()
                });
            if age_days > CACHE_MAX_AGE_DAYS {
                // Expired; delete and fetch a current one
                let _ = tokio::fs::remove_file(&path).await;
            } else {
                debug!(file = %path.display(), "Found cached favicon");
                return Some(path);
            }
        }
        None
    }

    /// Download a candidate icon; keep it only when the first bytes look
    /// like PNG or ICO data.
    async fn fetch_icon(&self, url: &Url, stem: &Path) -> Option<PathBuf> {
        debug!(url = %remove_api_key(url), "Requesting favicon URL");
        let response = self.http.get(url, None).await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let data = response.bytes().await.ok()?;
        if data.len() <= 10 {
            warn!(url = %remove_api_key(url), "Received invalid favicon data");
            return None;
        }

        let extension = if data.len() > 4 && &data[1..4] == b"PNG" {
            "png"
        } else if data.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
            "ico"
        } else if data[0] == b'<' {
            warn!(url = %remove_api_key(url), "Received XML or HTML instead of an icon");
            return None;
        } else {
            warn!(url = %remove_api_key(url), "Favicon is of unknown format");
            return None;
        };

        let path = stem.with_extension(extension);
        match tokio::fs::write(&path, &data).await {
            Ok(()) => {
                debug!(file = %path.display(), "Stored favicon");
                Some(path)
            }
            Err(error) => {
                warn!(%error, file = %path.display(), "Could not save favicon data");
                None
            }
        }
    }

    /// Fetch the page and look for `<link rel="icon">`/`"shortcut icon"`.
    async fn scan_website(&self, url: &Url) -> Option<Url> {
        let response = self.http.get(url, None).await.ok()?;
        let body = response.text().await.ok()?;
        let mut end = body.len().min(HTML_SCAN_LIMIT);
        while end < body.len() && !body.is_char_boundary(end) {
            end -= 1;
        }
        let href = extract_icon_link(&body[..end])?;
        let resolved = url.join(&href).ok()?;
        debug!(icon = %resolved, page = %remove_api_key(url), "Found favicon URL in HTML");
        Some(resolved)
    }
}

/// The `href` of the first `<link>` whose `rel` is `icon` or
/// `shortcut icon`.
#[must_use]
pub fn extract_icon_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("link").ok()?;
    for link in document.select(&selector) {
        let rel = link.value().attr("rel").unwrap_or_default().to_lowercase();
        if rel == "icon" || rel == "shortcut icon" {
            if let Some(href) = link.value().attr("href") {
                if !href.is_empty() {
                    return Some(href.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_link_extraction() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
            <link rel="shortcut icon" href="/static/favicon.ico">
        </head><body></body></html>"#;
        assert_eq!(
            extract_icon_link(html).as_deref(),
            Some("/static/favicon.ico")
        );
    }

    #[test]
    fn icon_link_absent() {
        assert!(extract_icon_link("<html><head></head></html>").is_none());
    }

    #[test]
    fn stem_reduces_url_to_safe_characters() {
        let locator = FavIconLocator::new(HttpClient::new().unwrap())
            .with_cache_dir(PathBuf::from("/tmp/favicons"));
        let url = Url::parse("https://www.example.org/path?x=1").unwrap();
        let stem = locator.file_name_stem(&url);
        let name = stem.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(name.contains("wwwexampleorg"));
    }

    #[tokio::test]
    async fn cached_icon_is_served_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let locator = FavIconLocator::new(HttpClient::new().unwrap())
            .with_cache_dir(dir.path().to_path_buf());
        let url = Url::parse("https://cached.example.org/").unwrap();
        let stem = locator.file_name_stem(&url);
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(stem.with_extension("png"), b"\x89PNG fake")
            .await
            .unwrap();

        let found = locator.check_cache(&stem).await;
        assert!(found.is_some());
        assert!(found.unwrap().to_string_lossy().ends_with(".png"));
    }
}
