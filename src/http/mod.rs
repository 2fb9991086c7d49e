//! Shared HTTP client used by every provider.
//!
//! One [`HttpClient`] (cheaply cloneable) backs all searches: a common
//! cookie jar, a user-agent string picked at random once per process, the
//! standard header set, a redirect policy that refuses HTTPS→HTTP
//! downgrades, and a default 30 second timeout. API keys are redacted from
//! URLs before they reach the logs.

pub mod cookies;

use crate::error::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_CHARSET, ACCEPT_LANGUAGE, REFERER};
use reqwest::redirect;
use reqwest::{Client, Response};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use url::Url;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser strings used to disguise the request origin.
const USER_AGENTS: [&str; 20] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:115.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Edg/118.0.2088.76",
    "Mozilla/5.0 (Windows NT 6.1; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; WOW64; Trident/7.0; rv:11.0) like Gecko",
    "Mozilla/5.0 (compatible; Konqueror/5.0; Linux) KHTML/5.90.0 (like Gecko)",
    "Mozilla/5.0 (X11; FreeBSD amd64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/117.0",
    "Opera/9.80 (Windows NT 6.2; Win64; x64) Presto/2.12.388 Version/12.17",
    "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36 OPR/96.0.0.0",
    "Lynx/2.8.9rel.1 libwww-FM/2.14 SSL-MM/1.4.1 OpenSSL/1.1.1",
];

/// Query parameters that carry credentials and must never appear in logs.
const API_KEY_PARAMETERS: [&str; 6] = ["key", "api_key", "apikey", "wskey", "access_key", "email"];

/// The process-wide user-agent string, chosen uniformly at random on first
/// use and constant afterwards.
pub fn user_agent() -> &'static str {
    static CHOICE: OnceLock<&'static str> = OnceLock::new();
    CHOICE.get_or_init(|| {
        use rand::Rng;
        let index = rand::thread_rng().gen_range(0..USER_AGENTS.len());
        USER_AGENTS[index]
    })
}

/// Shared asynchronous HTTP client.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    jar: Arc<reqwest::cookie::Jar>,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let jar = Arc::new(reqwest::cookie::Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/*, */*;q=0.7"));
        headers.insert(
            ACCEPT_CHARSET,
            HeaderValue::from_static("utf-8, us-ascii, ISO-8859-1, ISO-8859-15, windows-1252"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US, en;q=0.9"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(user_agent())
            .redirect(no_less_safe_redirects())
            .timeout(DEFAULT_TIMEOUT)
            .cookie_provider(Arc::clone(&jar))
            .gzip(true);

        // The platform proxy resolver is the environment here. A literal
        // "DIRECT" disables proxying entirely.
        match proxy_from_environment() {
            ProxySetting::Direct => builder = builder.no_proxy(),
            ProxySetting::Proxy(proxy_url) => {
                builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
            }
            ProxySetting::System => {}
        }

        Ok(Self {
            client: builder.build()?,
            jar,
        })
    }

    /// Perform a GET request. `referer`, if given, is the URL of the prior
    /// step in a request chain.
    pub async fn get(&self, url: &Url, referer: Option<&Url>) -> reqwest::Result<Response> {
        self.get_with_timeout(url, referer, DEFAULT_TIMEOUT).await
    }

    /// GET with an explicit per-request timeout.
    pub async fn get_with_timeout(
        &self,
        url: &Url,
        referer: Option<&Url>,
        timeout: Duration,
    ) -> reqwest::Result<Response> {
        let mut request = self.client.get(url.clone()).timeout(timeout);
        if let Some(prior) = referer {
            if let Ok(value) = HeaderValue::from_str(prior.as_str()) {
                request = request.header(REFERER, value);
            }
        }
        request.send().await
    }

    /// POST a form-encoded body.
    pub async fn post_form(
        &self,
        url: &Url,
        body: String,
        referer: Option<&Url>,
    ) -> reqwest::Result<Response> {
        let mut request = self
            .client
            .post(url.clone())
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .timeout(DEFAULT_TIMEOUT)
            .body(body);
        if let Some(prior) = referer {
            if let Ok(value) = HeaderValue::from_str(prior.as_str()) {
                request = request.header(REFERER, value);
            }
        }
        request.send().await
    }

    /// POST a JSON body.
    pub async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
        bearer_token: Option<&str>,
    ) -> reqwest::Result<Response> {
        let mut request = self
            .client
            .post(url.clone())
            .json(body)
            .timeout(DEFAULT_TIMEOUT);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }
        request.send().await
    }

    /// Access to the underlying client for request shapes the helpers do
    /// not cover (custom headers, content negotiation).
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Scan an HTML body for `<meta http-equiv="Set-Cookie">` tags and merge
    /// any cookie found into the shared jar under `url`.
    pub fn merge_html_head_cookies(&self, html: &str, url: &Url) {
        cookies::merge_html_head_cookies(&self.jar, html, url);
    }
}

/// Display form of a URL with credential-carrying query parameters redacted.
/// Always use this before logging a request URL.
#[must_use]
pub fn remove_api_key(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if API_KEY_PARAMETERS.contains(&k.to_lowercase().as_str()) {
                (k.into_owned(), "XXXX".to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    redacted
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    redacted.to_string()
}

/// Decode an XOR-obfuscated byte sequence into a credential string.
///
/// The sequence holds one byte pair per character, last character first;
/// each character is the XOR of its pair. This keeps compile-time API keys
/// out of a plain `strings` dump of the binary.
#[must_use]
pub fn reverse_obfuscate(bytes: &[u8]) -> String {
    if bytes.is_empty() || bytes.len() % 2 != 0 {
        return String::new();
    }
    let mut result = String::with_capacity(bytes.len() / 2);
    let mut p = bytes.len() - 1;
    loop {
        result.push(char::from(bytes[p] ^ bytes[p - 1]));
        if p < 2 {
            break;
        }
        p -= 2;
    }
    result
}

enum ProxySetting {
    /// Explicitly no proxy.
    Direct,
    /// A proxy URL to route all requests through.
    Proxy(String),
    /// Defer to reqwest's built-in system proxy handling.
    System,
}

fn proxy_from_environment() -> ProxySetting {
    for name in ["BIBFETCH_PROXY", "all_proxy", "ALL_PROXY"] {
        if let Ok(value) = std::env::var(name) {
            let value = value.trim().to_string();
            if value.eq_ignore_ascii_case("direct") {
                return ProxySetting::Direct;
            }
            if !value.is_empty() {
                return ProxySetting::Proxy(value);
            }
        }
    }
    ProxySetting::System
}

/// Follow redirects up to the stack default, but never from HTTPS down to
/// plain HTTP.
fn no_less_safe_redirects() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > 10 {
            return attempt.error("too many redirects");
        }
        let downgrade = attempt
            .previous()
            .last()
            .is_some_and(|prior| prior.scheme() == "https" && attempt.url().scheme() == "http");
        if downgrade {
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_is_stable_within_process() {
        let first = user_agent();
        let second = user_agent();
        assert_eq!(first, second);
        assert!(USER_AGENTS.contains(&first));
    }

    #[test]
    fn remove_api_key_redacts_credential_parameters() {
        let url = Url::parse(
            "https://api.example.org/search?q=title%3Atest&apikey=secret123&page=2",
        )
        .unwrap();
        let display = remove_api_key(&url);
        assert!(!display.contains("secret123"));
        assert!(display.contains("apikey=XXXX"));
        assert!(display.contains("page=2"));
    }

    #[test]
    fn remove_api_key_handles_wskey_and_email() {
        let url =
            Url::parse("https://worldcat.org/sru?query=x&wskey=abc&email=me@example.com").unwrap();
        let display = remove_api_key(&url);
        assert!(!display.contains("abc"));
        assert!(!display.contains("me@example.com"));
    }

    #[test]
    fn remove_api_key_leaves_plain_urls_alone() {
        let url = Url::parse("https://example.org/path/to/page").unwrap();
        assert_eq!(remove_api_key(&url), "https://example.org/path/to/page");
    }

    #[test]
    fn reverse_obfuscate_decodes_pairs() {
        // "ab" encoded: pairs for 'b' then 'a', each (x, x ^ c)
        let bytes = [0x55, 0x55 ^ b'b', 0x23, 0x23 ^ b'a'];
        assert_eq!(reverse_obfuscate(&bytes), "ab");
    }

    #[test]
    fn reverse_obfuscate_rejects_odd_input() {
        assert_eq!(reverse_obfuscate(&[1, 2, 3]), "");
        assert_eq!(reverse_obfuscate(&[]), "");
    }
}
