//! Cookie handling beyond the standard jar: some providers (notably JSTOR)
//! deliver their session cookie in an HTML `<meta http-equiv="Set-Cookie">`
//! tag instead of a response header. This module scans markup for such tags
//! and merges the extracted cookie into the shared jar.

use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

fn cookie_content_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)^([^"=; ]+)=([^"=; ]+).*\bpath=([^"=; ]+)"#)
            .expect("cookie content pattern is valid")
    })
}

/// Extract a cookie from `<meta http-equiv="set-cookie" content="K=V; path=P">`
/// in the given HTML and add it to the jar under `url`. Only the first such
/// tag is honored, matching the behavior providers rely on.
pub fn merge_html_head_cookies(jar: &Jar, html: &str, url: &Url) {
    let Some((key, value, path)) = extract_meta_cookie(html) else {
        return;
    };
    debug!(cookie = %key, %url, "Merging cookie found in HTML head");
    jar.add_cookie_str(&format!("{key}={value}; Path={path}"), url);
}

/// Locate the first `http-equiv="set-cookie"` meta tag and parse its
/// `content` attribute into `(key, value, path)`.
#[must_use]
pub fn extract_meta_cookie(html: &str) -> Option<(String, String, String)> {
    // ASCII lowering keeps byte offsets aligned with the original text
    let lowered = html.to_ascii_lowercase();
    let equiv_pos = lowered.find("http-equiv=\"set-cookie\"")?;
    if equiv_pos < 5 {
        return None;
    }
    // The attribute must sit inside a <meta ...> tag
    let meta_pos = lowered[..equiv_pos].rfind("<meta")?;
    let content_pos = lowered[meta_pos..].find("content=\"").map(|p| p + meta_pos)?;
    let content_start = content_pos + "content=\"".len();
    let mut window_end = (content_start + 256).min(html.len());
    while window_end < html.len() && !html.is_char_boundary(window_end) {
        window_end -= 1;
    }
    let window = html.get(content_start..window_end)?;

    let captures = cookie_content_regex().captures(window)?;
    Some((
        captures[1].to_string(),
        captures[2].to_string(),
        captures[3].to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_cookie_from_meta_tag() {
        let html = r#"<html><head>
            <meta http-equiv="Set-Cookie" content="UserTrackID=12ab34cd; path=/; expires=Friday, 31-Dec-2025 23:59:59 GMT">
            </head><body></body></html>"#;
        let (key, value, path) = extract_meta_cookie(html).unwrap();
        assert_eq!(key, "UserTrackID");
        assert_eq!(value, "12ab34cd");
        assert_eq!(path, "/");
    }

    #[test]
    fn ignores_markup_without_cookie_meta() {
        let html = "<html><head><meta charset=\"utf-8\"></head></html>";
        assert!(extract_meta_cookie(html).is_none());
    }

    #[test]
    fn ignores_cookie_without_path() {
        let html = r#"<meta http-equiv="set-cookie" content="k=v">"#;
        assert!(extract_meta_cookie(html).is_none());
    }

    #[test]
    fn merged_cookie_is_visible_in_jar() {
        let jar = Jar::default();
        let url = Url::parse("https://www.jstor.org/").unwrap();
        let html = r#"<html><head><meta http-equiv="Set-Cookie" content="Session=xyz987; path=/"></head></html>"#;
        merge_html_head_cookies(&jar, html, &url);
        let cookies = jar.cookies(&url).expect("cookie was stored");
        assert!(cookies.to_str().unwrap().contains("Session=xyz987"));
    }
}
