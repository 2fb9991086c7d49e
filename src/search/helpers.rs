//! Shared text helpers used by the provider protocol implementations:
//! quote-aware term splitting, the historical percent-codec, and HTML form
//! parameter extraction.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Characters the percent-codec always escapes.
const HTTP_UNSAFE_CHARS: [char; 8] = ['%', ':', '/', '=', '+', '$', '?', '&'];

/// Split on whitespace but keep `"..."` groups (quotes included) intact.
#[must_use]
pub fn split_respecting_quotation_marks(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let max = chars.len();
    let mut result = Vec::new();
    let mut p1 = 0usize;
    while p1 < max {
        while p1 < max && chars[p1] == ' ' {
            p1 += 1;
        }
        if p1 >= max {
            break;
        }
        let mut p2 = p1;
        if chars[p2] == '"' {
            p2 += 1;
            while p2 < max && chars[p2] != '"' {
                p2 += 1;
            }
        } else {
            while p2 < max && chars[p2] != ' ' {
                p2 += 1;
            }
        }
        let end = (p2 + 1).min(max);
        let token: String = chars[p1..end].iter().collect();
        let token = token.trim().to_string();
        if !token.is_empty() {
            result.push(token);
        }
        p1 = p2 + 1;
    }
    result
}

/// Percent-encode the unsafe character set and turn spaces into `+`.
#[must_use]
pub fn encode_url(raw: &str) -> String {
    let mut text = raw.to_string();
    // '%' must be first, the other replacements introduce it
    for c in HTTP_UNSAFE_CHARS {
        text = text.replace(c, &format!("%{:x}", c as u32));
    }
    text.replace(' ', "+")
}

/// Inverse of [`encode_url`], also resolving `&amp;`.
#[must_use]
pub fn decode_url(raw: &str) -> String {
    static PERCENT: OnceLock<Regex> = OnceLock::new();
    let percent =
        PERCENT.get_or_init(|| Regex::new("%([0-9A-Fa-f]{2})").expect("percent pattern is valid"));

    let mut text = raw.to_string();
    while let Some(captures) = percent.captures(&text) {
        let Ok(code) = u32::from_str_radix(&captures[1], 16) else {
            break;
        };
        let Some(c) = char::from_u32(code) else { break };
        let whole = captures[0].to_string();
        text = text.replacen(&whole, &c.to_string(), 1);
    }
    text.replace("&amp;", "&").replace('+', " ")
}

struct InputTagPatterns {
    kind: Regex,
    name: Regex,
    value: Regex,
    checked: Regex,
    select_name: Regex,
    option_value: Regex,
    option_selected: Regex,
}

fn input_patterns() -> &'static InputTagPatterns {
    static PATTERNS: OnceLock<InputTagPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| InputTagPatterns {
        kind: Regex::new(r#"(?i)<input[^>]+\btype="?([^" >\n\t]*)"#).expect("valid"),
        name: Regex::new(r#"(?i)<input[^>]+\bname="?([^" >\n\t]*)"#).expect("valid"),
        value: Regex::new(r#"(?i)<input[^>]+\bvalue="?([^" >\n\t]*)"#).expect("valid"),
        checked: Regex::new(r#"(?i)\bchecked([> \t\n]|="?checked)"#).expect("valid"),
        select_name: Regex::new(r#"(?i)<select[^>]+\bname="?([^" >\n\t]*)"#).expect("valid"),
        option_value: Regex::new(r#"(?i)<option[^>]+\bvalue="?([^" >\n\t]*)"#).expect("valid"),
        option_selected: Regex::new(r#"(?i)<option[^>]* selected([> \t\n]|="?selected)"#)
            .expect("valid"),
    })
}

/// Extract the submit-visible `(name, value)` pairs of the first `<form>`
/// whose opening tag starts with `form_tag_begin`.
///
/// Hidden, text, and submit inputs always contribute; radio buttons and
/// checkboxes only when checked (checkboxes may repeat a name); image
/// inputs are ignored; a `<select>` contributes its selected `<option>`.
#[must_use]
pub fn form_parameters(html: &str, form_tag_begin: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    let Some(start) = html.find(form_tag_begin) else {
        warn!(form = form_tag_begin, "Could not locate form in HTML text");
        return result;
    };
    let Some(end) = html[start..].find("</form>").map(|p| p + start) else {
        warn!(form = form_tag_begin, "Form is never closed in HTML text");
        return result;
    };
    let form = &html[start..end];
    let patterns = input_patterns();

    let mut upsert = |name: String, value: String, multi: bool| {
        if !multi {
            if let Some(slot) = result.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = value;
                return;
            }
        }
        result.push((name, value));
    };

    let mut search_from = 0usize;
    while let Some(p) = form[search_from..].find("<input ").map(|p| p + search_from) {
        let tag_end = form[p..].find('>').map_or(form.len(), |e| p + e + 1);
        let tag = &form[p..tag_end];

        let input_type = patterns
            .kind
            .captures(tag)
            .map(|c| c[1].to_lowercase())
            .unwrap_or_default();
        let input_name = patterns
            .name
            .captures(tag)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let input_value = patterns
            .value
            .captures(tag)
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        if !input_name.is_empty() {
            match input_type.as_str() {
                "hidden" | "text" | "submit" => upsert(input_name, input_value, false),
                "radio" => {
                    if patterns.checked.is_match(tag) {
                        upsert(input_name, input_value, false);
                    }
                }
                "checkbox" => {
                    if patterns.checked.is_match(tag) {
                        // multiple same-name checkbox values are legitimate
                        upsert(input_name, input_value, true);
                    }
                }
                // input type "image" and everything unknown is ignored
                _ => {}
            }
        }

        search_from = tag_end;
    }

    let mut select_from = 0usize;
    while let Some(p) = form[select_from..].find("<select ").map(|p| p + select_from) {
        let select_end = form[p..]
            .find("</select>")
            .map_or(form.len(), |e| p + e);
        let select = &form[p..select_end];
        let select_name = patterns
            .select_name
            .captures(select)
            .map(|c| c[1].to_string());

        if let Some(select_name) = select_name {
            let mut option_from = 0usize;
            while let Some(po) = select[option_from..].find("<option ").map(|p| p + option_from) {
                let option_end = select[po..].find('>').map_or(select.len(), |e| po + e + 1);
                let option = &select[po..option_end];
                if patterns.option_selected.is_match(option) {
                    if let Some(captures) = patterns.option_value.captures(option) {
                        upsert(select_name.clone(), captures[1].to_string(), false);
                    }
                }
                option_from = option_end;
            }
        }

        select_from = (select_end + 1).min(form.len());
    }

    result
}

/// Render form parameters as an `application/x-www-form-urlencoded` body.
#[must_use]
pub fn form_body(parameters: &[(String, String)]) -> String {
    parameters
        .iter()
        .map(|(k, v)| format!("{}={}", encode_url(k), encode_url(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain_terms() {
        assert_eq!(
            split_respecting_quotation_marks("alpha beta  gamma"),
            vec!["alpha", "beta", "gamma"]
        );
    }

    #[test]
    fn split_keeps_quoted_groups() {
        assert_eq!(
            split_respecting_quotation_marks(r#"error "quantum computing" code"#),
            vec!["error", r#""quantum computing""#, "code"]
        );
    }

    #[test]
    fn split_joins_back_to_input() {
        let input = r#"alpha "beta gamma" delta"#;
        let parts = split_respecting_quotation_marks(input);
        assert_eq!(parts.join(" "), input);
    }

    #[test]
    fn encode_decode_round_trip() {
        let original = "plain text_with-safe.chars~only";
        assert_eq!(decode_url(&encode_url(original)), original);
    }

    #[test]
    fn encode_escapes_unsafe_set() {
        assert_eq!(encode_url("a=b&c"), "a%3db%26c");
        assert_eq!(encode_url("x y"), "x+y");
    }

    #[test]
    fn decode_resolves_entities_and_plus() {
        assert_eq!(decode_url("a%3Db&amp;c+d"), "a=b&c d");
    }

    /// Scenario: the ACM portal quick-search form probe.
    #[test]
    fn form_parameters_acm_probe() {
        let html = r#"<html><body><form name="qiksearch" action="search.cfm"><input type=hidden name=tok value=abc><input type=text name=q value=""></form></body></html>"#;
        let params = form_parameters(html, r#"<form name="qiksearch""#);
        assert_eq!(
            params,
            vec![
                ("tok".to_string(), "abc".to_string()),
                ("q".to_string(), String::new())
            ]
        );
    }

    #[test]
    fn form_parameters_radio_and_checkbox_rules() {
        let html = r#"<form method="post" action="/search">
            <input type="radio" name="scope" value="all" checked>
            <input type="radio" name="scope" value="title">
            <input type="checkbox" name="filter" value="oa" checked="checked">
            <input type="checkbox" name="filter" value="recent" checked>
            <input type="checkbox" name="filter" value="cited">
            <input type="image" name="go" value="Go">
        </form>"#;
        let params = form_parameters(html, "<form method=\"post\"");
        assert_eq!(
            params,
            vec![
                ("scope".to_string(), "all".to_string()),
                ("filter".to_string(), "oa".to_string()),
                ("filter".to_string(), "recent".to_string()),
            ]
        );
    }

    #[test]
    fn form_parameters_select_selected_option() {
        let html = r#"<form id="f" action="/s">
            <select name="year"><option value="2023">2023</option><option value="2024" selected>2024</option></select>
        </form>"#;
        let params = form_parameters(html, "<form id=\"f\"");
        assert_eq!(params, vec![("year".to_string(), "2024".to_string())]);
    }

    #[test]
    fn form_parameters_missing_form_is_empty() {
        assert!(form_parameters("<html></html>", "<form name=\"x\"").is_empty());
    }
}
