//! BibTeX text collaborator: turn BibTeX source into [`BibEntry`] values and
//! back. Providers that download BibTeX exports (DOI resolvers, MR Lookup,
//! Inspire-HEP, ...) feed their response bodies through [`parse`]; the
//! formatter is the inverse used when handing result sets to consumers that
//! want text.
//!
//! The grammar covers what the provider exports actually produce:
//! `@kind{id, field = {...} | "..." | bareword, ...}` with nested braces,
//! `#`-concatenation flattened into plain text, and `@comment`/`@preamble`/
//! `@string` blocks skipped.

use crate::model::{month_macro, BibEntry, EntryKind, Person, Value, ValueItem};
use tracing::warn;

/// Fields whose values are stored verbatim rather than as plain text.
const VERBATIM_FIELDS: [&str; 9] = [
    "doi",
    "url",
    "file",
    "localfile",
    "eprint",
    "pii",
    "pmid",
    "jstor_id",
    "x-fetchedfrom",
];

/// Parse BibTeX source text into entries. Malformed blocks are skipped with
/// a warning; the parser never fails outright.
#[must_use]
pub fn parse(text: &str) -> Vec<BibEntry> {
    let chars: Vec<char> = text.chars().collect();
    let mut entries = Vec::new();
    let mut pos = 0;

    while let Some(at) = find_char(&chars, pos, '@') {
        pos = at + 1;
        let kind_start = pos;
        while pos < chars.len() && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_') {
            pos += 1;
        }
        let kind_token: String = chars[kind_start..pos].iter().collect();
        skip_whitespace(&chars, &mut pos);
        if pos >= chars.len() || (chars[pos] != '{' && chars[pos] != '(') {
            continue;
        }
        let closing = if chars[pos] == '{' { '}' } else { ')' };
        pos += 1;

        let lowered = kind_token.to_lowercase();
        if lowered == "comment" || lowered == "preamble" || lowered == "string" {
            skip_balanced(&chars, &mut pos, closing);
            continue;
        }

        skip_whitespace(&chars, &mut pos);
        let id_start = pos;
        while pos < chars.len() && chars[pos] != ',' && chars[pos] != closing {
            pos += 1;
        }
        let id: String = chars[id_start..pos].iter().collect::<String>().trim().to_string();
        if id.is_empty() {
            warn!("Skipping BibTeX block with empty citation id");
            skip_balanced(&chars, &mut pos, closing);
            continue;
        }

        let mut entry = BibEntry::new(EntryKind::from_token(&kind_token), id);
        while pos < chars.len() && chars[pos] != closing {
            if chars[pos] == ',' {
                pos += 1;
            }
            skip_whitespace(&chars, &mut pos);
            if pos >= chars.len() || chars[pos] == closing {
                break;
            }
            let Some((name, raw, is_quoted)) = read_field(&chars, &mut pos, closing) else {
                break;
            };
            if name.is_empty() {
                continue;
            }
            let value = interpret_value(&name, &raw, is_quoted);
            if !value.is_empty() {
                entry.insert(name, value);
            }
        }
        if pos < chars.len() && chars[pos] == closing {
            pos += 1;
        }
        entries.push(entry);
    }

    entries
}

/// Format entries as BibTeX text.
#[must_use]
pub fn format(entries: &[BibEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push('@');
        out.push_str(entry.kind.as_str());
        out.push('{');
        out.push_str(&entry.id);
        out.push_str(",\n");
        for (name, value) in entry.fields() {
            out.push_str("    ");
            out.push_str(name);
            out.push_str(" = ");
            out.push_str(&format_value(name, value));
            out.push_str(",\n");
        }
        out.push_str("}\n\n");
    }
    out
}

/// Split an author string into persons. Accepts both the BibTeX `and`
/// convention and semicolon-separated lists as produced by some providers.
#[must_use]
pub fn split_names(text: &str) -> Vec<Person> {
    let parts: Vec<&str> = if text.contains(';') {
        text.split(';').collect()
    } else {
        split_on_and(text)
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_person)
        .collect()
}

/// Parse a single name in either "Last, First" or "First Last" form.
#[must_use]
pub fn parse_person(name: &str) -> Person {
    let name = name.trim();
    let comma_parts: Vec<&str> = name.split(',').map(str::trim).collect();
    match comma_parts.len() {
        2 => Person::new(comma_parts[1], comma_parts[0]),
        3 => {
            // "Last, Suffix, First" per the three-comma BibTeX convention
            let mut person = Person::new(comma_parts[2], comma_parts[0]);
            person.suffix = Some(comma_parts[1].to_string());
            person
        }
        _ => match name.rsplit_once(' ') {
            Some((first, last)) => Person::new(first.trim(), last),
            None => Person::new("", name),
        },
    }
}

fn split_on_and(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b' ' if depth == 0 => {
                let rest = &text[i..];
                if rest.get(..5).is_some_and(|s| s.eq_ignore_ascii_case(" and ")) {
                    parts.push(&text[start..i]);
                    start = i + 5;
                    i += 4;
                }
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

fn find_char(chars: &[char], from: usize, needle: char) -> Option<usize> {
    chars[from.min(chars.len())..]
        .iter()
        .position(|&c| c == needle)
        .map(|p| p + from)
}

fn skip_whitespace(chars: &[char], pos: &mut usize) {
    while *pos < chars.len() && chars[*pos].is_whitespace() {
        *pos += 1;
    }
}

fn skip_balanced(chars: &[char], pos: &mut usize, closing: char) {
    let opening = if closing == '}' { '{' } else { '(' };
    let mut depth = 1usize;
    while *pos < chars.len() && depth > 0 {
        if chars[*pos] == opening {
            depth += 1;
        } else if chars[*pos] == closing {
            depth -= 1;
        }
        *pos += 1;
    }
}

/// Read `name = value` at the current position. Returns the field name, the
/// raw value with delimiters stripped, and whether the outermost delimiter
/// was quotes/braces (as opposed to a bare word).
fn read_field(chars: &[char], pos: &mut usize, closing: char) -> Option<(String, String, bool)> {
    skip_whitespace(chars, pos);
    let name_start = *pos;
    while *pos < chars.len()
        && (chars[*pos].is_ascii_alphanumeric() || chars[*pos] == '-' || chars[*pos] == '_')
    {
        *pos += 1;
    }
    let name: String = chars[name_start..*pos].iter().collect::<String>().to_lowercase();
    skip_whitespace(chars, pos);
    if *pos >= chars.len() || chars[*pos] != '=' {
        // Not a field assignment; give up on this entry body
        return None;
    }
    *pos += 1;

    let mut raw = String::new();
    let mut delimited = false;
    loop {
        skip_whitespace(chars, pos);
        if *pos >= chars.len() {
            break;
        }
        match chars[*pos] {
            '{' => {
                delimited = true;
                *pos += 1;
                let mut depth = 1usize;
                while *pos < chars.len() && depth > 0 {
                    match chars[*pos] {
                        '{' => {
                            depth += 1;
                            raw.push('{');
                        }
                        '}' => {
                            depth -= 1;
                            if depth > 0 {
                                raw.push('}');
                            }
                        }
                        c => raw.push(c),
                    }
                    *pos += 1;
                }
            }
            '"' => {
                delimited = true;
                *pos += 1;
                while *pos < chars.len() && chars[*pos] != '"' {
                    raw.push(chars[*pos]);
                    *pos += 1;
                }
                *pos += 1;
            }
            c if c == ',' || c == closing => break,
            _ => {
                while *pos < chars.len()
                    && !chars[*pos].is_whitespace()
                    && chars[*pos] != ','
                    && chars[*pos] != closing
                    && chars[*pos] != '#'
                {
                    raw.push(chars[*pos]);
                    *pos += 1;
                }
            }
        }
        skip_whitespace(chars, pos);
        if *pos < chars.len() && chars[*pos] == '#' {
            // Concatenation: flatten into one plain string
            *pos += 1;
            delimited = true;
            continue;
        }
        break;
    }

    Some((name, raw, delimited))
}

fn interpret_value(name: &str, raw: &str, delimited: bool) -> Value {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Vec::new();
    }

    if name == BibEntry::AUTHOR || name == BibEntry::EDITOR {
        return split_names(&cleaned)
            .into_iter()
            .map(ValueItem::Person)
            .collect();
    }
    if name == BibEntry::KEYWORDS {
        let separator = if cleaned.contains(';') { ';' } else { ',' };
        return cleaned
            .split(separator)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| ValueItem::Keyword(k.to_string()))
            .collect();
    }
    if name == BibEntry::MONTH {
        if let Some(key) = month_macro(&cleaned) {
            return vec![ValueItem::MacroKey(key.to_string())];
        }
        return vec![ValueItem::PlainText(cleaned)];
    }
    if VERBATIM_FIELDS.contains(&name) {
        return vec![ValueItem::VerbatimText(cleaned)];
    }
    if !delimited && cleaned.parse::<f64>().is_err() {
        // Undelimited non-number: a macro reference
        return vec![ValueItem::MacroKey(cleaned)];
    }
    vec![ValueItem::PlainText(unescape(&cleaned))]
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unescape(text: &str) -> String {
    text.replace("\\&", "&")
        .replace("\\%", "%")
        .replace("\\_", "_")
        .replace(['{', '}'], "")
}

fn escape(text: &str) -> String {
    text.replace('&', "\\&").replace('%', "\\%")
}

fn format_value(name: &str, value: &Value) -> String {
    if let [ValueItem::MacroKey(key)] = value.as_slice() {
        return key.clone();
    }
    let inner = match value.first() {
        Some(ValueItem::Person(_)) => value
            .iter()
            .filter_map(|item| match item {
                ValueItem::Person(p) => Some(if p.first.is_empty() {
                    p.last.clone()
                } else {
                    format!("{}, {}", p.last, p.first)
                }),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" and "),
        Some(ValueItem::Keyword(_)) => value
            .iter()
            .map(ValueItem::text)
            .collect::<Vec<_>>()
            .join(", "),
        _ => {
            let joined = value
                .iter()
                .map(ValueItem::text)
                .collect::<Vec<_>>()
                .join(" ");
            if VERBATIM_FIELDS.contains(&name) {
                joined
            } else {
                escape(&joined)
            }
        }
    };
    format!("{{{inner}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
@article{doe2019,
    author = {Doe, John and Roe, Jane},
    title = {On the {Behavior} of Parsers},
    journal = {Journal of Testing},
    year = {2019},
    month = sep,
    volume = {12},
    number = {3},
    pages = {1--20},
    doi = {10.1000/182},
    keywords = {parsing, testing},
}
"#;

    #[test]
    fn parses_article_fields() {
        let entries = parse(SAMPLE);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.kind, EntryKind::Article);
        assert_eq!(entry.id, "doe2019");
        assert_eq!(entry.field_text(BibEntry::JOURNAL), "Journal of Testing");
        assert_eq!(
            entry.get(BibEntry::MONTH).unwrap(),
            &vec![ValueItem::MacroKey("sep".to_string())]
        );
        assert_eq!(
            entry.get(BibEntry::DOI).unwrap(),
            &vec![ValueItem::VerbatimText("10.1000/182".to_string())]
        );
        let authors = entry.get(BibEntry::AUTHOR).unwrap();
        assert_eq!(
            authors[0],
            ValueItem::Person(Person::new("John", "Doe"))
        );
        assert_eq!(
            authors[1],
            ValueItem::Person(Person::new("Jane", "Roe"))
        );
        let keywords = entry.get(BibEntry::KEYWORDS).unwrap();
        assert_eq!(keywords.len(), 2);
        assert_eq!(keywords[0], ValueItem::Keyword("parsing".to_string()));
    }

    #[test]
    fn skips_comment_and_string_blocks() {
        let text = "@comment{ignore me}\n@string{jta = {J. Test. Anal.}}\n@misc{x1, title = {T}}";
        let entries = parse(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "x1");
    }

    #[test]
    fn split_names_handles_semicolons_and_and() {
        let semi = split_names("Doe, John; Roe, Jane");
        assert_eq!(semi.len(), 2);
        assert_eq!(semi[1], Person::new("Jane", "Roe"));

        let anded = split_names("John Doe and Jane Roe");
        assert_eq!(anded.len(), 2);
        assert_eq!(anded[0], Person::new("John", "Doe"));
    }

    #[test]
    fn parse_person_with_suffix() {
        let p = parse_person("King, Jr., Martin Luther");
        assert_eq!(p.last, "King");
        assert_eq!(p.first, "Martin Luther");
        assert_eq!(p.suffix.as_deref(), Some("Jr."));
    }

    #[test]
    fn round_trip_is_stable_after_one_pass() {
        let entries = parse(SAMPLE);
        let formatted = format(&entries);
        let reparsed = parse(&formatted);
        assert_eq!(entries, reparsed);
    }

    #[test]
    fn quoted_values_and_bare_numbers() {
        let text = "@book{b1, title = \"A Book\", year = 1999}";
        let entries = parse(text);
        assert_eq!(entries[0].field_text(BibEntry::TITLE), "A Book");
        assert_eq!(entries[0].field_text(BibEntry::YEAR), "1999");
    }
}
