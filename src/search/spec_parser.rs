//! Declarative response parsers.
//!
//! Providers whose responses map onto entries without much logic describe
//! the mapping as a rule table instead of hand-written walking code: each
//! rule pairs an entry field with a slash-separated element path (XML) or a
//! JSON pointer, plus a value constructor. The tables are interpreted at
//! run time; the cost is dwarfed by the HTTP round trips.
//!
//! XML paths support one trailing attribute predicate per step, e.g.
//! `PubmedData/ArticleIdList/ArticleId[@IdType=doi]`.

use crate::error::SearchError;
use crate::model::{month_macro, BibEntry, EntryKind, Person, Value, ValueItem};
use roxmltree::{Document, Node};
use serde_json::Value as Json;

/// How extracted strings become value items.
#[derive(Debug, Clone, Copy)]
pub enum RuleValue {
    Plain,
    Verbatim,
    /// Month names or numbers mapped onto the macro key set.
    MonthMacro,
    /// Split on `;`/`,` into keyword items.
    Keywords,
    /// Pair two paths into person items (XML only; the second path is the
    /// given-name source).
    PersonList { first_path: &'static str },
}

/// One field mapping.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub path: &'static str,
    pub value: RuleValue,
}

/// A complete XML entry mapping.
#[derive(Debug, Clone, Copy)]
pub struct XmlEntrySpec {
    /// Path from the document root to one entry element.
    pub entry_path: &'static str,
    pub kind: EntryKind,
    /// Path (relative to the entry element) for the citation id.
    pub id_path: &'static str,
    /// Prefix prepended to the extracted id.
    pub id_prefix: &'static str,
    pub fields: &'static [FieldRule],
}

/// A complete JSON entry mapping.
#[derive(Debug, Clone, Copy)]
pub struct JsonEntrySpec {
    /// JSON pointer to the array of result objects.
    pub collection_pointer: &'static str,
    pub kind: EntryKind,
    /// JSON pointer (relative to one result object) for the citation id.
    pub id_pointer: &'static str,
    pub id_prefix: &'static str,
    pub fields: &'static [FieldRule],
}

/// Interpret an XML spec over a response body.
pub fn parse_xml_entries(spec: &XmlEntrySpec, xml: &str) -> Result<Vec<BibEntry>, SearchError> {
    let document = Document::parse(xml)
        .map_err(|e| SearchError::Unspecified(format!("XML parse failure: {e}")))?;

    let mut entries = Vec::new();
    for node in resolve_xml_path(document.root(), spec.entry_path) {
        let id_texts = collect_xml_texts(node, spec.id_path);
        let Some(raw_id) = id_texts.first() else {
            continue;
        };
        let mut entry = BibEntry::new(spec.kind, format!("{}{}", spec.id_prefix, raw_id));

        for rule in spec.fields {
            let value = match rule.value {
                RuleValue::PersonList { first_path } if !first_path.is_empty() => {
                    let last_names = collect_xml_texts(node, rule.path);
                    let first_names = collect_xml_texts(node, first_path);
                    last_names
                        .into_iter()
                        .zip(first_names)
                        .map(|(last, first)| ValueItem::Person(Person::new(first, last)))
                        .collect()
                }
                RuleValue::PersonList { .. } => collect_xml_texts(node, rule.path)
                    .iter()
                    .map(|name| ValueItem::Person(crate::bibtex::parse_person(name)))
                    .collect(),
                _ => {
                    let texts = collect_xml_texts(node, rule.path);
                    build_value(rule.value, &texts)
                }
            };
            if !value.is_empty() {
                entry.insert(rule.field, value);
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Interpret a JSON spec over a response body.
pub fn parse_json_entries(spec: &JsonEntrySpec, body: &str) -> Result<Vec<BibEntry>, SearchError> {
    let document: Json = serde_json::from_str(body)
        .map_err(|e| SearchError::Unspecified(format!("JSON parse failure: {e}")))?;

    let collection = document
        .pointer(spec.collection_pointer)
        .and_then(Json::as_array)
        .cloned()
        .unwrap_or_default();

    let mut entries = Vec::new();
    for object in collection {
        let Some(raw_id) = json_text(&object, spec.id_pointer) else {
            continue;
        };
        let mut entry = BibEntry::new(spec.kind, format!("{}{}", spec.id_prefix, raw_id));

        for rule in spec.fields {
            let texts = json_texts(&object, rule.path);
            let value = match rule.value {
                RuleValue::PersonList { .. } => texts
                    .iter()
                    .map(|name| ValueItem::Person(crate::bibtex::parse_person(name)))
                    .collect(),
                _ => build_value(rule.value, &texts),
            };
            if !value.is_empty() {
                entry.insert(rule.field, value);
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn build_value(kind: RuleValue, texts: &[String]) -> Value {
    match kind {
        RuleValue::Plain => texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| ValueItem::PlainText(normalize_whitespace(t)))
            .collect(),
        RuleValue::Verbatim => texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| ValueItem::VerbatimText(t.trim().to_string()))
            .collect(),
        RuleValue::MonthMacro => texts
            .iter()
            .filter_map(|t| month_macro(t))
            .map(|key| ValueItem::MacroKey(key.to_string()))
            .take(1)
            .collect(),
        RuleValue::Keywords => texts
            .iter()
            .flat_map(|t| t.split([';', ',']))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| ValueItem::Keyword(k.to_string()))
            .collect(),
        RuleValue::PersonList { .. } => Vec::new(),
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct PathStep<'a> {
    tag: &'a str,
    predicate: Option<(&'a str, &'a str)>,
}

fn parse_step(step: &str) -> PathStep<'_> {
    if let Some((tag, rest)) = step.split_once("[@") {
        if let Some(predicate) = rest.strip_suffix(']') {
            if let Some((attr, value)) = predicate.split_once('=') {
                return PathStep {
                    tag,
                    predicate: Some((attr, value)),
                };
            }
        }
    }
    PathStep {
        tag: step,
        predicate: None,
    }
}

/// Resolve a slash-separated path to the set of matching nodes. Tag names
/// compare namespace-agnostically.
fn resolve_xml_path<'a, 'input>(
    root: Node<'a, 'input>,
    path: &str,
) -> Vec<Node<'a, 'input>> {
    let mut current = vec![root];
    for raw_step in path.split('/') {
        let step = parse_step(raw_step);
        let mut next = Vec::new();
        for node in current {
            for child in node.children() {
                if !child.is_element() || child.tag_name().name() != step.tag {
                    continue;
                }
                if let Some((attr, expected)) = step.predicate {
                    if child.attribute(attr) != Some(expected) {
                        continue;
                    }
                }
                next.push(child);
            }
        }
        current = next;
    }
    current
}

fn collect_xml_texts(node: Node<'_, '_>, path: &str) -> Vec<String> {
    resolve_xml_path(node, path)
        .into_iter()
        .filter_map(|n| collect_node_text(n))
        .collect()
}

/// Concatenated text of a node, including text nested in inline markup.
fn collect_node_text(node: Node<'_, '_>) -> Option<String> {
    let mut out = String::new();
    for descendant in node.descendants() {
        if let Some(text) = descendant.text() {
            if descendant.is_text() {
                out.push_str(text);
            }
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn json_text(object: &Json, pointer: &str) -> Option<String> {
    json_texts(object, pointer).into_iter().next()
}

/// Resolve a JSON pointer; a pointer crossing an array fans out over its
/// elements (`/authors/name` visits every author).
fn json_texts(object: &Json, pointer: &str) -> Vec<String> {
    let mut current = vec![object.clone()];
    for step in pointer.split('/').filter(|s| !s.is_empty()) {
        let mut next = Vec::new();
        for value in current {
            match value {
                Json::Array(items) => {
                    for item in items {
                        if let Some(inner) = item.get(step) {
                            next.push(inner.clone());
                        }
                    }
                }
                other => {
                    if let Some(inner) = other.get(step) {
                        next.push(inner.clone());
                    }
                }
            }
        }
        current = next;
    }

    let mut texts = Vec::new();
    for value in current {
        match value {
            Json::String(s) => texts.push(s),
            Json::Number(n) => texts.push(n.to_string()),
            Json::Array(items) => {
                for item in items {
                    match item {
                        Json::String(s) => texts.push(s),
                        Json::Number(n) => texts.push(n.to_string()),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    texts
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML_SPEC: XmlEntrySpec = XmlEntrySpec {
        entry_path: "set/record",
        kind: EntryKind::Article,
        id_path: "meta/id",
        id_prefix: "rec",
        fields: &[
            FieldRule {
                field: BibEntry::TITLE,
                path: "data/title",
                value: RuleValue::Plain,
            },
            FieldRule {
                field: BibEntry::DOI,
                path: "meta/identifier[@kind=doi]",
                value: RuleValue::Verbatim,
            },
            FieldRule {
                field: BibEntry::MONTH,
                path: "data/month",
                value: RuleValue::MonthMacro,
            },
            FieldRule {
                field: BibEntry::AUTHOR,
                path: "data/authors/last",
                value: RuleValue::PersonList {
                    first_path: "data/authors/first",
                },
            },
        ],
    };

    #[test]
    fn xml_rules_extract_fields_and_predicates() {
        let xml = r"<set>
          <record>
            <meta>
              <id>42</id>
              <identifier kind='issn'>1234-5678</identifier>
              <identifier kind='doi'>10.1000/182</identifier>
            </meta>
            <data>
              <title>A  Test
                Title</title>
              <month>04</month>
              <authors><last>Doe</last><first>John</first></authors>
              <authors><last>Roe</last><first>Jane</first></authors>
            </data>
          </record>
        </set>";
        let entries = parse_xml_entries(&XML_SPEC, xml).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, "rec42");
        assert_eq!(entry.field_text(BibEntry::TITLE), "A Test Title");
        assert_eq!(entry.field_text(BibEntry::DOI), "10.1000/182");
        assert_eq!(
            entry.get(BibEntry::MONTH).unwrap(),
            &vec![ValueItem::MacroKey("apr".to_string())]
        );
        let authors = entry.get(BibEntry::AUTHOR).unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(
            authors[1],
            ValueItem::Person(Person::new("Jane", "Roe"))
        );
    }

    const JSON_SPEC: JsonEntrySpec = JsonEntrySpec {
        collection_pointer: "/data",
        kind: EntryKind::Misc,
        id_pointer: "/paperId",
        id_prefix: "",
        fields: &[
            FieldRule {
                field: BibEntry::TITLE,
                path: "/title",
                value: RuleValue::Plain,
            },
            FieldRule {
                field: BibEntry::YEAR,
                path: "/year",
                value: RuleValue::Plain,
            },
            FieldRule {
                field: BibEntry::AUTHOR,
                path: "/authors/name",
                value: RuleValue::PersonList { first_path: "" },
            },
        ],
    };

    #[test]
    fn json_rules_extract_fields_and_fan_out_arrays() {
        let body = r#"{"total": 1, "data": [
            {"paperId": "abc123", "title": "JSON Parsing", "year": 2021,
             "authors": [{"name": "John Doe"}, {"name": "Jane Roe"}]}
        ]}"#;
        let entries = parse_json_entries(&JSON_SPEC, body).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, "abc123");
        assert_eq!(entry.field_text(BibEntry::YEAR), "2021");
        let authors = entry.get(BibEntry::AUTHOR).unwrap();
        assert_eq!(
            authors[0],
            ValueItem::Person(Person::new("John", "Doe"))
        );
    }

    #[test]
    fn missing_collection_yields_no_entries() {
        let entries = parse_json_entries(&JSON_SPEC, "{}").unwrap();
        assert!(entries.is_empty());
    }
}
