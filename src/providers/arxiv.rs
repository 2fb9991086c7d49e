//! arXiv.org provider: one request against the Atom API, plus heuristics
//! that split the free-text "journal reference" string into structured
//! journal/volume/number/pages/year fields.

use crate::bibtex::parse_person;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{month_macro, BibEntry, EntryKind, ValueItem};
use crate::search::helpers::{encode_url, split_respecting_quotation_marks};
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use regex::Regex;
use roxmltree::Document;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

const QUERY_BASE_URL: &str = "https://export.arxiv.org/api/query?";

pub struct ArxivSearch {
    http: HttpClient,
}

impl ArxivSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_query_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let mut fragments = Vec::new();
        for term in query.term_strings() {
            for fragment in split_respecting_quotation_marks(term) {
                fragments.push(encode_url(fragment.trim_matches('"')));
            }
        }
        // Join search terms with an AND operation
        let joined = fragments.join("\"+AND+all:\"");
        let url = format!(
            "{QUERY_BASE_URL}search_query=all:\"{joined}\"&start=0&max_results={}",
            query.num_results
        );
        Url::parse(&url).map_err(|e| SearchError::Unspecified(e.to_string()))
    }
}

#[async_trait]
impl OnlineSearch for ArxivSearch {
    fn label(&self) -> &'static str {
        "arXiv.org"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://arxiv.org/").expect("static URL is valid")
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

        session.progress_init(1);
        let url = Self::build_query_url(query)?;
        let response = session.guard(self.http.get(&url, None).await)?;
        session.step();
        let body = session.read_text(response).await?;

        let entries = parse_atom_feed(&body)?;
        debug!(count = entries.len(), "Parsed arXiv Atom feed");
        for entry in entries {
            session.publish(entry);
        }
        Ok(())
    }
}

/// Parse an arXiv Atom response into entries.
pub fn parse_atom_feed(xml: &str) -> Result<Vec<BibEntry>, SearchError> {
    let document = Document::parse(xml)
        .map_err(|e| SearchError::Unspecified(format!("Atom parse failure: {e}")))?;

    let mut entries = Vec::new();
    for node in document
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("entry"))
    {
        let mut abs_url = String::new();
        let mut title = String::new();
        let mut summary = String::new();
        let mut journal_ref = String::new();
        let mut doi = String::new();
        let mut primary_class = String::new();
        let mut published = String::new();
        let mut authors = Vec::new();

        for child in node.children().filter(roxmltree::Node::is_element) {
            match child.tag_name().name() {
                "id" => abs_url = child.text().unwrap_or_default().trim().to_string(),
                "title" => title = collapse(child.text().unwrap_or_default()),
                "summary" => summary = collapse(child.text().unwrap_or_default()),
                "journal_ref" => journal_ref = collapse(child.text().unwrap_or_default()),
                "doi" => doi = child.text().unwrap_or_default().trim().to_string(),
                "published" => published = child.text().unwrap_or_default().trim().to_string(),
                "primary_category" => {
                    primary_class = child.attribute("term").unwrap_or_default().to_string();
                }
                "category" if primary_class.is_empty() => {
                    primary_class = child.attribute("term").unwrap_or_default().to_string();
                }
                "author" => {
                    for name_node in child.descendants().filter(|n| n.has_tag_name("name")) {
                        if let Some(name) = name_node.text() {
                            authors.push(ValueItem::Person(parse_person(name.trim())));
                        }
                    }
                }
                _ => {}
            }
        }

        // "http://arxiv.org/abs/1504.00141v1" -> "1504.00141v1"
        let Some(versioned_id) = abs_url.rsplit('/').next().filter(|s| !s.is_empty()) else {
            continue;
        };
        let bare_id = strip_version(versioned_id);

        let mut entry = BibEntry::new(EntryKind::Misc, format!("arXiv:{versioned_id}"));
        if !title.is_empty() {
            entry.set_plain(BibEntry::TITLE, title);
        }
        if !authors.is_empty() {
            entry.insert(BibEntry::AUTHOR, authors);
        }
        if !summary.is_empty() {
            entry.set_plain(BibEntry::ABSTRACT, summary);
        }
        entry.set_verbatim(BibEntry::URL, abs_url.clone());
        entry.set_verbatim("eprint", bare_id.clone());
        entry.set_plain("archiveprefix", "arXiv");
        if !primary_class.is_empty() {
            entry.set_plain("primaryclass", primary_class);
        }
        if doi.is_empty() {
            // Every arXiv e-print has a DataCite DOI derived from its id
            doi = format!("10.48550/arXiv.{bare_id}");
        }
        entry.set_verbatim(BibEntry::DOI, doi);

        // published is "YYYY-MM-DDTHH:MM:SSZ"
        let mut date_parts = published.split('-');
        if let Some(year) = date_parts.next().filter(|y| y.len() == 4) {
            entry.set_plain(BibEntry::YEAR, year);
        }
        if let Some(month_key) = date_parts.next().and_then(month_macro) {
            entry.insert(
                BibEntry::MONTH,
                vec![ValueItem::MacroKey(month_key.to_string())],
            );
        }

        if !journal_ref.is_empty() {
            evaluate_journal(&journal_ref, &mut entry);
        }

        entries.push(entry);
    }
    Ok(entries)
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_version(id: &str) -> String {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    let version = VERSION.get_or_init(|| Regex::new(r"v\d+$").expect("valid"));
    version.replace(id, "").into_owned()
}

/// Ranked patterns for journal reference strings, most specific first.
/// Each pattern names the capture groups it can contribute.
fn journal_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // "New J. Phys. 10 (2008) 033023", "Physics Letters A 297 (2002) 4-8"
            r"(?i)^(?P<journaltitle>[a-z][a-z. &(]+[a-z)])\s*(?P<volume>\d+)\s+\((?P<year>\d{4})\)\s+(?P<pagestart>[0-9A-Z]+)(-{1,2}(?P<pageend>[0-9A-Z]+))?$",
            // "The International Journal of Multimedia & Its Applications, 3(1), 2011"
            r"(?i)^(?P<journaltitle>[a-z][a-z. &(]+[a-z)]),\s*(?P<volume>\d+)\((?P<number>\d+)\),\s*(?P<year>\d{4})$",
            // "International Journal of Quantum Information, Vol. 1, No. 4 (2003) 427-441"
            r"(?i)^(?P<journaltitle>[a-z][a-z. &(]+[a-z)]),\s+Vol\.?\s+(?P<volume>\d+)[,]?\s+No\.?\s+(?P<number>\d+)\s+\((?P<year>\d{4})\)[,]?\s+(pp\.\s+)?(?P<pagestart>\d+)(-{1,2}(?P<pageend>\d+))?$",
            // "Scientometrics, volume 69, number 3, pp. 669-687, 2006"
            r"(?i)^(?P<journaltitle>[a-z][a-z. &(]+[a-z)]),\s+volume\s+(?P<volume>\d+),\s+number\s+(?P<number>\d+),\s+pp\.\s+(?P<pagestart>\d+)(-{1,2}(?P<pageend>\d+))?,\s+(?P<year>\d{4})$",
            // "Phys.Rev.D78:013004,2008", "J.Phys.A40:9025-9032,2007"
            r"(?i)^(?P<journaltitle>[a-z][a-z. &(]+[a-z)])[,]?\s*(?P<volume>\d+)(\((?P<number>\d+)\))?:\s*(?P<pagestart>\d+)(\s*-{1,2}\s*(?P<pageend>\d+))?([, ]\s*\(?(?P<year>\d{4})\)?)?$",
            // "Phys. Rev. A 71, 032339 (2005)"
            r"^(?P<journaltitle>[a-zA-Z][a-zA-Z. &(]+[a-zA-Z)])\s+(vol\.\s+)?(?P<volume>\d+),\s+(?P<number>\d+)(\([A-Z]+\))?\s+\((?P<year>\d{4})\)[.]?$",
            // "Learned Publishing, 20(1) (January 2007) 16-22"
            r"^(?P<journaltitle>[a-zA-Z][a-zA-Z. &(]+[a-zA-Z)]),\s+(?P<volume>\d+)\((?P<number>\d+)\)\s+(\(([A-Za-z]+\s+)?(?P<year>\d{4})\))?\s+(?P<pagestart>\d+)(-{1,2}(?P<pageend>\d+))?$",
            // "Pacific J. Math. 231 (2007), no. 2, 279-291"
            r"^(?P<journaltitle>[a-zA-Z][a-zA-Z. &(]+[a-zA-Z)])\s+(?P<volume>\d+)\s+\((?P<year>\d{4})\), no\.\s+(?P<number>\d+),\s+(?P<pagestart>\d+)[^ 0-9]+(?P<pageend>\d+)$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("journal pattern is valid"))
        .collect()
    })
}

/// Try the ranked journal patterns against a free-text journal reference;
/// on the first match, write the captured groups into structured fields.
/// Without a full match, fall back to guessing journal, year, and pages
/// independently.
pub fn evaluate_journal(journal: &str, entry: &mut BibEntry) {
    if journal.is_empty() {
        return;
    }
    entry.remove(BibEntry::JOURNAL);

    for pattern in journal_patterns() {
        let Some(captures) = pattern.captures(journal) else {
            continue;
        };
        let mut set = |field: &str, name: &str| {
            if let Some(m) = captures.name(name) {
                if !m.as_str().is_empty() {
                    entry.set_plain(field, m.as_str());
                }
            }
        };
        set(BibEntry::JOURNAL, "journaltitle");
        set(BibEntry::VOLUME, "volume");
        set(BibEntry::NUMBER, "number");
        set(BibEntry::YEAR, "year");
        if let Some(start) = captures.name("pagestart") {
            let pages = match captures.name("pageend") {
                Some(end) => format!("{}\u{2013}{}", start.as_str(), end.as_str()),
                None => start.as_str().to_string(),
            };
            entry.set_plain(BibEntry::PAGES, pages);
        }
        return;
    }

    static GENERAL_JOURNAL: OnceLock<Regex> = OnceLock::new();
    static GENERAL_YEAR: OnceLock<Regex> = OnceLock::new();
    static GENERAL_PAGES: OnceLock<Regex> = OnceLock::new();
    let general_journal = GENERAL_JOURNAL
        .get_or_init(|| Regex::new(r"(?i)^[a-z0-9]{0,3}[a-z. ]+").expect("valid"));
    let general_year =
        GENERAL_YEAR.get_or_init(|| Regex::new(r"\b(18|19|20)\d{2}\b").expect("valid"));
    let general_pages = GENERAL_PAGES.get_or_init(|| {
        Regex::new(r"\b(?P<pagestart>[1-9]\d{0,2})\s*-+\s*(?P<pageend>[1-9]\d{0,2})\b")
            .expect("valid")
    });

    if let Some(m) = general_journal.find(journal) {
        entry.set_plain(BibEntry::JOURNAL, m.as_str().trim());
    }
    if let Some(m) = general_year.find(journal) {
        entry.set_plain(BibEntry::YEAR, m.as_str());
    }
    if let Some(captures) = general_pages.captures(journal) {
        let pages = format!("{}\u{2013}{}", &captures["pagestart"], &captures["pageend"]);
        entry.set_plain(BibEntry::PAGES, pages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Person;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <entry>
    <id>http://arxiv.org/abs/1504.00141v1</id>
    <updated>2015-04-01T08:13:29Z</updated>
    <published>2015-04-01T08:13:29Z</published>
    <title>Disjoint Hypercyclicity for families of Taylor-type Operators</title>
    <summary>  A family of Taylor-type operators is studied. </summary>
    <author>
      <name>Vagia Vlachou</name>
    </author>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="math.CV" scheme="http://arxiv.org/schemas/atom"/>
    <category term="math.CV" scheme="http://arxiv.org/schemas/atom"/>
    <link href="http://arxiv.org/abs/1504.00141v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1504.00141v1" rel="related" type="application/pdf"/>
  </entry>
</feed>"#;

    /// Scenario: the arXiv Atom payload maps onto the documented entry.
    #[test]
    fn atom_entry_maps_onto_expected_fields() {
        let entries = parse_atom_feed(ATOM_SAMPLE).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.kind, EntryKind::Misc);
        assert_eq!(entry.id, "arXiv:1504.00141v1");
        assert_eq!(
            entry.field_text(BibEntry::TITLE),
            "Disjoint Hypercyclicity for families of Taylor-type Operators"
        );
        assert_eq!(
            entry.get(BibEntry::AUTHOR).unwrap(),
            &vec![ValueItem::Person(Person::new("Vagia", "Vlachou"))]
        );
        assert_eq!(entry.field_text(BibEntry::YEAR), "2015");
        assert_eq!(
            entry.get(BibEntry::MONTH).unwrap(),
            &vec![ValueItem::MacroKey("apr".to_string())]
        );
        assert_eq!(entry.field_text("eprint"), "1504.00141");
        assert_eq!(entry.field_text("archiveprefix"), "arXiv");
        assert_eq!(entry.field_text("primaryclass"), "math.CV");
        assert_eq!(
            entry.field_text(BibEntry::URL),
            "http://arxiv.org/abs/1504.00141v1"
        );
        assert_eq!(
            entry.field_text(BibEntry::DOI),
            "10.48550/arXiv.1504.00141"
        );
    }

    #[test]
    fn journal_reference_volume_year_pages() {
        let mut entry = BibEntry::new(EntryKind::Misc, "x");
        evaluate_journal("Physics Letters A 297 (2002) 4-8", &mut entry);
        assert_eq!(entry.field_text(BibEntry::JOURNAL), "Physics Letters A");
        assert_eq!(entry.field_text(BibEntry::VOLUME), "297");
        assert_eq!(entry.field_text(BibEntry::YEAR), "2002");
        assert_eq!(entry.field_text(BibEntry::PAGES), "4\u{2013}8");
    }

    #[test]
    fn journal_reference_colon_form() {
        let mut entry = BibEntry::new(EntryKind::Misc, "x");
        evaluate_journal("Phys.Rev.D78:013004,2008", &mut entry);
        assert_eq!(entry.field_text(BibEntry::JOURNAL), "Phys.Rev.D");
        assert_eq!(entry.field_text(BibEntry::VOLUME), "78");
        assert_eq!(entry.field_text(BibEntry::PAGES), "013004");
        assert_eq!(entry.field_text(BibEntry::YEAR), "2008");
    }

    #[test]
    fn journal_reference_vol_no_form() {
        let mut entry = BibEntry::new(EntryKind::Misc, "x");
        evaluate_journal(
            "International Journal of Quantum Information, Vol. 1, No. 4 (2003) 427-441",
            &mut entry,
        );
        assert_eq!(
            entry.field_text(BibEntry::JOURNAL),
            "International Journal of Quantum Information"
        );
        assert_eq!(entry.field_text(BibEntry::NUMBER), "4");
        assert_eq!(entry.field_text(BibEntry::PAGES), "427\u{2013}441");
    }

    #[test]
    fn journal_reference_falls_back_to_general_guessing() {
        let mut entry = BibEntry::new(EntryKind::Misc, "x");
        evaluate_journal(
            "Proceedings of Something Unusual, late 2011 edition, 44-49",
            &mut entry,
        );
        assert_eq!(entry.field_text(BibEntry::YEAR), "2011");
        assert_eq!(entry.field_text(BibEntry::PAGES), "44\u{2013}49");
    }

    #[test]
    fn query_url_joins_terms_with_and() {
        let query = SearchQuery::free_text("disjoint hypercyclicity", 20);
        let url = ArxivSearch::build_query_url(&query).unwrap();
        let text = url.as_str();
        assert!(text.contains("search_query=all:%22disjoint%22+AND+all:%22hypercyclicity%22"));
        assert!(text.contains("max_results=20"));
    }
}
