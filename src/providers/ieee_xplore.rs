//! IEEE Xplore provider: the articles API queried in XML form. Author
//! lists arrive as one semicolon-separated string in `x-author`; the
//! provider's sanitize step re-splits them through the BibTeX collaborator.

use crate::bibtex::split_names;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, EntryKind, ValueItem};
use crate::search::spec_parser::{parse_xml_entries, FieldRule, RuleValue, XmlEntrySpec};
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use tracing::warn;
use url::Url;

const API_BASE: &str = "https://ieeexploreapi.ieee.org/api/v1/search/articles";
const MAX_RESULTS: u32 = 25;

const IEEE_SPEC: XmlEntrySpec = XmlEntrySpec {
    entry_path: "articles/article",
    kind: EntryKind::Article,
    id_path: "article_number",
    id_prefix: "ieee",
    fields: &[
        FieldRule {
            field: BibEntry::TITLE,
            path: "title",
            value: RuleValue::Plain,
        },
        // Joined author string; re-split during sanitize
        FieldRule {
            field: "x-author",
            path: "authors/author/full_name",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::JOURNAL,
            path: "publication_title",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::YEAR,
            path: "publication_year",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::VOLUME,
            path: "volume",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::NUMBER,
            path: "issue",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: "pagestart",
            path: "start_page",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: "pageend",
            path: "end_page",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::DOI,
            path: "doi",
            value: RuleValue::Verbatim,
        },
        FieldRule {
            field: BibEntry::ABSTRACT,
            path: "abstract",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::ISSN,
            path: "issn",
            value: RuleValue::Plain,
        },
    ],
};

pub struct IeeeXploreSearch {
    http: HttpClient,
    api_key: String,
}

impl IeeeXploreSearch {
    #[must_use]
    pub fn new(http: HttpClient, api_key: String) -> Self {
        Self { http, api_key }
    }

    fn build_query_url(&self, query: &SearchQuery) -> Result<Url, SearchError> {
        let mut url = Url::parse(API_BASE).expect("static URL is valid");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "xml");
            pairs.append_pair("max_records", &query.num_results.min(MAX_RESULTS).to_string());
            pairs.append_pair("apikey", &self.api_key);
            let title = query.get(QueryKey::Title).trim();
            if !title.is_empty() {
                pairs.append_pair("article_title", title);
            }
            let author = query.get(QueryKey::Author).trim();
            if !author.is_empty() {
                pairs.append_pair("author", author);
            }
            let year = query.get(QueryKey::Year).trim();
            if !year.is_empty() {
                pairs.append_pair("publication_year", year);
            }
            let free = query.get(QueryKey::FreeText).trim();
            if !free.is_empty() {
                pairs.append_pair("querytext", free);
            }
        }
        Ok(url)
    }

    /// Merge `pagestart`/`pageend` into `pages` and rebuild `author` from
    /// the joined `x-author` string.
    fn sanitize(entry: &mut BibEntry) {
        let start = entry.field_text("pagestart");
        let end = entry.field_text("pageend");
        entry.remove("pagestart");
        entry.remove("pageend");
        if !start.is_empty() {
            let pages = if end.is_empty() {
                start
            } else {
                format!("{start}\u{2013}{end}")
            };
            entry.set_plain(BibEntry::PAGES, pages);
        }

        if let Some(joined) = entry.remove("x-author") {
            let text = joined
                .iter()
                .map(ValueItem::text)
                .collect::<Vec<_>>()
                .join("; ");
            let persons: Vec<ValueItem> = split_names(&text)
                .into_iter()
                .map(ValueItem::Person)
                .collect();
            if !persons.is_empty() {
                entry.insert(BibEntry::AUTHOR, persons);
            }
        }
    }
}

#[async_trait]
impl OnlineSearch for IeeeXploreSearch {
    fn label(&self) -> &'static str {
        "IEEE Xplore"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://ieeexplore.ieee.org/").expect("static URL is valid")
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
        if self.api_key.is_empty() {
            warn!("IEEE Xplore has no API key configured");
            return Err(delayed_stop(SearchError::AuthorizationRequired(
                "IEEE Xplore requires an API key".to_string(),
            ))
            .await);
        }

        session.progress_init(1);
        let url = self.build_query_url(query)?;
        let response = session.guard(self.http.get(&url, None).await)?;
        session.step();
        let body = session.read_text(response).await?;

        for mut entry in parse_xml_entries(&IEEE_SPEC, &body)? {
            Self::sanitize(&mut entry);
            session.publish(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XPLORE_SAMPLE: &str = r"<articles>
      <article>
        <article_number>9087654</article_number>
        <title>Low-power mesh routing</title>
        <authors>
          <author><full_name>Amira K. Hassan</full_name></author>
          <author><full_name>Li Wei</full_name></author>
        </authors>
        <publication_title>IEEE Transactions on Networking</publication_title>
        <publication_year>2020</publication_year>
        <volume>28</volume>
        <issue>5</issue>
        <start_page>2011</start_page>
        <end_page>2024</end_page>
        <doi>10.1109/TNET.2020.1234567</doi>
        <issn>1063-6692</issn>
      </article>
    </articles>";

    #[test]
    fn article_maps_and_sanitize_rebuilds_authors_and_pages() {
        let mut entries = parse_xml_entries(&IEEE_SPEC, XPLORE_SAMPLE).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &mut entries[0];
        assert_eq!(entry.id, "ieee9087654");
        assert!(entry.contains("x-author"));

        IeeeXploreSearch::sanitize(entry);
        assert!(!entry.contains("x-author"));
        assert!(!entry.contains("pagestart"));
        assert_eq!(entry.field_text(BibEntry::PAGES), "2011\u{2013}2024");
        let authors = entry.get(BibEntry::AUTHOR).unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[0].text(), "Amira K. Hassan");
        assert_eq!(authors[1].text(), "Li Wei");
    }

    #[test]
    fn missing_api_key_is_detectable() {
        let engine = IeeeXploreSearch::new(HttpClient::new().unwrap(), String::new());
        assert!(engine.api_key.is_empty());
    }
}
