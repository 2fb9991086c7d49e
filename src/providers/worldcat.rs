//! OCLC WorldCat provider: the SRU catalog search, Dublin Core records.
//! WorldCat insists on a title or author; a query with neither terminates
//! immediately with invalid arguments.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, EntryKind};
use crate::search::query::extract_isbn;
use crate::search::spec_parser::{parse_xml_entries, FieldRule, RuleValue, XmlEntrySpec};
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use tracing::warn;
use url::Url;

const SRU_BASE: &str = "https://www.worldcat.org/webservices/catalog/search/sru";
const MAX_RESULTS: u32 = 20;

const WORLDCAT_SPEC: XmlEntrySpec = XmlEntrySpec {
    entry_path: "searchRetrieveResponse/records/record/recordData/oclcdcs",
    kind: EntryKind::Book,
    id_path: "recordIdentifier",
    id_prefix: "oclc",
    fields: &[
        FieldRule {
            field: BibEntry::TITLE,
            path: "title",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::AUTHOR,
            path: "creator",
            value: RuleValue::PersonList { first_path: "" },
        },
        FieldRule {
            field: BibEntry::YEAR,
            path: "date",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::PUBLISHER,
            path: "publisher",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: "identifiers",
            path: "identifier",
            value: RuleValue::Plain,
        },
        FieldRule {
            field: BibEntry::ABSTRACT,
            path: "description",
            value: RuleValue::Plain,
        },
    ],
};

pub struct WorldCatSearch {
    http: HttpClient,
    wskey: String,
}

impl WorldCatSearch {
    #[must_use]
    pub fn new(http: HttpClient, wskey: String) -> Self {
        Self { http, wskey }
    }

    fn build_query_url(&self, query: &SearchQuery) -> Result<Url, SearchError> {
        let mut clauses = Vec::new();
        let title = query.get(QueryKey::Title).trim();
        if !title.is_empty() {
            clauses.push(format!("srw.ti all \"{title}\""));
        }
        let author = query.get(QueryKey::Author).trim();
        if !author.is_empty() {
            clauses.push(format!("srw.au all \"{author}\""));
        }
        let year = query.get(QueryKey::Year).trim();
        if !year.is_empty() {
            clauses.push(format!("srw.yr any \"{year}\""));
        }

        let mut url = Url::parse(SRU_BASE).expect("static URL is valid");
        url.query_pairs_mut()
            .append_pair("query", &clauses.join(" and "))
            .append_pair("maximumRecords", &query.num_results.min(MAX_RESULTS).to_string())
            .append_pair("recordSchema", "info:srw/schema/1/dc")
            .append_pair("wskey", &self.wskey);
        Ok(url)
    }

    /// Pull an ISBN out of the mixed `identifier` elements.
    fn sanitize(entry: &mut BibEntry) {
        if let Some(identifiers) = entry.remove("identifiers") {
            for item in identifiers {
                if let Some(isbn) = extract_isbn(&item.text()) {
                    entry.set_plain(BibEntry::ISBN, isbn);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl OnlineSearch for WorldCatSearch {
    fn label(&self) -> &'static str {
        "OCLC WorldCat"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://www.worldcat.org/").expect("static URL is valid")
    }

    async fn execute(
        &self,
        session: &SearchSession,
        query: &SearchQuery,
    ) -> Result<(), SearchError> {
        if query.title.trim().is_empty() && query.author.trim().is_empty() {
            return Err(delayed_stop(SearchError::InvalidArguments(
                "WorldCat requires a title or an author".to_string(),
            ))
            .await);
        }
        if self.wskey.is_empty() {
            warn!("WorldCat has no wskey configured");
            return Err(delayed_stop(SearchError::AuthorizationRequired(
                "WorldCat requires a wskey".to_string(),
            ))
            .await);
        }

        session.progress_init(1);
        let url = self.build_query_url(query)?;
        let response = session.guard(self.http.get(&url, None).await)?;
        session.step();
        let body = session.read_text(response).await?;

        for mut entry in parse_xml_entries(&WORLDCAT_SPEC, &body)? {
            Self::sanitize(&mut entry);
            session.publish(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRU_SAMPLE: &str = r"<searchRetrieveResponse>
      <records>
        <record>
          <recordData>
            <oclcdcs>
              <recordIdentifier>42912983</recordIdentifier>
              <title>The art of computer programming</title>
              <creator>Knuth, Donald Ervin</creator>
              <date>1997</date>
              <publisher>Addison-Wesley</publisher>
              <identifier>0201896834</identifier>
              <identifier>urn:lccn:97002147</identifier>
            </oclcdcs>
          </recordData>
        </record>
      </records>
    </searchRetrieveResponse>";

    #[test]
    fn sru_record_maps_and_isbn_is_isolated() {
        let mut entries = parse_xml_entries(&WORLDCAT_SPEC, SRU_SAMPLE).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &mut entries[0];
        WorldCatSearch::sanitize(entry);
        assert_eq!(entry.id, "oclc42912983");
        assert_eq!(entry.field_text(BibEntry::ISBN), "0201896834");
        assert!(!entry.contains("identifiers"));
        assert_eq!(entry.first_author().unwrap().last, "Knuth");
    }

    #[test]
    fn query_url_requires_wskey_redaction() {
        let engine = WorldCatSearch::new(HttpClient::new().unwrap(), "wc-key".to_string());
        let mut query = SearchQuery::default();
        query.set(QueryKey::Title, "algorithms");
        query.num_results = 10;
        let url = engine.build_query_url(&query).unwrap();
        assert!(url.as_str().contains("wskey=wc-key"));
        assert!(!crate::http::remove_api_key(&url).contains("wc-key"));
    }
}
