//! MathSciNet provider: the publication search asked for BibTeX output,
//! records extracted from the `<pre>` blocks of the answer page.

use super::mr_lookup::extract_pre_blocks;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::model::{BibEntry, ValueItem};
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use url::Url;

const SEARCH_BASE: &str = "https://mathscinet.ams.org/mathscinet/search/publications.html";
const MAX_RESULTS: u32 = 20;

pub struct MathSciNetSearch {
    http: HttpClient,
}

impl MathSciNetSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_query_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let mut url = Url::parse(SEARCH_BASE).expect("static URL is valid");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("fmt", "bibtex");
            pairs.append_pair("extend", "1");
            let mut index = 4u8;
            let mut add = |field: &str, text: &str| {
                if !text.trim().is_empty() {
                    pairs.append_pair(&format!("pg{index}"), field);
                    pairs.append_pair(&format!("s{index}"), text.trim());
                    pairs.append_pair(&format!("co{index}"), "AND");
                    index += 1;
                }
            };
            add("TI", query.get(QueryKey::Title));
            add("ICN", query.get(QueryKey::Author));
            add("ALLF", query.get(QueryKey::FreeText));
            let year = query.get(QueryKey::Year).trim();
            if !year.is_empty() {
                pairs.append_pair("dr", "pubyear");
                pairs.append_pair("yrop", "eq");
                pairs.append_pair("arg3", year);
            }
            pairs.append_pair("r", &format!("1:{}", query.num_results.min(MAX_RESULTS)));
        }
        Ok(url)
    }

    /// MathSciNet wraps page ranges in extra dashes and puts review ids
    /// into the pages field; keep only the digits and the range.
    fn sanitize(entry: &mut BibEntry) {
        if let Some(value) = entry.get_mut(BibEntry::PAGES) {
            for item in value.iter_mut() {
                if let ValueItem::PlainText(text) = item {
                    *text = text.replace("--", "\u{2013}");
                }
            }
        }
    }
}

#[async_trait]
impl OnlineSearch for MathSciNetSearch {
    fn label(&self) -> &'static str {
        "MathSciNet"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://mathscinet.ams.org/").expect("static URL is valid")
    }

    async fn execute(
        &self,
        session: &SearchSession,
        query: &SearchQuery,
    ) -> Result<(), SearchError> {
        if query.title.trim().is_empty()
            && query.author.trim().is_empty()
            && query.free_text.trim().is_empty()
        {
            return Err(delayed_stop(SearchError::InvalidArguments(
                "MathSciNet requires a title, an author, or free text".to_string(),
            ))
            .await);
        }

        session.progress_init(1);
        let url = Self::build_query_url(query)?;
        let response = session.guard(self.http.get(&url, None).await)?;
        session.step();
        let html = session.read_text(response).await?;

        let mut bibtex = String::new();
        for block in extract_pre_blocks(&html) {
            if block.contains('@') {
                bibtex.push_str(&block);
                bibtex.push('\n');
            }
        }
        for mut entry in crate::bibtex::parse(&bibtex) {
            Self::sanitize(&mut entry);
            session.publish(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;

    #[test]
    fn query_url_uses_indexed_field_pairs() {
        let mut query = SearchQuery::default();
        query.set(QueryKey::Title, "minimal surfaces");
        query.set(QueryKey::Author, "Meeks");
        query.num_results = 10;
        let url = MathSciNetSearch::build_query_url(&query).unwrap();
        let text = url.as_str();
        assert!(text.contains("fmt=bibtex"));
        assert!(text.contains("pg4=TI"));
        assert!(text.contains("s4=minimal+surfaces"));
        assert!(text.contains("pg5=ICN"));
        assert!(text.contains("s5=Meeks"));
    }

    #[test]
    fn sanitize_normalizes_page_ranges() {
        let mut entry = BibEntry::new(EntryKind::Article, "mr1");
        entry.set_plain(BibEntry::PAGES, "279--291");
        MathSciNetSearch::sanitize(&mut entry);
        assert_eq!(entry.field_text(BibEntry::PAGES), "279\u{2013}291");
    }
}
