//! MR Lookup provider: one POST against the AMS lookup form, which answers
//! with an HTML page embedding BibTeX records in `<pre>` blocks.

use super::simple_bibtex::publish_bibtex;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::search::helpers::{encode_url, split_respecting_quotation_marks};
use crate::search::{delayed_stop, OnlineSearch, QueryKey, SearchQuery, SearchSession};
use async_trait::async_trait;
use url::Url;

const LOOKUP_URL: &str = "https://mathscinet.ams.org/mrlookup";

pub struct MrLookupSearch {
    http: HttpClient,
}

impl MrLookupSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_body(query: &SearchQuery) -> String {
        let join = |text: &str| {
            split_respecting_quotation_marks(text)
                .iter()
                .map(|t| encode_url(t.trim_matches('"')))
                .collect::<Vec<_>>()
                .join("+")
        };
        let mut author = join(query.get(QueryKey::Author));
        let free = join(query.get(QueryKey::FreeText));
        if !free.is_empty() {
            if !author.is_empty() {
                author.push('+');
            }
            author.push_str(&free);
        }
        format!(
            "bibtex=checked&ti={}&au={}&year={}&firstpage=&lastpage=&arg3=&s3=",
            join(query.get(QueryKey::Title)),
            author,
            encode_url(query.get(QueryKey::Year)),
        )
    }
}

#[async_trait]
impl OnlineSearch for MrLookupSearch {
    fn label(&self) -> &'static str {
        "MR Lookup"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://mathscinet.ams.org/mrlookup").expect("static URL is valid")
    }

    async fn execute(
        &self,
        session: &SearchSession,
        query: &SearchQuery,
    ) -> Result<(), SearchError> {
        if query.title.trim().is_empty() && query.author.trim().is_empty() {
            return Err(delayed_stop(SearchError::InvalidArguments(
                "MR Lookup requires a title or an author".to_string(),
            ))
            .await);
        }

        session.progress_init(1);
        let url = Url::parse(LOOKUP_URL).expect("static URL is valid");
        let body = Self::build_body(query);
        let response = session.guard(self.http.post_form(&url, body, None).await)?;
        session.step();
        let html = session.read_text(response).await?;

        // BibTeX records are embedded in <pre> blocks of the answer page
        let mut bibtex = String::new();
        for block in extract_pre_blocks(&html) {
            if block.contains('@') {
                bibtex.push_str(&block);
                bibtex.push('\n');
            }
        }
        publish_bibtex(session, &bibtex)?;
        Ok(())
    }
}

/// Content of every `<pre>...</pre>` block, entities resolved.
pub(crate) fn extract_pre_blocks(html: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    // ASCII lowering keeps byte offsets aligned with the original text
    let lowered = html.to_ascii_lowercase();
    let mut from = 0usize;
    while let Some(start) = lowered[from..].find("<pre").map(|p| p + from) {
        let Some(open_end) = lowered[start..].find('>').map(|p| p + start + 1) else {
            break;
        };
        let Some(end) = lowered[open_end..].find("</pre>").map(|p| p + open_end) else {
            break;
        };
        let block = html[open_end..end]
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"");
        blocks.push(block);
        from = end + "</pre>".len();
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_blocks_are_extracted_and_unescaped() {
        let html = "<html><body><pre class=\"x\">@article{mr1, title = {A &amp; B}}</pre>\n<p>noise</p><pre>@book{mr2, title = {C}}</pre></body></html>";
        let blocks = extract_pre_blocks(html);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].contains("A & B"));
        assert!(blocks[1].contains("@book{mr2"));
    }

    #[test]
    fn body_contains_query_fields() {
        let mut query = SearchQuery::default();
        query.set(QueryKey::Title, "minimal surfaces");
        query.set(QueryKey::Author, "Meeks");
        query.set(QueryKey::Year, "2005");
        query.num_results = 10;
        let body = MrLookupSearch::build_body(&query);
        assert!(body.contains("ti=minimal+surfaces"));
        assert!(body.contains("au=Meeks"));
        assert!(body.contains("year=2005"));
        assert!(body.starts_with("bibtex=checked"));
    }
}
