//! Bibsonomy provider: the `/bib/` endpoints deliver BibTeX directly for a
//! search expression or a tag.

use super::simple_bibtex::fetch_and_publish;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::search::helpers::encode_url;
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use url::Url;

const BASE_URL: &str = "https://www.bibsonomy.org";
const MAX_RESULTS: u32 = 100;

pub struct BibsonomySearch {
    http: HttpClient,
}

impl BibsonomySearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn build_query_url(query: &SearchQuery) -> Result<Url, SearchError> {
        let items = query.num_results.min(MAX_RESULTS);
        // The most specific non-empty field decides which listing is used
        let (path, term) = if !query.author.trim().is_empty() {
            ("author", query.author.trim())
        } else if !query.title.trim().is_empty() {
            ("search", query.title.trim())
        } else {
            ("search", query.free_text.trim())
        };
        let url = format!(
            "{BASE_URL}/bib/{path}/{}?items={items}",
            encode_url(term)
        );
        Url::parse(&url).map_err(|e| SearchError::Unspecified(e.to_string()))
    }
}

#[async_trait]
impl OnlineSearch for BibsonomySearch {
    fn label(&self) -> &'static str {
        "Bibsonomy"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://www.bibsonomy.org/").expect("static URL is valid")
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
        fetch_and_publish(&self.http, session, &url, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::QueryKey;

    #[test]
    fn author_query_uses_author_listing() {
        let mut query = SearchQuery::default();
        query.set(QueryKey::Author, "Knuth");
        query.num_results = 20;
        let url = BibsonomySearch::build_query_url(&query).unwrap();
        assert!(url.as_str().contains("/bib/author/Knuth?items=20"));
    }

    #[test]
    fn free_text_query_uses_search_listing() {
        let query = SearchQuery::free_text("literate programming", 10);
        let url = BibsonomySearch::build_query_url(&query).unwrap();
        assert!(url.as_str().contains("/bib/search/literate+programming?items=10"));
    }
}
