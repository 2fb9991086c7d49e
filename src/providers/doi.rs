//! DOI resolver provider: a query carrying a DOI is answered by asking
//! `doi.org` for a BibTeX rendition via content negotiation.

use super::simple_bibtex::fetch_bibliography_content;
use crate::error::SearchError;
use crate::http::HttpClient;
use crate::search::{delayed_stop, OnlineSearch, SearchQuery, SearchSession};
use async_trait::async_trait;
use url::Url;

pub struct DoiSearch {
    http: HttpClient,
}

impl DoiSearch {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl OnlineSearch for DoiSearch {
    fn label(&self) -> &'static str {
        "DOI"
    }

    fn homepage(&self) -> Url {
        Url::parse("https://dx.doi.org/").expect("static URL is valid")
    }

    async fn execute(
        &self,
        session: &SearchSession,
        query: &SearchQuery,
    ) -> Result<(), SearchError> {
        let Some(doi) = query.doi() else {
            return Err(delayed_stop(SearchError::InvalidArguments(
                "query contains no DOI".to_string(),
            ))
            .await);
        };

        session.progress_init(1);
        let url = Url::parse(&format!("https://dx.doi.org/{doi}"))
            .map_err(|e| SearchError::Unspecified(e.to_string()))?;
        fetch_bibliography_content(&self.http, session, &url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_and_name() {
        let engine = DoiSearch::new(HttpClient::new().unwrap());
        assert_eq!(engine.label(), "DOI");
        assert_eq!(engine.name(), "doi");
    }
}
