//! Shape A scaffold: providers that answer a single request with a BibTeX
//! document. The concrete provider builds the URL; the fetch, the parse,
//! and the publishing are shared here.

use crate::error::SearchError;
use crate::http::HttpClient;
use crate::search::SearchSession;
use tracing::warn;
use url::Url;

/// Download `url`, parse the body as BibTeX, and publish every entry.
/// Returns the number of entries published.
pub(crate) async fn fetch_and_publish(
    http: &HttpClient,
    session: &SearchSession,
    url: &Url,
    referer: Option<&Url>,
) -> Result<usize, SearchError> {
    let response = session.guard(http.get(url, referer).await)?;
    session.step();
    let body = session.read_text(response).await?;
    publish_bibtex(session, &body)
}

/// Parse a BibTeX body and publish its entries.
pub(crate) fn publish_bibtex(
    session: &SearchSession,
    body: &str,
) -> Result<usize, SearchError> {
    let entries = crate::bibtex::parse(body);
    if entries.is_empty() && !body.trim().is_empty() {
        warn!(
            provider = session.label(),
            "Response contained no BibTeX entries"
        );
    }
    let mut published = 0usize;
    for entry in entries {
        if session.publish(entry) {
            published += 1;
        }
    }
    Ok(published)
}

/// Same as [`fetch_and_publish`] but with content negotiation for BibTeX,
/// as DOI resolvers expect.
pub(crate) async fn fetch_bibliography_content(
    http: &HttpClient,
    session: &SearchSession,
    url: &Url,
) -> Result<usize, SearchError> {
    let request = http
        .inner()
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "text/bibliography; style=bibtex")
        .timeout(crate::http::DEFAULT_TIMEOUT);
    let response = session.guard(request.send().await)?;
    session.step();
    let body = session.read_text(response).await?;
    publish_bibtex(session, &body)
}
