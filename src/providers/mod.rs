//! The provider fleet. Each module implements [`crate::search::OnlineSearch`]
//! for one scholarly backend; [`all_engines`] assembles the full roster for
//! the federator.

pub mod acm;
pub mod arxiv;
pub mod bibsonomy;
pub mod biorxiv;
pub mod doi;
pub mod google_books;
pub mod google_scholar;
pub mod ideas_repec;
pub mod ieee_xplore;
pub mod ingenta_connect;
pub mod inspire_hep;
pub mod isbndb;
pub mod jstor;
pub mod mathscinet;
pub mod mr_lookup;
pub mod nasa_ads;
pub mod pubmed;
pub mod semantic_scholar;
mod simple_bibtex;
pub mod springer;
pub mod unpaywall;
pub mod worldcat;
pub mod zbmath;

pub use acm::AcmPortalSearch;
pub use arxiv::ArxivSearch;
pub use bibsonomy::BibsonomySearch;
pub use biorxiv::BiorxivSearch;
pub use doi::DoiSearch;
pub use google_books::GoogleBooksSearch;
pub use google_scholar::GoogleScholarSearch;
pub use ideas_repec::IdeasRepecSearch;
pub use ieee_xplore::IeeeXploreSearch;
pub use ingenta_connect::IngentaConnectSearch;
pub use inspire_hep::InspireHepSearch;
pub use isbndb::IsbnDbSearch;
pub use jstor::JstorSearch;
pub use mathscinet::MathSciNetSearch;
pub use mr_lookup::MrLookupSearch;
pub use nasa_ads::NasaAdsSearch;
pub use pubmed::PubMedSearch;
pub use semantic_scholar::SemanticScholarSearch;
pub use springer::SpringerLinkSearch;
pub use unpaywall::UnpaywallSearch;
pub use worldcat::WorldCatSearch;
pub use zbmath::ZbMathSearch;

use crate::config::Settings;
use crate::http::HttpClient;
use crate::search::OnlineSearch;
use std::sync::Arc;

/// Every provider the crate knows, sharing one HTTP client. Credentials
/// are taken from the settings; key-less instances of keyed providers
/// terminate with `AuthorizationRequired` when started.
#[must_use]
pub fn all_engines(http: &HttpClient, settings: &Settings) -> Vec<Arc<dyn OnlineSearch>> {
    let key = |name: &str| settings.credentials_for(name);
    vec![
        Arc::new(AcmPortalSearch::new(http.clone())),
        Arc::new(ArxivSearch::new(http.clone())),
        Arc::new(BibsonomySearch::new(http.clone())),
        Arc::new(BiorxivSearch::new(http.clone())),
        Arc::new(DoiSearch::new(http.clone())),
        Arc::new(GoogleBooksSearch::new(http.clone())),
        Arc::new(GoogleScholarSearch::new(http.clone())),
        Arc::new(IdeasRepecSearch::new(http.clone())),
        Arc::new(IeeeXploreSearch::new(http.clone(), key("ieeexplore").api_key)),
        Arc::new(IngentaConnectSearch::new(http.clone())),
        Arc::new(InspireHepSearch::new(http.clone())),
        Arc::new(IsbnDbSearch::new(http.clone(), key("isbndb").api_key)),
        Arc::new(JstorSearch::new(http.clone())),
        Arc::new(MathSciNetSearch::new(http.clone())),
        Arc::new(MrLookupSearch::new(http.clone())),
        Arc::new(NasaAdsSearch::new(http.clone(), key("nasaads").api_key)),
        Arc::new(PubMedSearch::new(http.clone())),
        Arc::new(SemanticScholarSearch::new(
            http.clone(),
            key("semanticscholar").api_key,
        )),
        Arc::new(SpringerLinkSearch::new(
            http.clone(),
            key("springerlink").api_key,
        )),
        Arc::new(UnpaywallSearch::new(http.clone(), key("unpaywall").email)),
        Arc::new(WorldCatSearch::new(http.clone(), key("oclcworldcat").api_key)),
        Arc::new(ZbMathSearch::new(http.clone())),
    ]
}

/// The engines enabled by the configuration, in roster order.
#[must_use]
pub fn enabled_engines(http: &HttpClient, settings: &Settings) -> Vec<Arc<dyn OnlineSearch>> {
    all_engines(http, settings)
        .into_iter()
        .filter(|engine| settings.is_engine_enabled(&engine.name()))
        .collect()
}
