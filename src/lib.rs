//! bibfetch - Federated bibliographic metadata fetcher
//!
//! Given a user query (free text, title, author, year, DOI, ISBN, or arXiv
//! id), this crate dispatches parallel searches to a fleet of scholarly
//! providers (`arXiv`, `PubMed`, `IEEE Xplore`, `ACM`, `SpringerLink`, and
//! many more), streams normalized bibliographic entries back to the
//! consumer, and tracks aggregate progress.

pub mod associated_files;
pub mod bibliography;
pub mod bibtex;
pub mod config;
pub mod error;
pub mod favicon;
pub mod http;
pub mod model;
pub mod providers;
pub mod search;
pub mod urlcheck;
pub mod zotero;

pub use bibliography::Bibliography;
pub use config::{Settings, SortOrder};
pub use error::{Error, Result, SearchError, SearchOutcome};
pub use favicon::FavIconLocator;
pub use http::HttpClient;
pub use model::{BibEntry, EntryKind, Person, Value, ValueItem};
pub use search::federator::{FederatedEvent, FederatedSearch, SearchFederator};
pub use search::{OnlineSearch, QueryKey, SearchEvent, SearchQuery};
pub use urlcheck::{UrlCheckEvent, UrlChecker, UrlStatus};
pub use zotero::{ZoteroCredentials, ZoteroOAuth};

/// Install a `tracing` subscriber honoring `RUST_LOG`, for binaries and
/// tests embedding the crate. Calling it twice is harmless.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
