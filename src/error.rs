use thiserror::Error;

/// Terminal status of a provider search.
///
/// `Success` and `Cancelled` share the legacy numeric code 0: both are
/// clean completions from the consumer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchOutcome {
    Success,
    Cancelled,
    UnspecifiedError,
    AuthorizationRequired,
    NetworkError,
    InvalidArguments,
}

impl SearchOutcome {
    /// Numeric code compatible with the historical result constants.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success | Self::Cancelled => 0,
            Self::UnspecifiedError | Self::InvalidArguments => 1,
            Self::AuthorizationRequired => 2,
            Self::NetworkError => 3,
        }
    }

    /// Whether the search ended without a reportable error.
    #[must_use]
    pub const fn is_clean(self) -> bool {
        matches!(self, Self::Success | Self::Cancelled)
    }
}

impl std::fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::Cancelled => "cancelled",
            Self::UnspecifiedError => "unspecified error",
            Self::AuthorizationRequired => "authorization required",
            Self::NetworkError => "network error",
            Self::InvalidArguments => "invalid arguments",
        };
        f.write_str(text)
    }
}

/// Errors raised while one provider search is running.
///
/// Every variant maps onto exactly one [`SearchOutcome`]; the search runner
/// converts the error returned by a provider into the single terminal event
/// of that search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search was cancelled")]
    Cancelled,

    #[error("{0}")]
    Unspecified(String),

    #[error("authorization required: {0}")]
    AuthorizationRequired(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl SearchError {
    /// The terminal status this error maps to.
    #[must_use]
    pub const fn outcome(&self) -> SearchOutcome {
        match self {
            Self::Cancelled => SearchOutcome::Cancelled,
            Self::Unspecified(_) => SearchOutcome::UnspecifiedError,
            Self::AuthorizationRequired(_) => SearchOutcome::AuthorizationRequired,
            Self::Network(_) => SearchOutcome::NetworkError,
            Self::InvalidArguments(_) => SearchOutcome::InvalidArguments,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::Network(err.to_string());
        }
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::PROXY_AUTHENTICATION_REQUIRED
            {
                return Self::AuthorizationRequired(err.to_string());
            }
        }
        Self::Unspecified(err.to_string())
    }
}

/// Crate-wide error type for the non-search surfaces (configuration,
/// filesystem, credential exchange).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error("OAuth exchange failed: {0}")]
    OAuth(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_shares_code_with_success() {
        assert_eq!(SearchOutcome::Success.code(), SearchOutcome::Cancelled.code());
        assert!(SearchOutcome::Cancelled.is_clean());
        assert!(!SearchOutcome::NetworkError.is_clean());
    }

    #[test]
    fn error_to_outcome_mapping() {
        assert_eq!(SearchError::Cancelled.outcome(), SearchOutcome::Cancelled);
        assert_eq!(
            SearchError::Network("host not found".into()).outcome(),
            SearchOutcome::NetworkError
        );
        assert_eq!(
            SearchError::InvalidArguments("missing title".into()).outcome(),
            SearchOutcome::InvalidArguments
        );
    }
}
