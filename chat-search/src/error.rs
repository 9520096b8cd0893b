use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing Slack API token")]
    MissingToken,

    #[error("Could not resolve acting user identity: {0}")]
    MissingIdentity(String),

    #[error("Slack API error in {method}: {error}")]
    Api { method: String, error: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl SearchError {
    /// Errors that abort a whole search request rather than one sub-step.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SearchError::Config(_) | SearchError::MissingToken | SearchError::MissingIdentity(_)
        )
    }

    pub(crate) fn api(method: &str, error: impl Into<String>) -> Self {
        SearchError::Api {
            method: method.to_string(),
            error: error.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
