use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketplaceApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String, retry_after: Option<Duration> },
    #[error("The feed returned an empty response")]
    EmptyResponse,
    #[error("The feed returned errors: {0}")]
    FeedErrors(String),
    #[error("Unsupported document compression: {0}")]
    UnsupportedCompression(String),
}

impl MarketplaceApiError {
    /// The HTTP status of a failed query, if the failure came from the remote end.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::QueryError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The delay the server asked for via a `Retry-After` header, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::QueryError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
