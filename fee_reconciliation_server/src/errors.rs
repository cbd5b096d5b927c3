use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use fee_reconciliation_engine::{FeeStoreError, SyncError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(String),
    #[error("{0}")]
    RunInProgress(String),
    #[error("The marketplace feed is unavailable. {0}")]
    FeedUnavailable(String),
    #[error("The backfill queue is full. Try again later.")]
    QueueFull,
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::RunInProgress(_) => StatusCode::CONFLICT,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::FeedUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<SyncError> for ServerError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::RunInProgress { .. } => Self::RunInProgress(e.to_string()),
            SyncError::Authentication(s) => Self::AuthenticationError(s),
            SyncError::InvalidRequest(s) => Self::InvalidRequestBody(s),
            SyncError::Feed(e) => Self::FeedUnavailable(e.to_string()),
            SyncError::Database(s) => Self::BackendError(format!("Database error: {s}")),
            e @ SyncError::InvalidTransition { .. } => Self::BackendError(e.to_string()),
        }
    }
}

impl From<FeeStoreError> for ServerError {
    fn from(e: FeeStoreError) -> Self {
        Self::BackendError(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use fee_reconciliation_engine::{db_types::SyncKind, feeds::FeedError};

    use super::*;

    #[test]
    fn sync_errors_map_to_status_codes() {
        let busy = SyncError::RunInProgress { user_id: "alice".into(), kind: SyncKind::Ledger };
        assert_eq!(ServerError::from(busy).status_code(), StatusCode::CONFLICT);
        let auth = SyncError::Authentication("expired".into());
        assert_eq!(ServerError::from(auth).status_code(), StatusCode::UNAUTHORIZED);
        let bad = SyncError::InvalidRequest("monthsBack must be at least 1".into());
        assert_eq!(ServerError::from(bad).status_code(), StatusCode::BAD_REQUEST);
        let feed = SyncError::Feed(FeedError::Malformed("bad json".into()));
        assert_eq!(ServerError::from(feed).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ServerError::QueueFull.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn errors_render_as_json() {
        let res = ServerError::NoRecordFound("order 111-222".into()).error_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers().get("content-type").unwrap(), "application/json");
    }
}
