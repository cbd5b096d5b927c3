use thiserror::Error;

use crate::{
    db_types::{SyncKind, SyncStage},
    feeds::FeedError,
    traits::FeeStoreError,
};

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("A {kind} sync is already running for user {user_id}")]
    RunInProgress { user_id: String, kind: SyncKind },
    #[error("The marketplace rejected the credentials: {0}")]
    Authentication(String),
    #[error("Feed error: {0}")]
    Feed(FeedError),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Illegal sync stage transition from {from} to {to}")]
    InvalidTransition { from: SyncStage, to: SyncStage },
    #[error("Invalid sync request: {0}")]
    InvalidRequest(String),
}

impl From<FeedError> for SyncError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Authentication(s) => SyncError::Authentication(s),
            e => SyncError::Feed(e),
        }
    }
}

impl From<FeeStoreError> for SyncError {
    fn from(e: FeeStoreError) -> Self {
        match e {
            FeeStoreError::RunInProgress { user_id, kind } => SyncError::RunInProgress { user_id, kind },
            e => SyncError::Database(e.to_string()),
        }
    }
}
