use thiserror::Error;

use crate::{
    db_types::SyncKind,
    traits::{AccountFeeManagement, FeeBreakdownManagement, LineItemStore, SyncStateManagement},
};

#[derive(Debug, Clone, Error)]
pub enum FeeStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("A {kind} sync is already running for user {user_id}")]
    RunInProgress { user_id: String, kind: SyncKind },
    #[error("Sync run #{0} does not exist")]
    RunNotFound(i64),
    #[error("Line item {0} does not exist")]
    LineItemNotFound(String),
    #[error("Invalid data in the database: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for FeeStoreError {
    fn from(e: sqlx::Error) -> Self {
        FeeStoreError::DatabaseError(e.to_string())
    }
}

/// The highest level of behaviour a backend must provide to support the reconciliation engine.
#[allow(async_fn_in_trait)]
pub trait FeeReconciliationDatabase:
    Clone + LineItemStore + FeeBreakdownManagement + AccountFeeManagement + SyncStateManagement
{
    /// The URL of the database
    fn url(&self) -> &str;

    async fn close(&mut self) -> Result<(), FeeStoreError>;
}
