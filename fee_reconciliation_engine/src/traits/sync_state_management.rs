use chrono::{DateTime, Duration, Utc};

use crate::{
    db_types::{PageContinuation, ProcessedSettlementReport, SyncCursor, SyncKind, SyncRun},
    traits::FeeStoreError,
};

/// Sync run bookkeeping.
#[allow(async_fn_in_trait)]
pub trait SyncStateManagement {
    /// Creates a new active run, which acts as the lock for `(user_id, kind)`.
    ///
    /// Fails with [`FeeStoreError::RunInProgress`] if another active run holds the lock. An active run older than
    /// `stale_after` is assumed to belong to a crashed process: it is marked failed and the lock is taken over.
    async fn start_sync_run(
        &self,
        user_id: &str,
        kind: SyncKind,
        stale_after: Duration,
    ) -> Result<SyncRun, FeeStoreError>;

    /// Persists the stage, counters and outcome of a run. Setting `finished_at` releases the lock.
    async fn save_sync_run(&self, run: &SyncRun) -> Result<SyncRun, FeeStoreError>;

    async fn fetch_sync_run(&self, id: i64) -> Result<Option<SyncRun>, FeeStoreError>;

    /// The most recent runs for a user, newest first.
    async fn fetch_recent_sync_runs(&self, user_id: &str, limit: i64) -> Result<Vec<SyncRun>, FeeStoreError>;

    async fn fetch_cursor(&self, user_id: &str, kind: SyncKind) -> Result<Option<SyncCursor>, FeeStoreError>;

    /// Saves how far a `(user, kind)` got. `continuation` is set when `position` starts a window that still has
    /// unread pages.
    async fn save_cursor(
        &self,
        user_id: &str,
        kind: SyncKind,
        range_start: Option<DateTime<Utc>>,
        position: &str,
        continuation: Option<&PageContinuation>,
    ) -> Result<SyncCursor, FeeStoreError>;

    async fn clear_cursor(&self, user_id: &str, kind: SyncKind) -> Result<(), FeeStoreError>;

    async fn is_settlement_report_processed(&self, user_id: &str, report_id: &str) -> Result<bool, FeeStoreError>;

    async fn mark_settlement_report_processed(
        &self,
        user_id: &str,
        report_id: &str,
        settlement_id: Option<&str>,
        row_count: i64,
    ) -> Result<ProcessedSettlementReport, FeeStoreError>;
}
