//! Read access to reconciliation results.
//!
//! Each query only needs one storage trait, so each lives in its own `impl` block with the narrowest bound.
use std::fmt::Debug;

use crate::{
    db_types::{AccountLevelFee, LineItemFeeBreakdown, SyncRun, UnmatchedFee},
    traits::{AccountFeeManagement, FeeBreakdownManagement, FeeStoreError, SyncStateManagement},
};

/// The number of run reports returned when the caller does not ask for a specific number.
pub const DEFAULT_RUN_HISTORY: i64 = 20;
const MAX_RUN_HISTORY: i64 = 500;

pub struct FeeQueryApi<B> {
    db: B,
}

impl<B> Debug for FeeQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FeeQueryApi")
    }
}

impl<B> FeeQueryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B: FeeBreakdownManagement> FeeQueryApi<B> {
    pub async fn breakdowns_for_order(
        &self,
        user_id: &str,
        order_id: &str,
    ) -> Result<Vec<LineItemFeeBreakdown>, FeeStoreError> {
        self.db.fetch_breakdowns_for_order(user_id, order_id).await
    }

    pub async fn unmatched_fees(&self, user_id: &str) -> Result<Vec<UnmatchedFee>, FeeStoreError> {
        self.db.fetch_unmatched_fees(user_id).await
    }
}

impl<B: SyncStateManagement> FeeQueryApi<B> {
    /// Most recent runs first. `limit` is clamped to `1..=500`.
    pub async fn recent_runs(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<SyncRun>, FeeStoreError> {
        let limit = limit.unwrap_or(DEFAULT_RUN_HISTORY).clamp(1, MAX_RUN_HISTORY);
        self.db.fetch_recent_sync_runs(user_id, limit).await
    }
}

impl<B: AccountFeeManagement> FeeQueryApi<B> {
    pub async fn account_fees(&self, user_id: &str, period: Option<&str>) -> Result<Vec<AccountLevelFee>, FeeStoreError> {
        self.db.fetch_account_fees(user_id, period).await
    }
}
