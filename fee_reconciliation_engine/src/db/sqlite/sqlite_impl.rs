//! `SqliteDatabase` is the SQLite implementation of the engine's storage traits.
use std::{collections::HashMap, fmt::Debug};

use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{
    account_fees,
    cursors,
    db_url,
    fee_breakdowns,
    line_items,
    new_pool,
    settlement_reports,
    sync_runs,
    unmatched,
};
use crate::{
    db_types::{
        AccountLevelFee,
        FeeCategory,
        FeeContribution,
        FeeSource,
        LineItem,
        LineItemFeeBreakdown,
        NewLineItem,
        NewUnmatchedFee,
        PageContinuation,
        ProcessedSettlementReport,
        SyncCursor,
        SyncKind,
        SyncRun,
        UnmatchedFee,
    },
    traits::{
        AccountFeeManagement,
        AccountFeeOutcome,
        AccountFeeUpdate,
        Decision,
        FeeBreakdownManagement,
        FeeReconciliationDatabase,
        FeeStoreError,
        LineItemStore,
        LineItemUpdate,
        SyncStateManagement,
        WriteOutcome,
    },
    writer::recompute,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database named by `FRS_DATABASE_URL` (or the default).
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl FeeReconciliationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), FeeStoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl LineItemStore for SqliteDatabase {
    async fn fetch_line_items_for_order(&self, user_id: &str, order_id: &str) -> Result<Vec<LineItem>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        line_items::fetch_line_items_for_order(user_id, order_id, &mut conn).await
    }

    async fn fetch_line_item(&self, user_id: &str, line_item_id: &str) -> Result<Option<LineItem>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        line_items::fetch_line_item(user_id, line_item_id, &mut conn).await
    }

    async fn fetch_line_items_without_breakdown(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<LineItem>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        line_items::fetch_line_items_without_breakdown(user_id, since, after_id, limit, &mut conn).await
    }

    async fn upsert_line_item(&self, item: NewLineItem) -> Result<LineItem, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        let item = line_items::upsert_line_item(item, &mut conn).await?;
        trace!("🗃️ Line item {} of order {} saved with id {}", item.line_item_id, item.order_id, item.id);
        Ok(item)
    }
}

impl FeeBreakdownManagement for SqliteDatabase {
    async fn fetch_category_sources(
        &self,
        user_id: &str,
        line_item_id: &str,
    ) -> Result<HashMap<FeeCategory, FeeSource>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        let contributions = fee_breakdowns::fetch_contributions(user_id, line_item_id, &mut conn).await?;
        let mut sources = HashMap::<FeeCategory, FeeSource>::new();
        for c in contributions {
            let entry = sources.entry(c.category).or_insert(c.source);
            if c.source.outranks(entry) {
                *entry = c.source;
            }
        }
        Ok(sources)
    }

    /// In a single atomic transaction:
    /// * lower-precedence contributions are removed from every category the update replaces,
    /// * the update's per-batch contributions are upserted,
    /// * the breakdown is recomputed from the full contribution set and written, unless it is unchanged.
    async fn apply_line_item_update(&self, update: &LineItemUpdate) -> Result<WriteOutcome, FeeStoreError> {
        let user_id = update.user_id.as_str();
        let line_item_id = update.line_item_id.as_str();
        let mut tx = self.pool.begin().await?;
        for write in &update.writes {
            match write.decision {
                Decision::Superseded => continue,
                Decision::Replace => {
                    let removed = fee_breakdowns::delete_lower_contributions(
                        user_id,
                        line_item_id,
                        write.category,
                        write.source,
                        &mut tx,
                    )
                    .await?;
                    trace!("🗃️ {line_item_id} {}: {removed} lower-precedence contributions replaced", write.category);
                },
                Decision::Accumulate => {},
            }
            for (batch_id, amount) in &write.contributions {
                fee_breakdowns::upsert_contribution(
                    user_id,
                    line_item_id,
                    write.category,
                    write.source,
                    batch_id,
                    *amount,
                    &mut tx,
                )
                .await?;
            }
        }
        let contributions = fee_breakdowns::fetch_contributions(user_id, line_item_id, &mut tx).await?;
        let (amounts, authoritative_source) = recompute(&contributions);
        let existing = fee_breakdowns::fetch_breakdown(user_id, line_item_id, &mut tx).await?;
        let outcome = match existing {
            Some(stored) if stored.amounts == amounts && stored.authoritative_source == authoritative_source => {
                WriteOutcome::Unchanged(stored)
            },
            Some(_) => {
                let b = fee_breakdowns::upsert_breakdown(
                    user_id,
                    &update.order_id,
                    line_item_id,
                    &amounts,
                    authoritative_source,
                    &mut tx,
                )
                .await?;
                WriteOutcome::Updated(b)
            },
            None => {
                let b = fee_breakdowns::upsert_breakdown(
                    user_id,
                    &update.order_id,
                    line_item_id,
                    &amounts,
                    authoritative_source,
                    &mut tx,
                )
                .await?;
                WriteOutcome::Created(b)
            },
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn fetch_breakdown(
        &self,
        user_id: &str,
        line_item_id: &str,
    ) -> Result<Option<LineItemFeeBreakdown>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        fee_breakdowns::fetch_breakdown(user_id, line_item_id, &mut conn).await
    }

    async fn fetch_breakdowns_for_order(
        &self,
        user_id: &str,
        order_id: &str,
    ) -> Result<Vec<LineItemFeeBreakdown>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        fee_breakdowns::fetch_breakdowns_for_order(user_id, order_id, &mut conn).await
    }

    async fn fetch_breakdowns_for_user(&self, user_id: &str) -> Result<Vec<LineItemFeeBreakdown>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        fee_breakdowns::fetch_breakdowns_for_user(user_id, &mut conn).await
    }

    async fn fetch_contributions(
        &self,
        user_id: &str,
        line_item_id: &str,
    ) -> Result<Vec<FeeContribution>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        fee_breakdowns::fetch_contributions(user_id, line_item_id, &mut conn).await
    }

    async fn record_unmatched_fee(&self, fee: NewUnmatchedFee) -> Result<UnmatchedFee, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        unmatched::record_unmatched_fee(fee, &mut conn).await
    }

    async fn fetch_unmatched_fees(&self, user_id: &str) -> Result<Vec<UnmatchedFee>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        unmatched::fetch_unmatched_fees(user_id, &mut conn).await
    }
}

impl AccountFeeManagement for SqliteDatabase {
    async fn record_account_fee(&self, update: &AccountFeeUpdate) -> Result<AccountFeeOutcome, FeeStoreError> {
        let mut tx = self.pool.begin().await?;
        let outcome = account_fees::record_account_fee(update, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn fetch_account_fees(
        &self,
        user_id: &str,
        period: Option<&str>,
    ) -> Result<Vec<AccountLevelFee>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        account_fees::fetch_account_fees(user_id, period, &mut conn).await
    }
}

impl SyncStateManagement for SqliteDatabase {
    async fn start_sync_run(
        &self,
        user_id: &str,
        kind: SyncKind,
        stale_after: Duration,
    ) -> Result<SyncRun, FeeStoreError> {
        let mut tx = self.pool.begin().await?;
        sync_runs::expire_stale_runs(user_id, kind, Utc::now() - stale_after, &mut tx).await?;
        let run = sync_runs::insert_run(user_id, kind, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Sync run #{} ({kind}) holds the run lock for {user_id}", run.id);
        Ok(run)
    }

    async fn save_sync_run(&self, run: &SyncRun) -> Result<SyncRun, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        sync_runs::update_run(run, &mut conn).await
    }

    async fn fetch_sync_run(&self, id: i64) -> Result<Option<SyncRun>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        sync_runs::fetch_run(id, &mut conn).await
    }

    async fn fetch_recent_sync_runs(&self, user_id: &str, limit: i64) -> Result<Vec<SyncRun>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        sync_runs::fetch_recent_runs(user_id, limit, &mut conn).await
    }

    async fn fetch_cursor(&self, user_id: &str, kind: SyncKind) -> Result<Option<SyncCursor>, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        cursors::fetch_cursor(user_id, kind, &mut conn).await
    }

    async fn save_cursor(
        &self,
        user_id: &str,
        kind: SyncKind,
        range_start: Option<DateTime<Utc>>,
        position: &str,
        continuation: Option<&PageContinuation>,
    ) -> Result<SyncCursor, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        cursors::save_cursor(user_id, kind, range_start, position, continuation, &mut conn).await
    }

    async fn clear_cursor(&self, user_id: &str, kind: SyncKind) -> Result<(), FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        cursors::clear_cursor(user_id, kind, &mut conn).await
    }

    async fn is_settlement_report_processed(&self, user_id: &str, report_id: &str) -> Result<bool, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        settlement_reports::is_processed(user_id, report_id, &mut conn).await
    }

    async fn mark_settlement_report_processed(
        &self,
        user_id: &str,
        report_id: &str,
        settlement_id: Option<&str>,
        row_count: i64,
    ) -> Result<ProcessedSettlementReport, FeeStoreError> {
        let mut conn = self.pool.acquire().await?;
        let report =
            settlement_reports::mark_processed(user_id, report_id, settlement_id, row_count, &mut conn).await?;
        debug!("🗃️ Settlement document {report_id} marked as processed for {user_id}");
        Ok(report)
    }
}
