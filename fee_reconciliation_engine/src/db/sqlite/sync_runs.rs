use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{SyncKind, SyncRun, SyncStage},
    traits::FeeStoreError,
};

/// Inserts a new active run. The partial unique index on active runs makes this fail if the lock is held.
pub async fn insert_run(user_id: &str, kind: SyncKind, conn: &mut SqliteConnection) -> Result<SyncRun, FeeStoreError> {
    let result = sqlx::query_as(
        "INSERT INTO sync_runs (user_id, kind, stage, started_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(user_id)
    .bind(kind)
    .bind(SyncStage::Queued)
    .bind(Utc::now())
    .fetch_one(conn)
    .await;
    match result {
        Ok(run) => Ok(run),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(FeeStoreError::RunInProgress { user_id: user_id.to_string(), kind })
        },
        Err(e) => Err(e.into()),
    }
}

/// Marks active runs that started before `cutoff` as failed, releasing their lock. Returns the number of runs
/// taken over.
pub async fn expire_stale_runs(
    user_id: &str,
    kind: SyncKind,
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, FeeStoreError> {
    let result = sqlx::query(
        r#"
    UPDATE sync_runs SET stage = $1, resumable = TRUE, error = 'abandoned', finished_at = $2
    WHERE user_id = $3 AND kind = $4 AND finished_at IS NULL AND datetime(started_at) < datetime($5)
    "#,
    )
    .bind(SyncStage::Failed)
    .bind(Utc::now())
    .bind(user_id)
    .bind(kind)
    .bind(cutoff)
    .execute(conn)
    .await?;
    let n = result.rows_affected();
    if n > 0 {
        warn!("🗃️ Took over the {kind} run lock for {user_id} from {n} abandoned run(s)");
    }
    Ok(n)
}

pub async fn update_run(run: &SyncRun, conn: &mut SqliteConnection) -> Result<SyncRun, FeeStoreError> {
    let c = &run.counters;
    let result = sqlx::query_as(
        r#"
    UPDATE sync_runs SET
      stage = $1,
      fetched = $2,
      parsed = $3,
      skipped_malformed = $4,
      transfers_excluded = $5,
      non_fee = $6,
      matched = $7,
      unmatched = $8,
      account_level = $9,
      updated = $10,
      unchanged = $11,
      superseded = $12,
      errored = $13,
      batches_failed = $14,
      batches_skipped = $15,
      resumable = $16,
      error = $17,
      finished_at = $18
    WHERE id = $19
    RETURNING *
    "#,
    )
    .bind(run.stage)
    .bind(c.fetched)
    .bind(c.parsed)
    .bind(c.skipped_malformed)
    .bind(c.transfers_excluded)
    .bind(c.non_fee)
    .bind(c.matched)
    .bind(c.unmatched)
    .bind(c.account_level)
    .bind(c.updated)
    .bind(c.unchanged)
    .bind(c.superseded)
    .bind(c.errored)
    .bind(c.batches_failed)
    .bind(c.batches_skipped)
    .bind(run.resumable)
    .bind(run.error.as_deref())
    .bind(run.finished_at)
    .bind(run.id)
    .fetch_optional(conn)
    .await?
    .ok_or(FeeStoreError::RunNotFound(run.id))?;
    Ok(result)
}

pub async fn fetch_run(id: i64, conn: &mut SqliteConnection) -> Result<Option<SyncRun>, FeeStoreError> {
    let run = sqlx::query_as("SELECT * FROM sync_runs WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(run)
}

pub async fn fetch_recent_runs(
    user_id: &str,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SyncRun>, FeeStoreError> {
    let runs = sqlx::query_as("SELECT * FROM sync_runs WHERE user_id = $1 ORDER BY id DESC LIMIT $2")
        .bind(user_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(runs)
}
