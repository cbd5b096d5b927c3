use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{db_types::ProcessedSettlementReport, traits::FeeStoreError};

pub async fn is_processed(user_id: &str, report_id: &str, conn: &mut SqliteConnection) -> Result<bool, FeeStoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM processed_settlement_reports WHERE user_id = $1 AND report_id = $2")
            .bind(user_id)
            .bind(report_id)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

pub async fn mark_processed(
    user_id: &str,
    report_id: &str,
    settlement_id: Option<&str>,
    row_count: i64,
    conn: &mut SqliteConnection,
) -> Result<ProcessedSettlementReport, FeeStoreError> {
    let result = sqlx::query_as(
        r#"
    INSERT INTO processed_settlement_reports (user_id, report_id, settlement_id, row_count, processed_at)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (user_id, report_id) DO UPDATE SET
      settlement_id = excluded.settlement_id,
      row_count = excluded.row_count,
      processed_at = excluded.processed_at
    RETURNING *
    "#,
    )
    .bind(user_id)
    .bind(report_id)
    .bind(settlement_id)
    .bind(row_count)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(result)
}
