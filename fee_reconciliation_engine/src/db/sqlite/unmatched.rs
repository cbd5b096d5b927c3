use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewUnmatchedFee, UnmatchedFee},
    traits::FeeStoreError,
};

/// Records a diagnostic row for an unmatched fee. Re-recording the same fee from the same batch overwrites it.
pub async fn record_unmatched_fee(
    fee: NewUnmatchedFee,
    conn: &mut SqliteConnection,
) -> Result<UnmatchedFee, FeeStoreError> {
    let result = sqlx::query_as(
        r#"
    INSERT INTO unmatched_fees (user_id, source, batch_id, order_id, sku, category, amount, reason, recorded_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (user_id, source, batch_id, order_id, sku, category) DO UPDATE SET
      amount = excluded.amount,
      reason = excluded.reason,
      recorded_at = excluded.recorded_at
    RETURNING *
    "#,
    )
    .bind(fee.user_id)
    .bind(fee.source)
    .bind(fee.batch_id)
    .bind(fee.order_id)
    .bind(fee.sku)
    .bind(fee.category)
    .bind(fee.amount)
    .bind(fee.reason)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(result)
}

pub async fn fetch_unmatched_fees(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<UnmatchedFee>, FeeStoreError> {
    let fees = sqlx::query_as("SELECT * FROM unmatched_fees WHERE user_id = $1 ORDER BY id")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(fees)
}
