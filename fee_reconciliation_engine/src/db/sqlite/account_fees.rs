use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{
    db_types::{AccountLevelFee, Cents, FeeCategory},
    traits::{AccountFeeOutcome, AccountFeeUpdate, FeeStoreError},
};

/// Writes one batch's contribution to an account-level bucket and recomputes the bucket. `changed` is false when
/// the bucket already held the resulting amount, in which case the bucket row is left untouched.
pub async fn record_account_fee(
    update: &AccountFeeUpdate,
    conn: &mut SqliteConnection,
) -> Result<AccountFeeOutcome, FeeStoreError> {
    let now = Utc::now();
    sqlx::query(
        r#"
    INSERT INTO account_fee_contributions (user_id, period, category, batch_id, amount, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (user_id, period, category, batch_id) DO UPDATE SET
      amount = excluded.amount,
      updated_at = excluded.updated_at
    WHERE account_fee_contributions.amount <> excluded.amount
    "#,
    )
    .bind(&update.user_id)
    .bind(&update.period)
    .bind(update.category)
    .bind(&update.batch_id)
    .bind(update.amount)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let total: Cents = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM account_fee_contributions WHERE user_id = $1 AND period = $2 AND \
         category = $3",
    )
    .bind(&update.user_id)
    .bind(&update.period)
    .bind(update.category)
    .fetch_one(&mut *conn)
    .await?;
    let existing = fetch_account_fee(&update.user_id, &update.period, update.category, &mut *conn).await?;
    if let Some(fee) = existing {
        if fee.amount == total {
            return Ok(AccountFeeOutcome { fee, changed: false });
        }
    }
    let fee = sqlx::query_as(
        r#"
    INSERT INTO account_level_fees (user_id, period, category, amount, updated_at)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (user_id, period, category) DO UPDATE SET
      amount = excluded.amount,
      updated_at = excluded.updated_at
    RETURNING *
    "#,
    )
    .bind(&update.user_id)
    .bind(&update.period)
    .bind(update.category)
    .bind(total)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(AccountFeeOutcome { fee, changed: true })
}

pub async fn fetch_account_fee(
    user_id: &str,
    period: &str,
    category: FeeCategory,
    conn: &mut SqliteConnection,
) -> Result<Option<AccountLevelFee>, FeeStoreError> {
    let fee = sqlx::query_as("SELECT * FROM account_level_fees WHERE user_id = $1 AND period = $2 AND category = $3")
        .bind(user_id)
        .bind(period)
        .bind(category)
        .fetch_optional(conn)
        .await?;
    Ok(fee)
}

pub async fn fetch_account_fees(
    user_id: &str,
    period: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Vec<AccountLevelFee>, FeeStoreError> {
    let fees = match period {
        Some(period) => {
            sqlx::query_as("SELECT * FROM account_level_fees WHERE user_id = $1 AND period = $2 ORDER BY category")
                .bind(user_id)
                .bind(period)
                .fetch_all(conn)
                .await?
        },
        None => {
            sqlx::query_as("SELECT * FROM account_level_fees WHERE user_id = $1 ORDER BY period, category")
                .bind(user_id)
                .fetch_all(conn)
                .await?
        },
    };
    Ok(fees)
}
