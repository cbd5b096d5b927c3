use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{CategoryAmounts, Cents, FeeCategory, FeeContribution, FeeSource, LineItemFeeBreakdown},
    traits::FeeStoreError,
};

pub async fn fetch_breakdown(
    user_id: &str,
    line_item_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<LineItemFeeBreakdown>, FeeStoreError> {
    let breakdown = sqlx::query_as("SELECT * FROM fee_breakdowns WHERE user_id = $1 AND line_item_id = $2")
        .bind(user_id)
        .bind(line_item_id)
        .fetch_optional(conn)
        .await?;
    Ok(breakdown)
}

pub async fn fetch_breakdowns_for_order(
    user_id: &str,
    order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<LineItemFeeBreakdown>, FeeStoreError> {
    let breakdowns =
        sqlx::query_as("SELECT * FROM fee_breakdowns WHERE user_id = $1 AND order_id = $2 ORDER BY line_item_id")
            .bind(user_id)
            .bind(order_id)
            .fetch_all(conn)
            .await?;
    Ok(breakdowns)
}

pub async fn fetch_breakdowns_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<LineItemFeeBreakdown>, FeeStoreError> {
    let breakdowns = sqlx::query_as("SELECT * FROM fee_breakdowns WHERE user_id = $1 ORDER BY order_id, line_item_id")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(breakdowns)
}

/// Inserts or overwrites the wide breakdown row. `total_fee` is always the sum of `amounts`.
pub async fn upsert_breakdown(
    user_id: &str,
    order_id: &str,
    line_item_id: &str,
    amounts: &CategoryAmounts,
    authoritative_source: Option<FeeSource>,
    conn: &mut SqliteConnection,
) -> Result<LineItemFeeBreakdown, FeeStoreError> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "INSERT INTO fee_breakdowns (user_id, order_id, line_item_id, total_fee, authoritative_source, synced_at",
    );
    for category in FeeCategory::ALL {
        qb.push(", ");
        qb.push(category.column());
    }
    qb.push(") VALUES (");
    {
        let mut values = qb.separated(", ");
        values.push_bind(user_id.to_string());
        values.push_bind(order_id.to_string());
        values.push_bind(line_item_id.to_string());
        values.push_bind(amounts.total());
        values.push_bind(authoritative_source);
        values.push_bind(Utc::now());
        for category in FeeCategory::ALL {
            values.push_bind(amounts.get(category));
        }
    }
    qb.push(
        ") ON CONFLICT (user_id, line_item_id) DO UPDATE SET order_id = excluded.order_id, total_fee = \
         excluded.total_fee, authoritative_source = excluded.authoritative_source, synced_at = excluded.synced_at",
    );
    for category in FeeCategory::ALL {
        let column = category.column();
        qb.push(format!(", {column} = excluded.{column}"));
    }
    qb.push(" RETURNING *");
    let breakdown = qb.build_query_as::<LineItemFeeBreakdown>().fetch_one(conn).await?;
    Ok(breakdown)
}

pub async fn fetch_contributions(
    user_id: &str,
    line_item_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<FeeContribution>, FeeStoreError> {
    let contributions = sqlx::query_as(
        "SELECT * FROM fee_contributions WHERE user_id = $1 AND line_item_id = $2 ORDER BY category, source, batch_id",
    )
    .bind(user_id)
    .bind(line_item_id)
    .fetch_all(conn)
    .await?;
    Ok(contributions)
}

/// Writes one batch's contribution. An existing row for the same batch is overwritten, and only touched when the
/// amount actually changes.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_contribution(
    user_id: &str,
    line_item_id: &str,
    category: FeeCategory,
    source: FeeSource,
    batch_id: &str,
    amount: Cents,
    conn: &mut SqliteConnection,
) -> Result<(), FeeStoreError> {
    sqlx::query(
        r#"
    INSERT INTO fee_contributions (user_id, line_item_id, category, source, batch_id, amount, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (user_id, line_item_id, category, source, batch_id) DO UPDATE SET
      amount = excluded.amount,
      updated_at = excluded.updated_at
    WHERE fee_contributions.amount <> excluded.amount
    "#,
    )
    .bind(user_id)
    .bind(line_item_id)
    .bind(category)
    .bind(source)
    .bind(batch_id)
    .bind(amount)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

/// Removes the contributions to a category from sources below `source`. Returns the number of rows removed.
pub async fn delete_lower_contributions(
    user_id: &str,
    line_item_id: &str,
    category: FeeCategory,
    source: FeeSource,
    conn: &mut SqliteConnection,
) -> Result<u64, FeeStoreError> {
    let lower = [FeeSource::Estimated, FeeSource::FinancialEventsApi, FeeSource::SettlementReport]
        .into_iter()
        .filter(|s| source.outranks(s))
        .collect::<Vec<FeeSource>>();
    if lower.is_empty() {
        return Ok(0);
    }
    let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM fee_contributions WHERE user_id = ");
    qb.push_bind(user_id.to_string());
    qb.push(" AND line_item_id = ");
    qb.push_bind(line_item_id.to_string());
    qb.push(" AND category = ");
    qb.push_bind(category);
    qb.push(" AND source IN (");
    {
        let mut sources = qb.separated(", ");
        for s in lower {
            sources.push_bind(s);
        }
    }
    qb.push(")");
    let result = qb.build().execute(conn).await?;
    Ok(result.rows_affected())
}
