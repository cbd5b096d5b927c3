use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{LineItem, NewLineItem},
    traits::FeeStoreError,
};

pub async fn fetch_line_items_for_order(
    user_id: &str,
    order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<LineItem>, FeeStoreError> {
    let items = sqlx::query_as("SELECT * FROM line_items WHERE user_id = $1 AND order_id = $2 ORDER BY line_item_id")
        .bind(user_id)
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn fetch_line_item(
    user_id: &str,
    line_item_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<LineItem>, FeeStoreError> {
    let item = sqlx::query_as("SELECT * FROM line_items WHERE user_id = $1 AND line_item_id = $2")
        .bind(user_id)
        .bind(line_item_id)
        .fetch_optional(conn)
        .await?;
    Ok(item)
}

pub async fn fetch_line_items_without_breakdown(
    user_id: &str,
    since: DateTime<Utc>,
    after_id: i64,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LineItem>, FeeStoreError> {
    let items = sqlx::query_as(
        r#"
    SELECT li.* FROM line_items li
    LEFT JOIN fee_breakdowns fb ON fb.user_id = li.user_id AND fb.line_item_id = li.line_item_id
    WHERE li.user_id = $1 AND fb.id IS NULL AND datetime(li.purchased_at) >= datetime($2) AND li.id > $3
    ORDER BY li.id
    LIMIT $4
    "#,
    )
    .bind(user_id)
    .bind(since)
    .bind(after_id)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Inserts a line item, or refreshes the order-store fields of an existing one.
pub async fn upsert_line_item(item: NewLineItem, conn: &mut SqliteConnection) -> Result<LineItem, FeeStoreError> {
    let result = sqlx::query_as(
        r#"
    INSERT INTO line_items (user_id, order_id, line_item_id, sku, asin, quantity, item_price, currency, purchased_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (user_id, line_item_id) DO UPDATE SET
      order_id = excluded.order_id,
      sku = excluded.sku,
      asin = excluded.asin,
      quantity = excluded.quantity,
      item_price = excluded.item_price,
      currency = excluded.currency,
      purchased_at = excluded.purchased_at
    RETURNING *
    "#,
    )
    .bind(item.user_id)
    .bind(item.order_id)
    .bind(item.line_item_id)
    .bind(item.sku)
    .bind(item.asin)
    .bind(item.quantity)
    .bind(item.item_price)
    .bind(item.currency)
    .bind(item.purchased_at)
    .fetch_one(conn)
    .await?;
    Ok(result)
}
