use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{PageContinuation, SyncCursor, SyncKind},
    traits::FeeStoreError,
};

pub async fn fetch_cursor(
    user_id: &str,
    kind: SyncKind,
    conn: &mut SqliteConnection,
) -> Result<Option<SyncCursor>, FeeStoreError> {
    let cursor = sqlx::query_as("SELECT * FROM sync_cursors WHERE user_id = $1 AND kind = $2")
        .bind(user_id)
        .bind(kind)
        .fetch_optional(conn)
        .await?;
    Ok(cursor)
}

pub async fn save_cursor(
    user_id: &str,
    kind: SyncKind,
    range_start: Option<DateTime<Utc>>,
    position: &str,
    continuation: Option<&PageContinuation>,
    conn: &mut SqliteConnection,
) -> Result<SyncCursor, FeeStoreError> {
    let cursor = sqlx::query_as(
        r#"
    INSERT INTO sync_cursors (user_id, kind, range_start, position, window_end, page_token, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (user_id, kind) DO UPDATE SET
      range_start = excluded.range_start,
      position = excluded.position,
      window_end = excluded.window_end,
      page_token = excluded.page_token,
      updated_at = excluded.updated_at
    RETURNING *
    "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(range_start)
    .bind(position)
    .bind(continuation.map(|c| c.window_end))
    .bind(continuation.map(|c| c.token.as_str()))
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(cursor)
}

pub async fn clear_cursor(user_id: &str, kind: SyncKind, conn: &mut SqliteConnection) -> Result<(), FeeStoreError> {
    sqlx::query("DELETE FROM sync_cursors WHERE user_id = $1 AND kind = $2")
        .bind(user_id)
        .bind(kind)
        .execute(conn)
        .await?;
    Ok(())
}
