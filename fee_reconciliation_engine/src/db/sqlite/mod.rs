//! # SQLite backend
//!
//! The submodules hold the "low-level" queries as plain functions taking a `&mut SqliteConnection`, so callers can
//! pass a pooled connection or an open transaction without any other change. [`SqliteDatabase`] composes them into
//! the engine's storage traits.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod account_fees;
pub mod cursors;
pub mod fee_breakdowns;
pub mod line_items;
pub mod settlement_reports;
pub mod sync_runs;
pub mod unmatched;

mod sqlite_impl;

pub use sqlite_impl::SqliteDatabase;

const SQLITE_DB_URL: &str = "sqlite://data/fee_store.db";

pub fn db_url() -> String {
    let result = env::var("FRS_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ FRS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
