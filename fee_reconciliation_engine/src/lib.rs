//! Fee Reconciliation Engine
//!
//! Marketplaces report the fees they charge a seller through several feeds that disagree on shape, timing and
//! granularity. This library pulls those feeds into one per-line-item fee breakdown per order line, without
//! double-counting across overlapping exports or repeated runs.
//!
//! The pipeline, leaves first:
//! 1. Feed adapters ([`mod@feeds`]) turn settlement exports, ledger event pages and fee estimates into raw fee
//!    records.
//! 2. The fee normalizer ([`mod@normalizer`]) classifies each record's free-text fee type into a [`FeeCategory`].
//! 3. The match key resolver ([`mod@matching`]) links each fee to the stored order line item(s) it belongs to.
//! 4. The aggregator ([`mod@aggregator`]) merges a run's fees per line item and category under source precedence
//!    (`SETTLEMENT_REPORT > FINANCIAL_EVENTS_API > ESTIMATED`).
//! 5. The writer ([`mod@writer`]) persists contributions and recomputes breakdowns idempotently.
//! 6. The sync controller ([`mod@sync`]) drives it all: pacing, retries, chunking, run locking and resumption.
//!
//! Storage is abstracted behind the traits in [`mod@traits`]. [`SqliteDatabase`] is the bundled backend.
//!
//! [`FeeCategory`]: db_types::FeeCategory
mod db;

pub mod aggregator;
pub mod db_types;
pub mod events;
pub mod feeds;
pub mod matching;
pub mod normalizer;
pub mod sync;
pub mod traits;
pub mod writer;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use sync::{FeeQueryApi, FeeSyncApi, SyncConfig, SyncError, SyncRequest};
pub use traits::{
    AccountFeeManagement,
    FeeBreakdownManagement,
    FeeReconciliationDatabase,
    FeeStoreError,
    LineItemStore,
    SyncStateManagement,
};
