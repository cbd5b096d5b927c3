//! # Sync controller
//!
//! Drives the feed adapters for one user and one sync kind at a time:
//!
//! * [`FeedThrottle`] paces requests and retries transient feed failures.
//! * [`SyncRunState`] is the run state machine, persisted as a `SyncRun` row that also acts as the run lock.
//! * [`FeeSyncApi`] chunks the work (one settlement document, one ledger window, or one batch of line items per
//!   chunk) and pushes each chunk through matching, aggregation and writing.
//! * [`FeeQueryApi`] reads back breakdowns, run reports and diagnostics.
mod config;
mod errors;
mod fee_query_api;
mod fee_sync_api;
mod run_state;
mod throttle;

pub use config::SyncConfig;
pub use errors::SyncError;
pub use fee_query_api::{FeeQueryApi, DEFAULT_RUN_HISTORY};
pub use fee_sync_api::{FeeSyncApi, SyncRequest};
pub use run_state::SyncRunState;
pub use throttle::{FeedThrottle, RequestPacer, RetryPolicy};
