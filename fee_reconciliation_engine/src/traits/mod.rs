//! #  Persistence contracts of the reconciliation engine.
//!
//! The engine never talks to a database directly. Backends implement these traits:
//!
//! * [`LineItemStore`] is the read side of the external order/line-item store that match keys resolve against.
//! * [`FeeBreakdownManagement`] owns the per-line-item fee breakdowns, their contribution provenance and the
//!   unmatched-fee diagnostics.
//! * [`AccountFeeManagement`] owns the account-level fee buckets.
//! * [`SyncStateManagement`] owns sync runs (which double as the per-user run lock), resumption cursors and the
//!   ledger of processed settlement documents.
//! * [`FeeReconciliationDatabase`] bundles all of the above.
mod account_fee_management;
mod data_objects;
mod fee_breakdown_management;
mod fee_reconciliation_database;
mod line_item_store;
mod sync_state_management;

pub use account_fee_management::AccountFeeManagement;
pub use data_objects::{
    AccountFeeOutcome,
    AccountFeeUpdate,
    CategoryWrite,
    Decision,
    LineItemUpdate,
    WriteOutcome,
};
pub use fee_breakdown_management::FeeBreakdownManagement;
pub use fee_reconciliation_database::{FeeReconciliationDatabase, FeeStoreError};
pub use line_item_store::LineItemStore;
pub use sync_state_management::SyncStateManagement;
