//! Marketplace feed client
//!
//! A thin, typed HTTP client over the three marketplace feeds the fee reconciliation engine consumes:
//! * the ledger event feed (paginated financial events, see [`MarketplaceApi::list_financial_events`]),
//! * the settlement export feed (report listing plus flat-file download, see
//!   [`MarketplaceApi::list_settlement_reports`] and [`MarketplaceApi::download_report_document`]),
//! * the fee estimate endpoint (see [`MarketplaceApi::get_fees_estimate`]).
//!
//! The client does not retry or rate-limit. Pacing belongs to the caller, which can inspect
//! [`MarketplaceApiError::status`] and [`MarketplaceApiError::retry_after`] to decide what to do.
mod api;
mod config;
mod error;

pub mod data_objects;
pub mod helpers;

pub use api::MarketplaceApi;
pub use config::MarketplaceConfig;
pub use error::MarketplaceApiError;
