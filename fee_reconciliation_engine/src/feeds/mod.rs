//! # Feed adapters
//!
//! Each marketplace feed has its own payload shape. The adapters in this module turn those shapes into
//! [`RawFeeRecord`]s as early as possible, so nothing downstream needs to know which feed a record came from:
//!
//! * [`settlement`] parses settlement export documents (tab-delimited flat files).
//! * [`ledger`] flattens pages of the ledger event feed and drives its continuation-token pagination.
//! * [`estimate`] turns fee estimates for a line item into records of last resort.
//!
//! The feeds themselves are reached through the [`SettlementReportSource`], [`LedgerEventSource`] and
//! [`FeeEstimateSource`] traits. [`marketplace`] implements them for the HTTP client in `marketplace_tools`; tests
//! implement them with canned payloads.
use std::time::Duration;

use chrono::{DateTime, Utc};
use marketplace_tools::{
    data_objects::{FinancialEventsPage, ProductIdType, ReportInfo},
    MarketplaceApiError,
};
use thiserror::Error;

use crate::db_types::Cents;

pub mod estimate;
pub mod ledger;
mod marketplace;
mod records;
pub mod settlement;

pub use records::{CanonicalFeeEvent, RawFeeRecord};

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("The feed is rate limiting requests")]
    RateLimited { retry_after: Option<Duration> },
    #[error("The feed returned a server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("The feed rejected the credentials: {0}")]
    Authentication(String),
    #[error("Could not reach the feed: {0}")]
    Unreachable(String),
    #[error("The feed rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("The feed returned a malformed payload: {0}")]
    Malformed(String),
}

impl FeedError {
    /// Transient errors are worth retrying after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::RateLimited { .. } | FeedError::Server { .. } | FeedError::Unreachable(_))
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, FeedError::Authentication(_))
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FeedError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<MarketplaceApiError> for FeedError {
    fn from(e: MarketplaceApiError) -> Self {
        match e {
            MarketplaceApiError::QueryError { status: 429, retry_after, .. } => FeedError::RateLimited { retry_after },
            MarketplaceApiError::QueryError { status: 401 | 403, message, .. } => FeedError::Authentication(message),
            MarketplaceApiError::QueryError { status, message, .. } if status >= 500 => {
                FeedError::Server { status, message }
            },
            MarketplaceApiError::QueryError { status, message, .. } => FeedError::Rejected { status, message },
            MarketplaceApiError::Initialization(s) => FeedError::Authentication(s),
            MarketplaceApiError::RestRequestError(s) | MarketplaceApiError::RestResponseError(s) => {
                FeedError::Unreachable(s)
            },
            e @ (MarketplaceApiError::JsonError(_) |
            MarketplaceApiError::EmptyResponse |
            MarketplaceApiError::FeedErrors(_) |
            MarketplaceApiError::UnsupportedCompression(_)) => FeedError::Malformed(e.to_string()),
        }
    }
}

/// Lists and downloads settlement export documents.
#[allow(async_fn_in_trait)]
pub trait SettlementReportSource {
    /// One page of the settlement documents created in `[since, until)`, plus the token for the next page.
    async fn list_settlement_reports(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<(Vec<ReportInfo>, Option<String>), FeedError>;

    /// The flat-file body of one settlement document.
    async fn download_settlement_report(&self, report: &ReportInfo) -> Result<String, FeedError>;
}

/// Pages through the ledger event feed.
#[allow(async_fn_in_trait)]
pub trait LedgerEventSource {
    async fn fetch_ledger_page(
        &self,
        posted_after: DateTime<Utc>,
        posted_before: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<FinancialEventsPage, FeedError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateRequest {
    pub id_type: ProductIdType,
    pub product_id: String,
    pub unit_price: Cents,
    pub currency: String,
}

/// One estimated fee, as a positive magnitude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatedFee {
    pub fee_type: String,
    pub amount: Cents,
}

/// Estimates the fees the marketplace would charge for selling one unit of a product.
#[allow(async_fn_in_trait)]
pub trait FeeEstimateSource {
    async fn estimate_fees(&self, request: &EstimateRequest) -> Result<Vec<EstimatedFee>, FeedError>;
}
