use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use fee_reconciliation_engine::{
    db_types::{
        FeeCategory,
        FeeContribution,
        FeeSource,
        LineItemFeeBreakdown,
        NewUnmatchedFee,
        UnmatchedFee,
    },
    feeds::{EstimateRequest, EstimatedFee, FeeEstimateSource, FeedError, LedgerEventSource, SettlementReportSource},
    traits::{FeeBreakdownManagement, FeeStoreError, LineItemUpdate, WriteOutcome},
};
use marketplace_tools::data_objects::{FinancialEventsPage, ReportInfo};
use mockall::mock;

use crate::{connector::FeedConnector, errors::ServerError};

mock! {
    pub BreakdownStore {}
    impl FeeBreakdownManagement for BreakdownStore {
        async fn fetch_category_sources(&self, user_id: &str, line_item_id: &str) -> Result<HashMap<FeeCategory, FeeSource>, FeeStoreError>;
        async fn apply_line_item_update(&self, update: &LineItemUpdate) -> Result<WriteOutcome, FeeStoreError>;
        async fn fetch_breakdown(&self, user_id: &str, line_item_id: &str) -> Result<Option<LineItemFeeBreakdown>, FeeStoreError>;
        async fn fetch_breakdowns_for_order(&self, user_id: &str, order_id: &str) -> Result<Vec<LineItemFeeBreakdown>, FeeStoreError>;
        async fn fetch_breakdowns_for_user(&self, user_id: &str) -> Result<Vec<LineItemFeeBreakdown>, FeeStoreError>;
        async fn fetch_contributions(&self, user_id: &str, line_item_id: &str) -> Result<Vec<FeeContribution>, FeeStoreError>;
        async fn record_unmatched_fee(&self, fee: NewUnmatchedFee) -> Result<UnmatchedFee, FeeStoreError>;
        async fn fetch_unmatched_fees(&self, user_id: &str) -> Result<Vec<UnmatchedFee>, FeeStoreError>;
    }
}

pub const MAIN_STORE: &str = "main-store";

const SETTLEMENT_HEADER: &str = "settlement-id\tsettlement-start-date\tsettlement-end-date\ttotal-amount\tcurrency\t\
                                 transaction-type\torder-id\tsku\tamount-type\tamount-description\tamount\t\
                                 posted-date";

/// A feed with at most one settlement document and nothing else.
#[derive(Debug, Clone, Default)]
pub struct CannedFeed {
    reject: bool,
    settlement: Option<(ReportInfo, String)>,
}

impl CannedFeed {
    /// One settlement document charging a $1.10 referral fee on sku `ABC` of order `111-222`.
    pub fn with_referral_fee() -> Self {
        let created: DateTime<Utc> = Utc::now() - Duration::days(5);
        let posted = created.format("%Y-%m-%d");
        let body = [
            SETTLEMENT_HEADER.to_string(),
            "7001\t\t\t-1.10\tUSD\t\t\t\t\t\t\t".to_string(),
            format!("7001\t\t\t\tUSD\tOrder\t111-222\tABC\tItemFees\tCommission\t-1.10\t{posted}"),
        ]
        .join("\n");
        let info = ReportInfo {
            report_id: "R-7001".into(),
            report_type: "GET_V2_SETTLEMENT_REPORT_DATA_FLAT_FILE_V2".into(),
            marketplace_ids: vec!["ATVPDKIKX0DER".into()],
            data_start_time: Some(created - Duration::days(14)),
            data_end_time: Some(created),
            created_time: Some(created),
            processing_status: Some("DONE".into()),
            report_document_id: Some("doc-R-7001".into()),
        };
        Self { reject: false, settlement: Some((info, body)) }
    }

    fn check_credentials(&self) -> Result<(), FeedError> {
        if self.reject {
            Err(FeedError::Authentication("The access token has expired".into()))
        } else {
            Ok(())
        }
    }
}

impl SettlementReportSource for CannedFeed {
    async fn list_settlement_reports(
        &self,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
        _next_token: Option<&str>,
    ) -> Result<(Vec<ReportInfo>, Option<String>), FeedError> {
        self.check_credentials()?;
        Ok((self.settlement.iter().map(|(info, _)| info.clone()).collect(), None))
    }

    async fn download_settlement_report(&self, report: &ReportInfo) -> Result<String, FeedError> {
        self.check_credentials()?;
        self.settlement
            .as_ref()
            .filter(|(info, _)| info.report_id == report.report_id)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| FeedError::Rejected { status: 404, message: format!("No document {}", report.report_id) })
    }
}

impl LedgerEventSource for CannedFeed {
    async fn fetch_ledger_page(
        &self,
        _posted_after: DateTime<Utc>,
        _posted_before: DateTime<Utc>,
        _next_token: Option<&str>,
    ) -> Result<FinancialEventsPage, FeedError> {
        self.check_credentials()?;
        Ok(FinancialEventsPage::default())
    }
}

impl FeeEstimateSource for CannedFeed {
    async fn estimate_fees(&self, _request: &EstimateRequest) -> Result<Vec<EstimatedFee>, FeedError> {
        self.check_credentials()?;
        Ok(Vec::new())
    }
}

/// Knows a single credential reference, [`MAIN_STORE`].
#[derive(Debug, Clone, Default)]
pub struct CannedConnector {
    feed: CannedFeed,
}

impl CannedConnector {
    pub fn new(feed: CannedFeed) -> Self {
        Self { feed }
    }

    pub fn rejecting_tokens() -> Self {
        Self { feed: CannedFeed { reject: true, settlement: None } }
    }
}

impl FeedConnector for CannedConnector {
    type Feed = CannedFeed;

    fn connect(&self, credential_ref: &str, _marketplace_ids: &[String]) -> Result<CannedFeed, ServerError> {
        if credential_ref == MAIN_STORE {
            Ok(self.feed.clone())
        } else {
            Err(ServerError::AuthenticationError(format!("Unknown credential reference '{credential_ref}'")))
        }
    }
}
