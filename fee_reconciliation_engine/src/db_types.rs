use std::{
    fmt::Display,
    ops::{Add, AddAssign},
    str::FromStr,
};

use chrono::{DateTime, Datelike, Utc};
pub use frs_common::Cents;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub(crate) String);

//--------------------------------------     FeeCategory       ---------------------------------------------------------
/// The canonical fee taxonomy every feed vocabulary is normalized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeCategory {
    FbaFulfillment,
    Referral,
    Storage,
    LongTermStorage,
    Mcf,
    Inbound,
    Removal,
    Disposal,
    DigitalServices,
    RefundCommission,
    Promotion,
    ReimbursementDamaged,
    ReimbursementLost,
    ReimbursementReversal,
    RefundedReferral,
    Other,
}

impl FeeCategory {
    pub const ALL: [FeeCategory; 16] = [
        FeeCategory::FbaFulfillment,
        FeeCategory::Referral,
        FeeCategory::Storage,
        FeeCategory::LongTermStorage,
        FeeCategory::Mcf,
        FeeCategory::Inbound,
        FeeCategory::Removal,
        FeeCategory::Disposal,
        FeeCategory::DigitalServices,
        FeeCategory::RefundCommission,
        FeeCategory::Promotion,
        FeeCategory::ReimbursementDamaged,
        FeeCategory::ReimbursementLost,
        FeeCategory::ReimbursementReversal,
        FeeCategory::RefundedReferral,
        FeeCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeeCategory::FbaFulfillment => "FBA_FULFILLMENT",
            FeeCategory::Referral => "REFERRAL",
            FeeCategory::Storage => "STORAGE",
            FeeCategory::LongTermStorage => "LONG_TERM_STORAGE",
            FeeCategory::Mcf => "MCF",
            FeeCategory::Inbound => "INBOUND",
            FeeCategory::Removal => "REMOVAL",
            FeeCategory::Disposal => "DISPOSAL",
            FeeCategory::DigitalServices => "DIGITAL_SERVICES",
            FeeCategory::RefundCommission => "REFUND_COMMISSION",
            FeeCategory::Promotion => "PROMOTION",
            FeeCategory::ReimbursementDamaged => "REIMBURSEMENT_DAMAGED",
            FeeCategory::ReimbursementLost => "REIMBURSEMENT_LOST",
            FeeCategory::ReimbursementReversal => "REIMBURSEMENT_REVERSAL",
            FeeCategory::RefundedReferral => "REFUNDED_REFERRAL",
            FeeCategory::Other => "OTHER",
        }
    }

    /// The breakdown column holding this category.
    pub fn column(&self) -> &'static str {
        match self {
            FeeCategory::FbaFulfillment => "fba_fulfillment",
            FeeCategory::Referral => "referral",
            FeeCategory::Storage => "storage",
            FeeCategory::LongTermStorage => "long_term_storage",
            FeeCategory::Mcf => "mcf",
            FeeCategory::Inbound => "inbound",
            FeeCategory::Removal => "removal",
            FeeCategory::Disposal => "disposal",
            FeeCategory::DigitalServices => "digital_services",
            FeeCategory::RefundCommission => "refund_commission",
            FeeCategory::Promotion => "promotion",
            FeeCategory::ReimbursementDamaged => "reimbursement_damaged",
            FeeCategory::ReimbursementLost => "reimbursement_lost",
            FeeCategory::ReimbursementReversal => "reimbursement_reversal",
            FeeCategory::RefundedReferral => "refunded_referral",
            FeeCategory::Other => "other",
        }
    }
}

impl Display for FeeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeeCategory {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeeCategory::ALL
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ConversionError(format!("Invalid fee category: {s}")))
    }
}

//--------------------------------------      FeeSource        ---------------------------------------------------------
/// Where a fee value came from.
///
/// Variants are declared lowest precedence first, so the derived `Ord` is the precedence order:
/// `SettlementReport > FinancialEventsApi > Estimated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeSource {
    Estimated,
    FinancialEventsApi,
    SettlementReport,
}

impl FeeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeSource::Estimated => "ESTIMATED",
            FeeSource::FinancialEventsApi => "FINANCIAL_EVENTS_API",
            FeeSource::SettlementReport => "SETTLEMENT_REPORT",
        }
    }

    pub fn outranks(&self, other: &FeeSource) -> bool {
        self > other
    }
}

impl Display for FeeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeeSource {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ESTIMATED" => Ok(Self::Estimated),
            "FINANCIAL_EVENTS_API" => Ok(Self::FinancialEventsApi),
            "SETTLEMENT_REPORT" => Ok(Self::SettlementReport),
            s => Err(ConversionError(format!("Invalid fee source: {s}"))),
        }
    }
}

//--------------------------------------   CategoryAmounts     ---------------------------------------------------------
/// One amount per [`FeeCategory`]. Positive values are costs to the seller, negative values are credits.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAmounts {
    pub fba_fulfillment: Cents,
    pub referral: Cents,
    pub storage: Cents,
    pub long_term_storage: Cents,
    pub mcf: Cents,
    pub inbound: Cents,
    pub removal: Cents,
    pub disposal: Cents,
    pub digital_services: Cents,
    pub refund_commission: Cents,
    pub promotion: Cents,
    pub reimbursement_damaged: Cents,
    pub reimbursement_lost: Cents,
    pub reimbursement_reversal: Cents,
    pub refunded_referral: Cents,
    pub other: Cents,
}

impl CategoryAmounts {
    pub fn get(&self, category: FeeCategory) -> Cents {
        match category {
            FeeCategory::FbaFulfillment => self.fba_fulfillment,
            FeeCategory::Referral => self.referral,
            FeeCategory::Storage => self.storage,
            FeeCategory::LongTermStorage => self.long_term_storage,
            FeeCategory::Mcf => self.mcf,
            FeeCategory::Inbound => self.inbound,
            FeeCategory::Removal => self.removal,
            FeeCategory::Disposal => self.disposal,
            FeeCategory::DigitalServices => self.digital_services,
            FeeCategory::RefundCommission => self.refund_commission,
            FeeCategory::Promotion => self.promotion,
            FeeCategory::ReimbursementDamaged => self.reimbursement_damaged,
            FeeCategory::ReimbursementLost => self.reimbursement_lost,
            FeeCategory::ReimbursementReversal => self.reimbursement_reversal,
            FeeCategory::RefundedReferral => self.refunded_referral,
            FeeCategory::Other => self.other,
        }
    }

    pub fn set(&mut self, category: FeeCategory, value: Cents) {
        let field = match category {
            FeeCategory::FbaFulfillment => &mut self.fba_fulfillment,
            FeeCategory::Referral => &mut self.referral,
            FeeCategory::Storage => &mut self.storage,
            FeeCategory::LongTermStorage => &mut self.long_term_storage,
            FeeCategory::Mcf => &mut self.mcf,
            FeeCategory::Inbound => &mut self.inbound,
            FeeCategory::Removal => &mut self.removal,
            FeeCategory::Disposal => &mut self.disposal,
            FeeCategory::DigitalServices => &mut self.digital_services,
            FeeCategory::RefundCommission => &mut self.refund_commission,
            FeeCategory::Promotion => &mut self.promotion,
            FeeCategory::ReimbursementDamaged => &mut self.reimbursement_damaged,
            FeeCategory::ReimbursementLost => &mut self.reimbursement_lost,
            FeeCategory::ReimbursementReversal => &mut self.reimbursement_reversal,
            FeeCategory::RefundedReferral => &mut self.refunded_referral,
            FeeCategory::Other => &mut self.other,
        };
        *field = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeeCategory, Cents)> + '_ {
        FeeCategory::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// The sum of every category field. Stored totals are always produced by this method.
    pub fn total(&self) -> Cents {
        self.iter().map(|(_, v)| v).sum()
    }
}

//--------------------------------------       LineItem        ---------------------------------------------------------
/// A marketplace order line item, as maintained by the order-sync pipeline.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: i64,
    pub user_id: String,
    pub order_id: String,
    /// The marketplace order-item code
    pub line_item_id: String,
    pub sku: String,
    pub asin: Option<String>,
    pub quantity: i64,
    /// Unit price
    pub item_price: Cents,
    pub currency: String,
    pub purchased_at: DateTime<Utc>,
}

impl LineItem {
    /// True if the given product identifier refers to this line item's sku or asin.
    pub fn has_product(&self, product_id: &str) -> bool {
        self.sku.eq_ignore_ascii_case(product_id) ||
            self.asin.as_ref().map(|a| a.eq_ignore_ascii_case(product_id)).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLineItem {
    pub user_id: String,
    pub order_id: String,
    pub line_item_id: String,
    pub sku: String,
    pub asin: Option<String>,
    pub quantity: i64,
    pub item_price: Cents,
    pub currency: String,
    pub purchased_at: DateTime<Utc>,
}

impl NewLineItem {
    pub fn new(user_id: &str, order_id: &str, line_item_id: &str, sku: &str, quantity: i64, item_price: Cents) -> Self {
        Self {
            user_id: user_id.to_string(),
            order_id: order_id.to_string(),
            line_item_id: line_item_id.to_string(),
            sku: sku.to_string(),
            asin: None,
            quantity,
            item_price,
            currency: "USD".to_string(),
            purchased_at: Utc::now(),
        }
    }

    pub fn with_asin(mut self, asin: &str) -> Self {
        self.asin = Some(asin.to_string());
        self
    }

    pub fn with_purchased_at(mut self, purchased_at: DateTime<Utc>) -> Self {
        self.purchased_at = purchased_at;
        self
    }
}

//--------------------------------------  LineItemFeeBreakdown ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemFeeBreakdown {
    pub id: i64,
    pub user_id: String,
    pub order_id: String,
    pub line_item_id: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub amounts: CategoryAmounts,
    pub total_fee: Cents,
    pub authoritative_source: Option<FeeSource>,
    pub synced_at: DateTime<Utc>,
}

/// The provenance of a category value. A breakdown's category field is the sum of the contributions from the
/// highest-precedence source present for that category.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeContribution {
    pub user_id: String,
    pub line_item_id: String,
    pub category: FeeCategory,
    pub source: FeeSource,
    pub batch_id: String,
    pub amount: Cents,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   AccountLevelFee     ---------------------------------------------------------
/// A fee with no order linkage, bucketed by calendar month.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLevelFee {
    pub user_id: String,
    /// `YYYY-MM`
    pub period: String,
    pub category: FeeCategory,
    pub amount: Cents,
    pub updated_at: DateTime<Utc>,
}

/// The `YYYY-MM` bucket an account-level fee posted at `ts` belongs to.
pub fn period_of(ts: &DateTime<Utc>) -> String {
    format!("{:04}-{:02}", ts.year(), ts.month())
}

//--------------------------------------     UnmatchedFee      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedFee {
    pub id: i64,
    pub user_id: String,
    pub source: FeeSource,
    pub batch_id: String,
    pub order_id: String,
    /// Empty when the feed did not carry a product identifier
    pub sku: String,
    pub category: FeeCategory,
    pub amount: Cents,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUnmatchedFee {
    pub user_id: String,
    pub source: FeeSource,
    pub batch_id: String,
    pub order_id: String,
    pub sku: String,
    pub category: FeeCategory,
    pub amount: Cents,
    pub reason: String,
}

//--------------------------------------       SyncKind        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncKind {
    Settlement,
    Ledger,
    Estimate,
}

impl Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Settlement => write!(f, "SETTLEMENT"),
            SyncKind::Ledger => write!(f, "LEDGER"),
            SyncKind::Estimate => write!(f, "ESTIMATE"),
        }
    }
}

impl FromStr for SyncKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SETTLEMENT" => Ok(Self::Settlement),
            "LEDGER" => Ok(Self::Ledger),
            "ESTIMATE" => Ok(Self::Estimate),
            _ => Err(ConversionError(format!("Invalid sync kind: {s}"))),
        }
    }
}

//--------------------------------------      SyncStage        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStage {
    Queued,
    Fetching,
    Parsing,
    Matching,
    Aggregating,
    Writing,
    Done,
    Failed,
}

impl SyncStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStage::Done | SyncStage::Failed)
    }

    /// Legal moves of the run state machine. `Failed` is reachable from every live stage, `Writing → Fetching` starts
    /// the next chunk, and `Fetching | Parsing → Fetching` abandons a batch that could not be fetched or parsed.
    pub fn can_transition_to(&self, next: SyncStage) -> bool {
        use SyncStage::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Queued, Fetching) | (Queued, Done) => true,
            (Fetching, Parsing) | (Fetching, Fetching) | (Fetching, Done) => true,
            (Parsing, Matching) | (Parsing, Fetching) => true,
            (Matching, Aggregating) => true,
            (Aggregating, Writing) => true,
            (Writing, Fetching) | (Writing, Done) => true,
            _ => false,
        }
    }
}

impl Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStage::Queued => "QUEUED",
            SyncStage::Fetching => "FETCHING",
            SyncStage::Parsing => "PARSING",
            SyncStage::Matching => "MATCHING",
            SyncStage::Aggregating => "AGGREGATING",
            SyncStage::Writing => "WRITING",
            SyncStage::Done => "DONE",
            SyncStage::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------     SyncCounters      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounters {
    pub fetched: i64,
    pub parsed: i64,
    pub skipped_malformed: i64,
    pub transfers_excluded: i64,
    pub non_fee: i64,
    pub matched: i64,
    pub unmatched: i64,
    pub account_level: i64,
    pub updated: i64,
    pub unchanged: i64,
    pub superseded: i64,
    pub errored: i64,
    pub batches_failed: i64,
    pub batches_skipped: i64,
}

impl Add for SyncCounters {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            fetched: self.fetched + rhs.fetched,
            parsed: self.parsed + rhs.parsed,
            skipped_malformed: self.skipped_malformed + rhs.skipped_malformed,
            transfers_excluded: self.transfers_excluded + rhs.transfers_excluded,
            non_fee: self.non_fee + rhs.non_fee,
            matched: self.matched + rhs.matched,
            unmatched: self.unmatched + rhs.unmatched,
            account_level: self.account_level + rhs.account_level,
            updated: self.updated + rhs.updated,
            unchanged: self.unchanged + rhs.unchanged,
            superseded: self.superseded + rhs.superseded,
            errored: self.errored + rhs.errored,
            batches_failed: self.batches_failed + rhs.batches_failed,
            batches_skipped: self.batches_skipped + rhs.batches_skipped,
        }
    }
}

impl AddAssign for SyncCounters {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

//--------------------------------------       SyncRun         ---------------------------------------------------------
/// One sync run. An active run (no `finished_at`) doubles as the run lock for its `(user_id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: i64,
    pub user_id: String,
    pub kind: SyncKind,
    pub stage: SyncStage,
    #[sqlx(flatten)]
    pub counters: SyncCounters,
    pub resumable: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

//--------------------------------------      SyncCursor       ---------------------------------------------------------
/// Resumable progress of a `(user, kind)`. `range_start` is the earliest point the run that wrote the cursor was
/// asked to cover; `position` is how far it got (an RFC 3339 timestamp for the ledger, a line item row id for
/// estimates).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub user_id: String,
    pub kind: SyncKind,
    pub range_start: Option<DateTime<Utc>>,
    pub position: String,
    /// End of the ledger window that `position` starts, when that window was left part-way through
    pub window_end: Option<DateTime<Utc>>,
    /// The feed's token for the next unread page of that window
    pub page_token: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncCursor {
    pub fn continuation(&self) -> Option<PageContinuation> {
        match (self.window_end, self.page_token.as_ref()) {
            (Some(window_end), Some(token)) if !token.is_empty() => {
                Some(PageContinuation { window_end, token: token.clone() })
            },
            _ => None,
        }
    }
}

/// A paginated window that was left part-way through, and the token for its next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContinuation {
    pub window_end: DateTime<Utc>,
    pub token: String,
}

//--------------------------------------  ProcessedSettlement  ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedSettlementReport {
    pub user_id: String,
    pub report_id: String,
    pub settlement_id: Option<String>,
    pub row_count: i64,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn source_precedence() {
        assert!(FeeSource::SettlementReport.outranks(&FeeSource::FinancialEventsApi));
        assert!(FeeSource::FinancialEventsApi.outranks(&FeeSource::Estimated));
        assert!(!FeeSource::Estimated.outranks(&FeeSource::Estimated));
        let best = [FeeSource::Estimated, FeeSource::SettlementReport, FeeSource::FinancialEventsApi].into_iter().max();
        assert_eq!(best, Some(FeeSource::SettlementReport));
    }

    #[test]
    fn category_names_round_trip() {
        for c in FeeCategory::ALL {
            assert_eq!(c.to_string().parse::<FeeCategory>().unwrap(), c);
        }
        assert_eq!(serde_json::to_string(&FeeCategory::LongTermStorage).unwrap(), "\"LONG_TERM_STORAGE\"");
    }

    #[test]
    fn amounts_total_is_sum_of_fields() {
        let mut amounts = CategoryAmounts::default();
        amounts.set(FeeCategory::FbaFulfillment, Cents::from(342));
        amounts.set(FeeCategory::Referral, Cents::from(110));
        amounts.set(FeeCategory::RefundedReferral, Cents::from(-50));
        assert_eq!(amounts.get(FeeCategory::Referral), Cents::from(110));
        assert_eq!(amounts.total(), Cents::from(402));
    }

    #[test]
    fn stage_transitions() {
        use SyncStage::*;
        let happy = [Queued, Fetching, Parsing, Matching, Aggregating, Writing, Fetching, Parsing];
        for pair in happy.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} → {}", pair[0], pair[1]);
        }
        assert!(Writing.can_transition_to(Done));
        assert!(Matching.can_transition_to(Failed));
        assert!(Parsing.can_transition_to(Fetching));
        assert!(!Parsing.can_transition_to(Writing));
        assert!(!Done.can_transition_to(Fetching));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn periods() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 0).unwrap();
        assert_eq!(period_of(&ts), "2024-02");
    }
}
