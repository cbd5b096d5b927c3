use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Cents, FeeCategory, FeeSource},
    normalizer::{classify_descriptor, FeeDescriptor},
};

/// One charge as reported by one feed, in the single shape every adapter produces.
///
/// `signed_amount` keeps the feed's sign convention: money leaving the seller is negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFeeRecord {
    pub source: FeeSource,
    pub transaction_type: String,
    pub fee_type_text: String,
    pub order_id: Option<String>,
    pub sku: Option<String>,
    pub asin: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub signed_amount: Cents,
    pub currency: Option<String>,
    pub batch_id: String,
}

impl RawFeeRecord {
    pub fn new(source: FeeSource, transaction_type: &str, fee_type_text: &str, batch_id: &str) -> Self {
        Self {
            source,
            transaction_type: transaction_type.to_string(),
            fee_type_text: fee_type_text.to_string(),
            order_id: None,
            sku: None,
            asin: None,
            posted_at: Utc::now(),
            signed_amount: Cents::default(),
            currency: None,
            batch_id: batch_id.to_string(),
        }
    }

    pub fn with_order(mut self, order_id: Option<&str>) -> Self {
        self.order_id = order_id.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        self
    }

    pub fn with_sku(mut self, sku: Option<&str>) -> Self {
        self.sku = sku.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        self
    }

    pub fn with_asin(mut self, asin: Option<&str>) -> Self {
        self.asin = asin.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        self
    }

    pub fn with_amount(mut self, signed_amount: Cents) -> Self {
        self.signed_amount = signed_amount;
        self
    }

    pub fn with_currency(mut self, currency: Option<&str>) -> Self {
        self.currency = currency.map(String::from);
        self
    }

    pub fn posted_at(mut self, ts: DateTime<Utc>) -> Self {
        self.posted_at = ts;
        self
    }

    /// Classifies the record and converts its amount to a cost (`-signed_amount`), so charged fees are positive and
    /// credits negative.
    pub fn canonicalize(&self) -> CanonicalFeeEvent {
        let descriptor = FeeDescriptor::in_transaction(&self.transaction_type, &self.fee_type_text);
        CanonicalFeeEvent {
            order_id: self.order_id.clone(),
            sku: self.sku.clone(),
            asin: self.asin.clone(),
            category: classify_descriptor(&descriptor),
            amount: -self.signed_amount,
            source: self.source,
            batch_id: self.batch_id.clone(),
            posted_at: self.posted_at,
            captured_at: Utc::now(),
        }
    }
}

/// A classified fee, with its amount expressed as a cost to the seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalFeeEvent {
    pub order_id: Option<String>,
    pub sku: Option<String>,
    pub asin: Option<String>,
    pub category: FeeCategory,
    pub amount: Cents,
    pub source: FeeSource,
    pub batch_id: String,
    pub posted_at: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
}

impl CanonicalFeeEvent {
    pub fn is_account_level(&self) -> bool {
        self.order_id.is_none()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fees_become_positive_costs() {
        let record = RawFeeRecord::new(FeeSource::SettlementReport, "Order", "FBAPerUnitFulfillmentFee", "R1")
            .with_order(Some("111-222"))
            .with_sku(Some("ABC"))
            .with_amount(Cents::from(-342));
        let event = record.canonicalize();
        assert_eq!(event.category, FeeCategory::FbaFulfillment);
        assert_eq!(event.amount, Cents::from(342));
        assert!(!event.is_account_level());
    }

    #[test]
    fn refunded_commission_is_a_credit() {
        let record = RawFeeRecord::new(FeeSource::SettlementReport, "Refund", "Commission", "R1")
            .with_order(Some("111-222"))
            .with_amount(Cents::from(110));
        let event = record.canonicalize();
        assert_eq!(event.category, FeeCategory::RefundedReferral);
        assert_eq!(event.amount, Cents::from(-110));
    }

    #[test]
    fn blank_identifiers_are_absent() {
        let record = RawFeeRecord::new(FeeSource::SettlementReport, "Other", "Subscription", "R1")
            .with_order(Some("  "))
            .with_sku(Some(""));
        assert!(record.order_id.is_none());
        assert!(record.sku.is_none());
        assert!(record.canonicalize().is_account_level());
    }
}
