//! Native payload shapes of the marketplace feeds.
//!
//! The ledger feed mixes `PascalCase` and `camelCase` keys depending on API version, so JSON responses are passed
//! through [`pascal_case_keys`] before being deserialized into these types. Every list is optional on the wire and
//! defaults to empty here.
use std::str::FromStr;

use chrono::{DateTime, Utc};
use frs_common::{Cents, CentsConversionError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Recursively upper-cases the first character of every object key, so `amazonOrderId` and `AmazonOrderId` both
/// deserialize into the same field.
pub fn pascal_case_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let normalized = map
                .into_iter()
                .map(|(k, v)| {
                    let mut chars = k.chars();
                    let key = match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => k,
                    };
                    (key, pascal_case_keys(v))
                })
                .collect::<Map<String, Value>>();
            Value::Object(normalized)
        },
        Value::Array(items) => Value::Array(items.into_iter().map(pascal_case_keys).collect()),
        other => other,
    }
}

//--------------------------------------        Money          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AmountValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Money {
    pub currency_code: Option<String>,
    #[serde(alias = "Amount")]
    pub currency_amount: Option<AmountValue>,
}

impl Money {
    pub fn new(currency_code: &str, amount: f64) -> Self {
        Self { currency_code: Some(currency_code.to_string()), currency_amount: Some(AmountValue::Number(amount)) }
    }

    /// The signed amount in cents. A missing amount is zero.
    pub fn to_cents(&self) -> Result<Cents, CentsConversionError> {
        match &self.currency_amount {
            None => Ok(Cents::default()),
            Some(AmountValue::Number(n)) => Cents::from_f64(*n),
            Some(AmountValue::Text(s)) => Cents::from_str(s),
        }
    }
}

//--------------------------------------    Ledger events      ---------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FinancialEventsResponse {
    pub payload: Option<FinancialEventsPage>,
    #[serde(default)]
    pub errors: Vec<FeedErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FinancialEventsPage {
    pub next_token: Option<String>,
    #[serde(default)]
    pub financial_events: FinancialEvents,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FinancialEvents {
    pub shipment_event_list: Vec<ShipmentEvent>,
    pub refund_event_list: Vec<ShipmentEvent>,
    pub guarantee_claim_event_list: Vec<ShipmentEvent>,
    pub chargeback_event_list: Vec<ShipmentEvent>,
    pub service_fee_event_list: Vec<ServiceFeeEvent>,
    pub adjustment_event_list: Vec<AdjustmentEvent>,
    pub removal_shipment_event_list: Vec<RemovalShipmentEvent>,
}

impl FinancialEvents {
    pub fn event_count(&self) -> usize {
        self.shipment_event_list.len() +
            self.refund_event_list.len() +
            self.guarantee_claim_event_list.len() +
            self.chargeback_event_list.len() +
            self.service_fee_event_list.len() +
            self.adjustment_event_list.len() +
            self.removal_shipment_event_list.len()
    }
}

/// Shipment, refund, guarantee claim and chargeback events share one shape. Shipments fill `shipment_item_list`,
/// the others fill `shipment_item_adjustment_list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ShipmentEvent {
    #[serde(alias = "OrderId")]
    pub amazon_order_id: Option<String>,
    pub seller_order_id: Option<String>,
    pub marketplace_name: Option<String>,
    pub posted_date: Option<DateTime<Utc>>,
    pub shipment_item_list: Vec<ShipmentItem>,
    pub shipment_item_adjustment_list: Vec<ShipmentItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ShipmentItem {
    #[serde(rename = "SellerSKU", alias = "SellerSku")]
    pub seller_sku: Option<String>,
    pub order_item_id: Option<String>,
    pub order_adjustment_item_id: Option<String>,
    pub quantity_shipped: Option<i64>,
    pub item_charge_list: Vec<ChargeComponent>,
    pub item_charge_adjustment_list: Vec<ChargeComponent>,
    pub item_fee_list: Vec<FeeComponent>,
    pub item_fee_adjustment_list: Vec<FeeComponent>,
    pub promotion_list: Vec<Promotion>,
    pub promotion_adjustment_list: Vec<Promotion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChargeComponent {
    pub charge_type: Option<String>,
    pub charge_amount: Money,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FeeComponent {
    pub fee_type: Option<String>,
    pub fee_amount: Money,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Promotion {
    pub promotion_type: Option<String>,
    pub promotion_id: Option<String>,
    pub promotion_amount: Money,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceFeeEvent {
    #[serde(alias = "OrderId")]
    pub amazon_order_id: Option<String>,
    pub fee_reason: Option<String>,
    pub fee_list: Vec<FeeComponent>,
    #[serde(rename = "SellerSKU", alias = "SellerSku")]
    pub seller_sku: Option<String>,
    #[serde(rename = "FnSKU", alias = "FnSku")]
    pub fn_sku: Option<String>,
    pub fee_description: Option<String>,
    #[serde(rename = "ASIN", alias = "Asin")]
    pub asin: Option<String>,
    pub posted_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AdjustmentEvent {
    pub adjustment_type: Option<String>,
    pub posted_date: Option<DateTime<Utc>>,
    pub adjustment_amount: Money,
    pub adjustment_item_list: Vec<AdjustmentItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AdjustmentItem {
    pub quantity: Option<String>,
    pub per_unit_amount: Money,
    pub total_amount: Money,
    #[serde(rename = "SellerSKU", alias = "SellerSku")]
    pub seller_sku: Option<String>,
    #[serde(rename = "FnSKU", alias = "FnSku")]
    pub fn_sku: Option<String>,
    pub product_description: Option<String>,
    #[serde(rename = "ASIN", alias = "Asin")]
    pub asin: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RemovalShipmentEvent {
    pub posted_date: Option<DateTime<Utc>>,
    pub merchant_order_id: Option<String>,
    pub order_id: Option<String>,
    pub transaction_type: Option<String>,
    pub removal_shipment_item_list: Vec<RemovalShipmentItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RemovalShipmentItem {
    pub removal_shipment_item_id: Option<String>,
    pub fulfillment_network_sku: Option<String>,
    pub quantity: Option<i64>,
    pub revenue: Money,
    pub fee_amount: Money,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FeedErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
}

impl FeedErrorDetail {
    pub fn join(errors: &[FeedErrorDetail]) -> String {
        errors
            .iter()
            .map(|e| format!("{}: {}", e.code.as_deref().unwrap_or("?"), e.message.as_deref().unwrap_or("")))
            .collect::<Vec<String>>()
            .join(", ")
    }
}

//--------------------------------------  Settlement reports   ---------------------------------------------------------
pub const SETTLEMENT_REPORT_TYPE: &str = "GET_V2_SETTLEMENT_REPORT_DATA_FLAT_FILE_V2";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportsPage {
    pub reports: Vec<ReportInfo>,
    pub next_token: Option<String>,
}

/// One available settlement export document.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportInfo {
    pub report_id: String,
    pub report_type: String,
    pub marketplace_ids: Vec<String>,
    pub data_start_time: Option<DateTime<Utc>>,
    pub data_end_time: Option<DateTime<Utc>>,
    pub created_time: Option<DateTime<Utc>>,
    pub processing_status: Option<String>,
    pub report_document_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportDocument {
    pub report_document_id: String,
    pub url: String,
    pub compression_algorithm: Option<String>,
}

//--------------------------------------    Fee estimates      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductIdType {
    Sku,
    Asin,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FeesEstimateResponse {
    pub payload: Option<FeesEstimatePayload>,
    pub errors: Vec<FeedErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FeesEstimatePayload {
    pub fees_estimate_result: FeesEstimateResult,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FeesEstimateResult {
    pub status: Option<String>,
    pub fees_estimate: Option<FeesEstimate>,
    pub error: Option<FeedErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FeesEstimate {
    pub time_of_fees_estimation: Option<DateTime<Utc>>,
    pub total_fees_estimate: Money,
    pub fee_detail_list: Vec<FeeDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FeeDetail {
    pub fee_type: Option<String>,
    pub fee_amount: Money,
    pub final_fee: Money,
}
