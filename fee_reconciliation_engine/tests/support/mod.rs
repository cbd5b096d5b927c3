#![allow(dead_code)]
//! A marketplace stand-in that serves canned settlement documents, ledger events and fee estimates.
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use chrono::{DateTime, Duration, Utc};
use fee_reconciliation_engine::{
    db_types::{Cents, NewLineItem},
    events::EventProducers,
    feeds::{EstimateRequest, EstimatedFee, FeeEstimateSource, FeedError, LedgerEventSource, SettlementReportSource},
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    FeeQueryApi,
    FeeReconciliationDatabase,
    FeeSyncApi,
    LineItemStore,
    SqliteDatabase,
    SyncConfig,
};
use log::*;
use marketplace_tools::data_objects::{pascal_case_keys, FinancialEventsPage, ReportInfo};
use serde_json::{json, Map, Value};

pub const HEADER: &str = "settlement-id\tsettlement-start-date\tsettlement-end-date\ttotal-amount\tcurrency\t\
                          transaction-type\torder-id\tsku\tamount-type\tamount-description\tamount\tposted-date";

/// `(transaction type, order id, sku, amount type, description, amount)`
pub type SettlementRow<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str, &'a str);

pub fn settlement_document(settlement_id: &str, posted: DateTime<Utc>, rows: &[SettlementRow<'_>]) -> String {
    let date = posted.format("%Y-%m-%d").to_string();
    let mut lines = vec![HEADER.to_string(), format!("{settlement_id}\t\t\t0.00\tUSD\t\t\t\t\t\t\t")];
    for (tx_type, order_id, sku, amount_type, desc, amount) in rows {
        let row = [*tx_type, *order_id, *sku, *amount_type, *desc, *amount, date.as_str()].join("\t");
        lines.push(format!("{settlement_id}\t\t\t\tUSD\t{row}"));
    }
    lines.join("\n")
}

#[derive(Debug, Default)]
pub struct FakeMarketplace {
    reports: Vec<(ReportInfo, String)>,
    /// `(date the feed files the event under, event list name, event)`
    ledger_events: Vec<(DateTime<Utc>, &'static str, Value)>,
    ledger_page_size: Option<usize>,
    estimates: HashMap<String, Vec<EstimatedFee>>,
    broken_documents: HashSet<String>,
    reject_credentials: bool,
    pub downloads: AtomicUsize,
    pub ledger_calls: AtomicUsize,
    pub estimate_calls: AtomicUsize,
    pub ledger_windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl FakeMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settlement(mut self, report_id: &str, created: DateTime<Utc>, body: String) -> Self {
        let info = ReportInfo {
            report_id: report_id.to_string(),
            report_type: "GET_V2_SETTLEMENT_REPORT_DATA_FLAT_FILE_V2".into(),
            marketplace_ids: vec!["ATVPDKIKX0DER".into()],
            data_start_time: Some(created - Duration::days(14)),
            data_end_time: Some(created),
            created_time: Some(created),
            processing_status: Some("DONE".into()),
            report_document_id: Some(format!("doc-{report_id}")),
        };
        self.reports.push((info, body));
        self
    }

    /// Adds a shipment event with the given item fees (`(fee type, signed amount)`).
    pub fn with_shipment(mut self, order_id: &str, sku: &str, posted: DateTime<Utc>, fees: &[(&str, f64)]) -> Self {
        let fee_list = fees
            .iter()
            .map(|(fee_type, amount)| {
                json!({ "feeType": fee_type, "feeAmount": { "currencyCode": "USD", "currencyAmount": amount } })
            })
            .collect::<Vec<Value>>();
        let event = json!({
            "amazonOrderId": order_id,
            "postedDate": posted.to_rfc3339(),
            "shipmentItemList": [{ "sellerSKU": sku, "quantityShipped": 1, "itemFeeList": fee_list }]
        });
        self.ledger_events.push((posted, "shipmentEventList", event));
        self
    }

    /// Adds an order-less service fee. The feed files it under `filed_at` but, like the real feed, gives it no
    /// posted date.
    pub fn with_service_fee(mut self, reason: &str, filed_at: DateTime<Utc>, amount: f64) -> Self {
        let event = json!({
            "feeReason": reason,
            "feeList": [{ "feeType": reason, "feeAmount": { "currencyCode": "USD", "currencyAmount": amount } }]
        });
        self.ledger_events.push((filed_at, "serviceFeeEventList", event));
        self
    }

    /// Serves ledger windows `size` events per page.
    pub fn with_ledger_page_size(mut self, size: usize) -> Self {
        self.ledger_page_size = Some(size);
        self
    }

    /// The end of the latest window the ledger was asked for.
    pub fn furthest_ledger_window_end(&self) -> Option<DateTime<Utc>> {
        self.ledger_windows.lock().ok()?.iter().map(|(_, before)| *before).max()
    }

    pub fn with_estimate(mut self, sku: &str, fees: &[(&str, i64)]) -> Self {
        let fees =
            fees.iter().map(|(t, a)| EstimatedFee { fee_type: t.to_string(), amount: Cents::from(*a) }).collect();
        self.estimates.insert(sku.to_string(), fees);
        self
    }

    pub fn with_broken_document(mut self, report_id: &str) -> Self {
        self.broken_documents.insert(report_id.to_string());
        self
    }

    pub fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    fn check_credentials(&self) -> Result<(), FeedError> {
        if self.reject_credentials {
            Err(FeedError::Authentication("The access token has expired".into()))
        } else {
            Ok(())
        }
    }
}

impl SettlementReportSource for FakeMarketplace {
    async fn list_settlement_reports(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<(Vec<ReportInfo>, Option<String>), FeedError> {
        self.check_credentials()?;
        let in_range = self
            .reports
            .iter()
            .map(|(info, _)| info.clone())
            .filter(|info| info.created_time.map(|t| t >= since && t < until).unwrap_or(false))
            .collect::<Vec<ReportInfo>>();
        // Two documents per page, so pagination is exercised.
        let page = next_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        let items = in_range.iter().skip(page * 2).take(2).cloned().collect::<Vec<_>>();
        let next = if (page + 1) * 2 < in_range.len() { Some((page + 1).to_string()) } else { None };
        Ok((items, next))
    }

    async fn download_settlement_report(&self, report: &ReportInfo) -> Result<String, FeedError> {
        self.check_credentials()?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.broken_documents.contains(&report.report_id) {
            return Err(FeedError::Server { status: 500, message: "document storage unavailable".into() });
        }
        self.reports
            .iter()
            .find(|(info, _)| info.report_id == report.report_id)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| FeedError::Rejected { status: 404, message: format!("No document {}", report.report_id) })
    }
}

impl LedgerEventSource for FakeMarketplace {
    async fn fetch_ledger_page(
        &self,
        posted_after: DateTime<Utc>,
        posted_before: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<FinancialEventsPage, FeedError> {
        self.check_credentials()?;
        self.ledger_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut windows) = self.ledger_windows.lock() {
            windows.push((posted_after, posted_before));
        }
        let in_window = self
            .ledger_events
            .iter()
            .filter(|(filed, _, _)| *filed >= posted_after && *filed < posted_before)
            .collect::<Vec<_>>();
        let size = self.ledger_page_size.unwrap_or(usize::MAX).max(1);
        let page = next_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        let mut lists = Map::new();
        for (_, list, event) in in_window.iter().skip(page.saturating_mul(size)).take(size) {
            if let Some(events) = lists.entry(list.to_string()).or_insert_with(|| json!([])).as_array_mut() {
                events.push(event.clone());
            }
        }
        let next = if (page + 1).saturating_mul(size) < in_window.len() { Some((page + 1).to_string()) } else { None };
        let page = json!({ "nextToken": next, "financialEvents": Value::Object(lists) });
        serde_json::from_value(pascal_case_keys(page)).map_err(|e| FeedError::Malformed(e.to_string()))
    }
}

impl FeeEstimateSource for FakeMarketplace {
    async fn estimate_fees(&self, request: &EstimateRequest) -> Result<Vec<EstimatedFee>, FeedError> {
        self.check_credentials()?;
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        self.estimates
            .get(&request.product_id)
            .cloned()
            .ok_or_else(|| FeedError::Rejected { status: 400, message: format!("Unknown product {}", request.product_id) })
    }
}

#[derive(Debug)]
pub struct TestSystem {
    pub url: String,
    pub api: FeeSyncApi<SqliteDatabase>,
}

impl TestSystem {
    pub async fn new(config: SyncConfig) -> Self {
        Self::with_producers(config, EventProducers::default()).await
    }

    pub async fn with_producers(config: SyncConfig, producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        Self { url, api: FeeSyncApi::new(db, config, producers) }
    }

    pub fn db(&self) -> &SqliteDatabase {
        self.api.db()
    }

    pub fn query(&self) -> FeeQueryApi<SqliteDatabase> {
        FeeQueryApi::new(self.db().clone())
    }

    pub async fn add_line_item(&self, order_id: &str, line_item_id: &str, sku: &str, quantity: i64, days_ago: i64) {
        let mut item = NewLineItem::new("alice", order_id, line_item_id, sku, quantity, Cents::from(1999));
        item.purchased_at = Utc::now() - Duration::days(days_ago);
        self.db().upsert_line_item(item).await.expect("Error saving line item");
    }

    pub async fn tear_down(self) {
        let mut db = self.api.db().clone();
        if let Err(e) = db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        drop_database(&self.url).await;
    }
}
