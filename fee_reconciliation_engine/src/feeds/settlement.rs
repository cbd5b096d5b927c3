//! Settlement export adapter.
//!
//! A settlement document is a tab-delimited table with a header row. The first data row is usually a summary row
//! carrying the settlement totals and no transaction type; it is not a fee and is skipped silently.
use std::{collections::HashMap, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use log::*;

use crate::{
    db_types::{Cents, FeeSource},
    feeds::{FeedError, RawFeeRecord},
};

const SETTLEMENT_ID: &str = "settlement-id";
const ORDER_ID: &str = "order-id";
const SKU: &str = "sku";
const TRANSACTION_TYPE: &str = "transaction-type";
const AMOUNT_TYPE: &str = "amount-type";
const AMOUNT_DESCRIPTION: &str = "amount-description";
const AMOUNT: &str = "amount";
const POSTED_DATE: &str = "posted-date";
const POSTED_DATE_TIME: &str = "posted-date-time";
const CURRENCY: &str = "currency";

const REVENUE_DESCRIPTIONS: [&str; 6] = ["principal", "shipping", "tax", "shippingtax", "giftwrap", "giftwraptax"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementParseStats {
    /// Data rows read, including the ones that were skipped
    pub rows: i64,
    pub skipped_malformed: i64,
    pub transfers_excluded: i64,
    pub non_fee: i64,
}

#[derive(Debug, Clone)]
pub struct ParsedSettlement {
    pub report_id: String,
    pub settlement_id: Option<String>,
    pub records: Vec<RawFeeRecord>,
    pub stats: SettlementParseStats,
}

struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let index = headers.iter().enumerate().map(|(i, h)| (header_key(h), i)).collect();
        Self { index }
    }

    fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn get<'r>(&self, row: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.index.get(name).and_then(|i| row.get(*i)).map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Column names compare case-insensitively, with `-`, `_` and spaces treated as the same separator.
fn header_key(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .map(|c| if c == '_' || c == ' ' { '-' } else { c.to_ascii_lowercase() })
        .collect()
}

/// Parses one settlement document into fee records.
///
/// Rows missing a required value are counted as malformed and skipped. `Transfer` rows (payouts to the seller's
/// bank) and revenue rows are counted and dropped. Only a document without the required columns is an error.
pub fn parse_settlement_document(report_id: &str, body: &str) -> Result<ParsedSettlement, FeedError> {
    let mut reader =
        ReaderBuilder::new().delimiter(b'\t').flexible(true).has_headers(true).quoting(false).from_reader(body.as_bytes());
    let headers = reader.headers().map_err(|e| FeedError::Malformed(format!("Report {report_id}: {e}")))?.clone();
    let cols = Columns::new(&headers);
    let date_column = if cols.has(POSTED_DATE) { POSTED_DATE } else { POSTED_DATE_TIME };
    for required in [TRANSACTION_TYPE, AMOUNT_DESCRIPTION, AMOUNT, date_column] {
        if !cols.has(required) {
            return Err(FeedError::Malformed(format!("Report {report_id} has no '{required}' column")));
        }
    }
    let mut result =
        ParsedSettlement { report_id: report_id.to_string(), settlement_id: None, records: Vec::new(), stats: Default::default() };
    for (line, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("📥️ Report {report_id}, row {}: unreadable row. {e}", line + 2);
                result.stats.rows += 1;
                result.stats.skipped_malformed += 1;
                continue;
            },
        };
        if row.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if result.settlement_id.is_none() {
            result.settlement_id = cols.get(&row, SETTLEMENT_ID).map(String::from);
        }
        let Some(transaction_type) = cols.get(&row, TRANSACTION_TYPE) else {
            if cols.get(&row, AMOUNT_DESCRIPTION).is_none() {
                trace!("📥️ Report {report_id}: skipping summary row");
            } else {
                result.stats.rows += 1;
                result.stats.skipped_malformed += 1;
            }
            continue;
        };
        result.stats.rows += 1;
        if transaction_type.eq_ignore_ascii_case("transfer") {
            result.stats.transfers_excluded += 1;
            continue;
        }
        let description = cols.get(&row, AMOUNT_DESCRIPTION);
        let amount = cols.get(&row, AMOUNT).and_then(|a| Cents::from_str(a).ok());
        let posted = cols.get(&row, date_column).and_then(parse_posted_date);
        let (Some(description), Some(amount), Some(posted)) = (description, amount, posted) else {
            debug!("📥️ Report {report_id}, row {}: missing or unparsable required value", line + 2);
            result.stats.skipped_malformed += 1;
            continue;
        };
        if is_revenue(cols.get(&row, AMOUNT_TYPE), description) {
            result.stats.non_fee += 1;
            continue;
        }
        let record = RawFeeRecord::new(FeeSource::SettlementReport, transaction_type, description, report_id)
            .with_order(cols.get(&row, ORDER_ID))
            .with_sku(cols.get(&row, SKU))
            .with_amount(amount)
            .with_currency(cols.get(&row, CURRENCY))
            .posted_at(posted);
        trace!("📥️ Report {report_id}: {record:?}");
        result.records.push(record);
    }
    debug!(
        "📥️ Report {report_id} parsed. {} fee records from {} rows ({} malformed, {} transfers, {} non-fee)",
        result.records.len(),
        result.stats.rows,
        result.stats.skipped_malformed,
        result.stats.transfers_excluded,
        result.stats.non_fee
    );
    Ok(result)
}

fn is_revenue(amount_type: Option<&str>, description: &str) -> bool {
    if amount_type.map(|t| t.eq_ignore_ascii_case("ItemPrice")).unwrap_or(false) {
        return true;
    }
    let squashed = description.to_ascii_lowercase().replace([' ', '-', '_'], "");
    REVENUE_DESCRIPTIONS.contains(&squashed.as_str())
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS UTC`, `DD.MM.YYYY` and `YYYY-MM-DD`. Bare dates are taken as midnight UTC.
pub fn parse_posted_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = s.strip_suffix("UTC").map(str::trim).unwrap_or(s);
    if let Ok(ts) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    ["%d.%m.%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(naive, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}
