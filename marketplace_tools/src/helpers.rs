use chrono::{DateTime, SecondsFormat, Utc};
use frs_common::Cents;

/// The ISO-8601 form the feeds expect for date filters, e.g. `2024-05-01T00:00:00Z`.
pub fn iso8601(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Converts cents into the decimal number the fee estimate endpoint expects in its request body.
pub fn cents_to_decimal(amount: Cents) -> f64 {
    amount.value() as f64 / 100.0
}
