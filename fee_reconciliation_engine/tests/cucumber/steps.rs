use std::{collections::HashMap, str::FromStr};

use chrono::{Duration, Utc};
use cucumber::{gherkin::Step, given, then, when};
use fee_reconciliation_engine::{
    db_types::{Cents, FeeCategory, FeeSource, SyncRun},
    SyncError,
    SyncRequest,
};

use crate::{
    cucumber::{world::USER, FeeWorld},
    support::settlement_document,
};

/// The data rows of a step table, keyed by the header row.
fn table_rows(step: &Step) -> Vec<HashMap<String, String>> {
    let table = step.table.as_ref().expect("This step needs a table");
    let mut rows = table.rows.iter();
    let header = rows.next().cloned().unwrap_or_default();
    rows.map(|row| header.iter().cloned().zip(row.iter().cloned()).collect()).collect()
}

fn cents(s: &str) -> Cents {
    Cents::from_str(s).unwrap_or_else(|e| panic!("{s} is not an amount: {e}"))
}

#[given(expr = "order {string} has line item {string} for {int} unit(s) of {string} bought {int} days ago")]
async fn line_item(world: &mut FeeWorld, order_id: String, line_item_id: String, qty: i64, sku: String, days: i64) {
    world.system().add_line_item(&order_id, &line_item_id, &sku, qty, days).await;
}

#[given(expr = "settlement document {string} from {int} days ago contains:")]
async fn settlement(world: &mut FeeWorld, report_id: String, days: i64, step: &Step) {
    let created = Utc::now() - Duration::days(days);
    let rows = table_rows(step);
    let cells = rows
        .iter()
        .map(|r| {
            let get = |k: &str| r.get(k).map(String::as_str).unwrap_or("");
            let tx_type = r.get("type").map(String::as_str).unwrap_or("Order");
            let amount_type = r.get("amount type").map(String::as_str).unwrap_or("ItemFees");
            (tx_type, get("order"), get("sku"), amount_type, get("description"), get("amount"))
        })
        .collect::<Vec<_>>();
    let body = settlement_document(&format!("S-{report_id}"), created, &cells);
    world.feed = std::mem::take(&mut world.feed).with_settlement(&report_id, created, body);
}

#[given(expr = "the ledger has a shipment of {string} for order {string} from {int} days ago with fees:")]
async fn shipment(world: &mut FeeWorld, sku: String, order_id: String, days: i64, step: &Step) {
    let posted = Utc::now() - Duration::days(days);
    let fees = table_rows(step)
        .into_iter()
        .map(|r| {
            let amount = r["amount"].parse::<f64>().expect("Invalid amount");
            (r["fee type"].clone(), amount)
        })
        .collect::<Vec<(String, f64)>>();
    let fees = fees.iter().map(|(t, a)| (t.as_str(), *a)).collect::<Vec<_>>();
    world.feed = std::mem::take(&mut world.feed).with_shipment(&order_id, &sku, posted, &fees);
}

#[given(expr = "the fee estimate for {string} is:")]
async fn estimate(world: &mut FeeWorld, sku: String, step: &Step) {
    let fees = table_rows(step)
        .into_iter()
        .map(|r| (r["fee type"].clone(), cents(&r["amount"]).value()))
        .collect::<Vec<(String, i64)>>();
    let fees = fees.iter().map(|(t, a)| (t.as_str(), *a)).collect::<Vec<_>>();
    world.feed = std::mem::take(&mut world.feed).with_estimate(&sku, &fees);
}

#[given("the marketplace rejects our credentials")]
async fn reject_credentials(world: &mut FeeWorld) {
    world.feed = std::mem::take(&mut world.feed).rejecting_credentials();
}

#[when(expr = "I run a(n) {word} sync for {int} month(s)")]
async fn run_sync(world: &mut FeeWorld, kind: String, months: u32) {
    let request = SyncRequest::new(USER, months);
    let api = world.api();
    let result = match kind.as_str() {
        "settlement" => api.sync_settlement(&world.feed, &request).await,
        "ledger" => api.sync_ledger(&world.feed, &request).await,
        "estimate" => api.sync_estimates(&world.feed, &request).await,
        _ => panic!("Unknown sync kind: {kind}"),
    };
    world.last_run = Some(result);
}

#[then(expr = "line item {string} has a total fee of {string}")]
async fn total_fee(world: &mut FeeWorld, line_item_id: String, amount: String) {
    let b = world.breakdown(&line_item_id).await.expect("No breakdown was written");
    assert_eq!(b.total_fee, cents(&amount), "Total fee of {line_item_id} is incorrect");
    assert_eq!(b.total_fee, b.amounts.total(), "Total fee does not match the categories");
}

#[then(expr = "line item {string} has {word} fees of {string}")]
async fn category_fee(world: &mut FeeWorld, line_item_id: String, category: String, amount: String) {
    let category = FeeCategory::from_str(&category).expect("Unknown fee category");
    let b = world.breakdown(&line_item_id).await.expect("No breakdown was written");
    assert_eq!(b.amounts.get(category), cents(&amount), "{category} of {line_item_id} is incorrect");
}

#[then(expr = "line item {string} is sourced from {word}")]
async fn authoritative_source(world: &mut FeeWorld, line_item_id: String, source: String) {
    let source = FeeSource::from_str(&source).expect("Unknown fee source");
    let b = world.breakdown(&line_item_id).await.expect("No breakdown was written");
    assert_eq!(b.authoritative_source, Some(source));
}

#[then(expr = "line item {string} has no fee breakdown")]
async fn no_breakdown(world: &mut FeeWorld, line_item_id: String) {
    assert!(world.breakdown(&line_item_id).await.is_none(), "{line_item_id} has a breakdown");
}

#[then(expr = "the account-level fees total {string}")]
async fn account_fees(world: &mut FeeWorld, amount: String) {
    let fees = world.system().query().account_fees(USER, None).await.expect("Error fetching account fees");
    let total = fees.iter().map(|f| f.amount).sum::<Cents>();
    assert_eq!(total, cents(&amount));
}

#[then(expr = "{int} unmatched fee(s) is/are recorded")]
async fn unmatched(world: &mut FeeWorld, count: usize) {
    let fees = world.system().query().unmatched_fees(USER).await.expect("Error fetching unmatched fees");
    assert_eq!(fees.len(), count);
}

fn counter(run: &SyncRun, name: &str) -> i64 {
    let c = &run.counters;
    match name {
        "matched" => c.matched,
        "unmatched" => c.unmatched,
        "account-level" => c.account_level,
        "updated" => c.updated,
        "unchanged" => c.unchanged,
        "superseded" => c.superseded,
        "transfers" => c.transfers_excluded,
        "skipped" => c.batches_skipped,
        "failed" => c.batches_failed,
        _ => panic!("Unknown counter: {name}"),
    }
}

#[then(expr = "the run counted {int} {word}")]
async fn run_counter(world: &mut FeeWorld, value: i64, name: String) {
    assert_eq!(counter(world.last_run(), &name), value, "Counter '{name}' is incorrect");
}

#[then(expr = "the run is resumable")]
async fn resumable(world: &mut FeeWorld) {
    assert!(world.last_run().resumable);
}

#[then(expr = "the run is complete")]
async fn complete(world: &mut FeeWorld) {
    assert!(!world.last_run().resumable);
}

#[then("the sync fails with an authentication error")]
async fn auth_error(world: &mut FeeWorld) {
    match world.last_run.as_ref().expect("No sync has run yet") {
        Err(SyncError::Authentication(_)) => {},
        other => panic!("Expected an authentication error, got {other:?}"),
    }
}
