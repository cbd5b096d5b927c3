//! Ledger event adapter.
//!
//! A page of the ledger feed holds several parallel event lists, each with nested per-item fee lists. Every fee,
//! fee adjustment and promotion in those lists becomes one [`RawFeeRecord`]. Item charges (principal, tax, shipping)
//! are revenue and are not emitted.
//!
//! A ledger record's `batch_id` is a fingerprint of the financial event it came from, so an event fetched again by a
//! later, overlapping window lands on the same contribution key instead of being counted twice.
//!
//! Windows are laid on a fixed grid of `width`-sized cells counted from the Unix epoch. Service fee events arrive
//! without a posted date; they are dated at the start of the grid cell they were fetched from, which does not depend
//! on where a run happened to start its first window.
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::*;
use marketplace_tools::data_objects::{
    AdjustmentEvent,
    FeeComponent,
    FinancialEvents,
    Money,
    Promotion,
    RemovalShipmentEvent,
    ServiceFeeEvent,
    ShipmentEvent,
};

use crate::{
    db_types::{Cents, FeeSource},
    feeds::{FeedError, LedgerEventSource, RawFeeRecord},
    sync::FeedThrottle,
};

#[derive(Debug, Clone, Default)]
pub struct FlattenedEvents {
    pub records: Vec<RawFeeRecord>,
    /// Fees whose amount could not be read, or events with no usable date
    pub malformed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShipmentKind {
    Shipment,
    Refund,
    GuaranteeClaim,
    Chargeback,
}

impl ShipmentKind {
    fn transaction_type(&self) -> &'static str {
        match self {
            ShipmentKind::Shipment => "Shipment",
            ShipmentKind::Refund => "Refund",
            ShipmentKind::GuaranteeClaim => "GuaranteeClaim",
            ShipmentKind::Chargeback => "Chargeback",
        }
    }
}

fn fingerprint(kind: &str, order_id: Option<&str>, posted_at: &DateTime<Utc>) -> String {
    format!("{kind}:{}:{}", order_id.unwrap_or("account"), posted_at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

struct Flattener {
    out: FlattenedEvents,
    undated_at: DateTime<Utc>,
}

impl Flattener {
    fn emit(&mut self, template: &RawFeeRecord, text: Option<&str>, money: &Money) {
        let text = text.unwrap_or("Unspecified");
        match money.to_cents() {
            Ok(amount) if amount.is_zero() => trace!("📥️ Skipping zero amount fee {text}"),
            Ok(amount) => {
                let mut record = template.clone().with_amount(amount).with_currency(money.currency_code.as_deref());
                record.fee_type_text = text.to_string();
                self.out.records.push(record);
            },
            Err(e) => {
                warn!("📥️ Ledger fee {text} in {} has an unreadable amount. {e}", template.batch_id);
                self.out.malformed += 1;
            },
        }
    }

    fn shipment_event(&mut self, kind: ShipmentKind, event: &ShipmentEvent) {
        let Some(posted_at) = event.posted_date else {
            warn!("📥️ {} event for order {:?} has no posted date. Skipped.", kind.transaction_type(), event.amazon_order_id);
            self.out.malformed += 1;
            return;
        };
        let order_id = event.amazon_order_id.as_deref();
        let batch = fingerprint(kind.transaction_type(), order_id, &posted_at);
        let items = match kind {
            ShipmentKind::Shipment => &event.shipment_item_list,
            _ => &event.shipment_item_adjustment_list,
        };
        for item in items {
            let template = RawFeeRecord::new(FeeSource::FinancialEventsApi, kind.transaction_type(), "", &batch)
                .with_order(order_id)
                .with_sku(item.seller_sku.as_deref())
                .posted_at(posted_at);
            let fees = item.item_fee_list.iter().chain(item.item_fee_adjustment_list.iter());
            for FeeComponent { fee_type, fee_amount } in fees {
                self.emit(&template, fee_type.as_deref(), fee_amount);
            }
            let promotions = item.promotion_list.iter().chain(item.promotion_adjustment_list.iter());
            for Promotion { promotion_type, promotion_amount, .. } in promotions {
                self.emit(&template, Some(promotion_type.as_deref().unwrap_or("Promotion")), promotion_amount);
            }
        }
    }

    fn service_fee_event(&mut self, event: &ServiceFeeEvent) {
        let order_id = event.amazon_order_id.as_deref();
        let posted_at = event.posted_date.unwrap_or(self.undated_at);
        let batch = fingerprint("ServiceFee", order_id, &posted_at);
        let template = RawFeeRecord::new(FeeSource::FinancialEventsApi, "ServiceFee", "", &batch)
            .with_order(order_id)
            .with_sku(event.seller_sku.as_deref())
            .with_asin(event.asin.as_deref())
            .posted_at(posted_at);
        for FeeComponent { fee_type, fee_amount } in &event.fee_list {
            let text = fee_type.as_deref().or(event.fee_reason.as_deref());
            if event.posted_date.is_some() {
                self.emit(&template, text, fee_amount);
                continue;
            }
            // Undated charges in one grid cell share a date, so the charge itself has to tell them apart
            let reason = event.fee_reason.as_deref().or(event.fee_description.as_deref()).unwrap_or("");
            let sku = event.seller_sku.as_deref().or(event.asin.as_deref()).unwrap_or("");
            let amount = fee_amount.to_cents().map(|c| c.value()).unwrap_or_default();
            let template = RawFeeRecord {
                batch_id: format!("{batch}:{reason}:{sku}:{}:{amount}", text.unwrap_or("")),
                ..template.clone()
            };
            self.emit(&template, text, fee_amount);
        }
    }

    fn adjustment_event(&mut self, event: &AdjustmentEvent) {
        let Some(posted_at) = event.posted_date else {
            warn!("📥️ Adjustment event {:?} has no posted date. Skipped.", event.adjustment_type);
            self.out.malformed += 1;
            return;
        };
        let text = event.adjustment_type.as_deref();
        let batch = format!("{}:{}", fingerprint("Adjustment", None, &posted_at), text.unwrap_or(""));
        let template = RawFeeRecord::new(FeeSource::FinancialEventsApi, "Adjustment", "", &batch).posted_at(posted_at);
        if event.adjustment_item_list.is_empty() {
            self.emit(&template, text, &event.adjustment_amount);
            return;
        }
        for item in &event.adjustment_item_list {
            let template = template.clone().with_sku(item.seller_sku.as_deref()).with_asin(item.asin.as_deref());
            let template = RawFeeRecord {
                batch_id: format!("{batch}:{}", item.seller_sku.as_deref().unwrap_or("")),
                ..template
            };
            self.emit(&template, text, &item.total_amount);
        }
    }

    fn removal_event(&mut self, event: &RemovalShipmentEvent) {
        let Some(posted_at) = event.posted_date else {
            warn!("📥️ Removal shipment {:?} has no posted date. Skipped.", event.order_id);
            self.out.malformed += 1;
            return;
        };
        let removal_type = event.transaction_type.as_deref().unwrap_or("Removal");
        let text = format!("{removal_type} fee");
        let batch = format!("RemovalShipment:{}:{}", event.order_id.as_deref().unwrap_or(""), posted_at.to_rfc3339());
        for item in &event.removal_shipment_item_list {
            let batch = format!("{batch}:{}", item.removal_shipment_item_id.as_deref().unwrap_or(""));
            // Removal orders are not sales orders, so the fee is account-level
            let template = RawFeeRecord::new(FeeSource::FinancialEventsApi, "RemovalShipment", "", &batch)
                .with_sku(item.fulfillment_network_sku.as_deref())
                .posted_at(posted_at);
            self.emit(&template, Some(&text), &item.fee_amount);
        }
    }
}

/// Flattens one page of ledger events into records. `undated_at` dates the service fee events that the feed delivers
/// without a posted date.
pub fn flatten_financial_events(events: &FinancialEvents, undated_at: DateTime<Utc>) -> FlattenedEvents {
    let mut f = Flattener { out: FlattenedEvents::default(), undated_at };
    let shipment_lists = [
        (ShipmentKind::Shipment, &events.shipment_event_list),
        (ShipmentKind::Refund, &events.refund_event_list),
        (ShipmentKind::GuaranteeClaim, &events.guarantee_claim_event_list),
        (ShipmentKind::Chargeback, &events.chargeback_event_list),
    ];
    for (kind, list) in shipment_lists {
        list.iter().for_each(|e| f.shipment_event(kind, e));
    }
    events.service_fee_event_list.iter().for_each(|e| f.service_fee_event(e));
    events.adjustment_event_list.iter().for_each(|e| f.adjustment_event(e));
    events.removal_shipment_event_list.iter().for_each(|e| f.removal_event(e));
    f.out
}

/// The start of the grid cell of width `width` that holds `ts`.
pub fn grid_floor(ts: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    let cell = width.num_seconds().max(1);
    let secs = ts.timestamp();
    DateTime::<Utc>::from_timestamp(secs - secs.rem_euclid(cell), 0).unwrap_or(ts)
}

/// One ledger query window `[after, before)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerWindow {
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
    /// The date given to events the feed delivers without one
    pub undated_at: DateTime<Utc>,
}

impl LedgerWindow {
    pub fn new(after: DateTime<Utc>, before: DateTime<Utc>, width: Duration) -> Self {
        Self { after, before, undated_at: grid_floor(after, width) }
    }

    /// The window from `start` to the end of its grid cell, or to `limit` if that comes first.
    pub fn on_grid(start: DateTime<Utc>, width: Duration, limit: DateTime<Utc>) -> Self {
        let cell_end = grid_floor(start, width) + width.max(Duration::seconds(1));
        Self::new(start, cell_end.min(limit), width)
    }
}

/// The records of one ledger window.
#[derive(Debug, Clone, Default)]
pub struct LedgerWindowFetch {
    pub records: Vec<RawFeeRecord>,
    pub events: i64,
    pub pages: usize,
    pub malformed: i64,
    /// Set when the page cap was reached before the feed ran out of pages. Fetching the same window again from this
    /// token picks up where this fetch stopped.
    pub unconsumed_token: Option<String>,
}

impl LedgerWindowFetch {
    pub fn is_truncated(&self) -> bool {
        self.unconsumed_token.is_some()
    }
}

/// Fetches the pages of `window`, up to `page_cap` of them, starting from `resume_token` if one is given.
///
/// The caller chooses `window.before`; it must already trail the current time by whatever safety margin the feed
/// needs.
pub async fn fetch_ledger_window<S: LedgerEventSource>(
    source: &S,
    throttle: &FeedThrottle,
    window: &LedgerWindow,
    resume_token: Option<String>,
    page_cap: usize,
) -> Result<LedgerWindowFetch, FeedError> {
    let LedgerWindow { after, before, undated_at } = *window;
    let mut result = LedgerWindowFetch::default();
    let mut token = resume_token;
    loop {
        if result.pages >= page_cap.max(1) {
            debug!("📥️ Ledger window {after} → {before} reached the page cap of {page_cap}");
            result.unconsumed_token = token;
            break;
        }
        let page = throttle
            .call("ledger page", || source.fetch_ledger_page(after, before, token.as_deref()))
            .await?;
        result.pages += 1;
        result.events += page.financial_events.event_count() as i64;
        let flattened = flatten_financial_events(&page.financial_events, undated_at);
        result.records.extend(flattened.records);
        result.malformed += flattened.malformed;
        match page.next_token.filter(|t| !t.is_empty()) {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    debug!(
        "📥️ Ledger window {after} → {before}: {} records from {} events over {} pages",
        result.records.len(),
        result.events,
        result.pages
    );
    Ok(result)
}
