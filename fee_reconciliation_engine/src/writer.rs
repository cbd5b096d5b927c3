//! # Idempotent writer
//!
//! Breakdown rows are never incremented. The backend stores contributions keyed by
//! `(user, line item, category, source, batch)` and rebuilds the row from them with [`recompute`], so writing the
//! same batch twice yields the same row.
use std::collections::BTreeMap;

use log::*;

use crate::{
    db_types::{period_of, CategoryAmounts, Cents, FeeCategory, FeeContribution, FeeSource},
    feeds::CanonicalFeeEvent,
    traits::{AccountFeeManagement, AccountFeeUpdate, FeeBreakdownManagement, LineItemUpdate, WriteOutcome},
};

/// Rebuilds the category fields of a breakdown from its contributions.
///
/// Each category takes the sum of the contributions from its highest-precedence source. The authoritative source of
/// the row is the highest source among its non-zero categories.
pub fn recompute(contributions: &[FeeContribution]) -> (CategoryAmounts, Option<FeeSource>) {
    let mut best = BTreeMap::<FeeCategory, FeeSource>::new();
    for c in contributions {
        let entry = best.entry(c.category).or_insert(c.source);
        if c.source.outranks(entry) {
            *entry = c.source;
        }
    }
    let mut amounts = CategoryAmounts::default();
    let mut authoritative = None::<FeeSource>;
    for (category, source) in best {
        let value: Cents = contributions
            .iter()
            .filter(|c| c.category == category && c.source == source)
            .map(|c| c.amount)
            .sum();
        amounts.set(category, value);
        if !value.is_zero() && authoritative.map(|a| source.outranks(&a)).unwrap_or(true) {
            authoritative = Some(source);
        }
    }
    (amounts, authoritative)
}

/// The only source recorded on the account-level path. Settlement documents carry every order-less charge the
/// ledger reports, under a different batch id, so recording both would count each charge twice.
pub const ACCOUNT_FEE_SOURCE: FeeSource = FeeSource::SettlementReport;

/// Collapses account-level events into one update per `(period, category, batch)`. Events from any source other
/// than [`ACCOUNT_FEE_SOURCE`] are left out.
pub fn account_fee_updates<'a, I>(user_id: &str, events: I) -> Vec<AccountFeeUpdate>
where I: IntoIterator<Item = &'a CanonicalFeeEvent> {
    let mut buckets = BTreeMap::<(String, FeeCategory, String), Cents>::new();
    for event in events {
        if event.source != ACCOUNT_FEE_SOURCE {
            trace!("🧮️ {} account-level fee from {} is not recorded", event.category, event.source);
            continue;
        }
        let key = (period_of(&event.posted_at), event.category, event.batch_id.clone());
        *buckets.entry(key).or_default() += event.amount;
    }
    buckets
        .into_iter()
        .map(|((period, category, batch_id), amount)| AccountFeeUpdate {
            user_id: user_id.to_string(),
            period,
            category,
            batch_id,
            amount,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub updated: i64,
    pub unchanged: i64,
    pub errored: i64,
}

/// Applies planned updates one line item at a time. A failed line item is logged and counted; the rest of the batch
/// is still written.
pub async fn write_line_item_updates<B: FeeBreakdownManagement>(db: &B, updates: &[LineItemUpdate]) -> WriteReport {
    let mut report = WriteReport::default();
    for update in updates.iter().filter(|u| !u.is_empty()) {
        match db.apply_line_item_update(update).await {
            Ok(WriteOutcome::Unchanged(_)) => {
                trace!("🧮️ Breakdown for {} is unchanged", update.line_item_id);
                report.unchanged += 1;
            },
            Ok(outcome) => {
                let b = outcome.breakdown();
                debug!("🧮️ Breakdown for {} written. Total fee {}", b.line_item_id, b.total_fee);
                report.updated += 1;
            },
            Err(e) => {
                error!("🧮️ Could not write fee breakdown for line item {}: {e}", update.line_item_id);
                report.errored += 1;
            },
        }
    }
    report
}

/// Records account-level contributions. Returns `(changed, errored)`.
pub async fn write_account_fees<B: AccountFeeManagement>(db: &B, updates: &[AccountFeeUpdate]) -> (i64, i64) {
    let mut changed = 0;
    let mut errored = 0;
    for update in updates {
        match db.record_account_fee(update).await {
            Ok(outcome) => {
                if outcome.changed {
                    debug!(
                        "🧮️ Account fee {} {} is now {} (batch {})",
                        update.period, update.category, outcome.fee.amount, update.batch_id
                    );
                    changed += 1;
                }
            },
            Err(e) => {
                error!("🧮️ Could not record account fee {} {}: {e}", update.period, update.category);
                errored += 1;
            },
        }
    }
    (changed, errored)
}
