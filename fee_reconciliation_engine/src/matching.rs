//! # Match key resolver
//!
//! Links a [`CanonicalFeeEvent`] to the stored line item(s) it belongs to. Candidate keys are tried most specific
//! first:
//!
//! 1. `order id + product id` (sku, or asin when the feed only has that), which is required to tell apart the line
//!    items of a multi-item order;
//! 2. `order id` alone, when the feed did not say which product the fee was for.
//!
//! An order-only key that lands on an order with several line items is ambiguous. [`AllocationPolicy`] decides how
//! the amount is shared out in that case.
use std::{collections::HashMap, fmt::Display, str::FromStr};

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Cents, ConversionError, LineItem},
    feeds::CanonicalFeeEvent,
    traits::{FeeStoreError, LineItemStore},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Split in proportion to quantity. Cent remainders go to the largest fractional shares, then to the lowest
    /// line item id, so the parts always add up to the original amount.
    #[default]
    ProportionalByQuantity,
    /// Everything goes to the line item with the lowest line item id.
    FirstLineItem,
}

impl FromStr for AllocationPolicy {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proportional" | "proportional_by_quantity" => Ok(Self::ProportionalByQuantity),
            "first" | "first_line_item" => Ok(Self::FirstLineItem),
            _ => Err(ConversionError(format!("Invalid allocation policy: {s}"))),
        }
    }
}

impl Display for AllocationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationPolicy::ProportionalByQuantity => write!(f, "proportional"),
            AllocationPolicy::FirstLineItem => write!(f, "first"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    OrderProduct { order_id: String, product_id: String },
    Order { order_id: String },
}

/// Candidate keys for an event, most specific first. Account-level events have none.
pub fn candidate_keys(event: &CanonicalFeeEvent) -> Vec<MatchKey> {
    let Some(order_id) = event.order_id.as_ref() else {
        return Vec::new();
    };
    let mut keys = Vec::with_capacity(3);
    for product in [event.sku.as_ref(), event.asin.as_ref()].into_iter().flatten() {
        keys.push(MatchKey::OrderProduct { order_id: order_id.clone(), product_id: product.clone() });
    }
    keys.push(MatchKey::Order { order_id: order_id.clone() });
    keys
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub line_item: LineItem,
    pub amount: Cents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnmatchedReason {
    /// No line items are stored for the order
    UnknownOrder,
    /// The order is known, but none of its line items carries the event's product id
    UnknownProduct,
}

impl Display for UnmatchedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnmatchedReason::UnknownOrder => write!(f, "order unknown"),
            UnmatchedReason::UnknownProduct => write!(f, "sku unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched(Vec<Allocation>),
    Unmatched(UnmatchedReason),
    AccountLevel,
}

/// Shares `amount` among `items` according to `policy`. Items are considered in line item id order. Returns one
/// `(index into items, share)` per item that receives a share; the shares sum to `amount`.
pub fn allocate(amount: Cents, items: &[LineItem], policy: AllocationPolicy) -> Vec<(usize, Cents)> {
    let mut order = (0..items.len()).collect::<Vec<usize>>();
    order.sort_by(|a, b| items[*a].line_item_id.cmp(&items[*b].line_item_id));
    let Some(&first) = order.first() else {
        return Vec::new();
    };
    if policy == AllocationPolicy::FirstLineItem || items.len() == 1 {
        return vec![(first, amount)];
    }
    let weights = order.iter().map(|i| items[*i].quantity.max(0) as i128).collect::<Vec<i128>>();
    let total_weight: i128 = weights.iter().sum();
    let weights = if total_weight == 0 { vec![1i128; order.len()] } else { weights };
    let total_weight: i128 = weights.iter().sum();
    let magnitude = amount.value().unsigned_abs() as i128;
    let mut shares = weights.iter().map(|w| (magnitude * w / total_weight, magnitude * w % total_weight)).collect::<Vec<_>>();
    let mut leftover = magnitude - shares.iter().map(|(s, _)| s).sum::<i128>();
    // Stable sort keeps line item id order among equal remainders
    let mut by_remainder = (0..shares.len()).collect::<Vec<usize>>();
    by_remainder.sort_by(|a, b| shares[*b].1.cmp(&shares[*a].1));
    for pos in by_remainder {
        if leftover == 0 {
            break;
        }
        shares[pos].0 += 1;
        leftover -= 1;
    }
    let sign = if amount.value() < 0 { -1 } else { 1 };
    order
        .into_iter()
        .zip(shares)
        .map(|(i, (share, _))| (i, Cents::from(sign * share as i64)))
        .collect()
}

/// Resolves events for one user, caching each order's line items for the lifetime of the resolver (one sync run).
pub struct MatchKeyResolver<'a, S> {
    store: &'a S,
    user_id: String,
    policy: AllocationPolicy,
    cache: HashMap<String, Vec<LineItem>>,
}

impl<'a, S> MatchKeyResolver<'a, S>
where S: LineItemStore
{
    pub fn new(store: &'a S, user_id: &str, policy: AllocationPolicy) -> Self {
        Self { store, user_id: user_id.to_string(), policy, cache: HashMap::new() }
    }

    async fn line_items(&mut self, order_id: &str) -> Result<&[LineItem], FeeStoreError> {
        if !self.cache.contains_key(order_id) {
            let items = self.store.fetch_line_items_for_order(&self.user_id, order_id).await?;
            trace!("🧮️ Cached {} line items for order {order_id}", items.len());
            self.cache.insert(order_id.to_string(), items);
        }
        Ok(self.cache.get(order_id).map(Vec::as_slice).unwrap_or_default())
    }

    pub async fn resolve(&mut self, event: &CanonicalFeeEvent) -> Result<Resolution, FeeStoreError> {
        let keys = candidate_keys(event);
        if keys.is_empty() {
            return Ok(Resolution::AccountLevel);
        }
        let policy = self.policy;
        let amount = event.amount;
        let mut reason = UnmatchedReason::UnknownOrder;
        for key in keys {
            match key {
                MatchKey::OrderProduct { order_id, product_id } => {
                    let items = self.line_items(&order_id).await?;
                    if items.is_empty() {
                        return Ok(Resolution::Unmatched(UnmatchedReason::UnknownOrder));
                    }
                    let matching = items.iter().filter(|li| li.has_product(&product_id)).cloned().collect::<Vec<_>>();
                    if !matching.is_empty() {
                        return Ok(Resolution::Matched(to_allocations(amount, &matching, policy)));
                    }
                    reason = UnmatchedReason::UnknownProduct;
                },
                MatchKey::Order { order_id } => {
                    // A product id that matched nothing means the fee belongs to an item we don't have
                    if reason == UnmatchedReason::UnknownProduct {
                        break;
                    }
                    let items = self.line_items(&order_id).await?;
                    if items.is_empty() {
                        return Ok(Resolution::Unmatched(UnmatchedReason::UnknownOrder));
                    }
                    if items.len() > 1 {
                        trace!("🧮️ Order {order_id} has {} line items. Allocating {amount} ({policy})", items.len());
                    }
                    let items = items.to_vec();
                    return Ok(Resolution::Matched(to_allocations(amount, &items, policy)));
                },
            }
        }
        Ok(Resolution::Unmatched(reason))
    }
}

fn to_allocations(amount: Cents, items: &[LineItem], policy: AllocationPolicy) -> Vec<Allocation> {
    allocate(amount, items, policy)
        .into_iter()
        .map(|(i, amount)| Allocation { line_item: items[i].clone(), amount })
        .collect()
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::{FeeCategory, FeeSource};

    fn item(line_item_id: &str, sku: &str, quantity: i64) -> LineItem {
        LineItem {
            id: 0,
            user_id: "u1".into(),
            order_id: "O1".into(),
            line_item_id: line_item_id.into(),
            sku: sku.into(),
            asin: None,
            quantity,
            item_price: Cents::from(1000),
            currency: "USD".into(),
            purchased_at: Utc::now(),
        }
    }

    fn shares(amount: i64, items: &[LineItem], policy: AllocationPolicy) -> Vec<(String, i64)> {
        allocate(Cents::from(amount), items, policy)
            .into_iter()
            .map(|(i, c)| (items[i].line_item_id.clone(), c.value()))
            .collect()
    }

    #[test]
    fn proportional_allocation_sums_exactly() {
        let items = vec![item("B", "X", 1), item("A", "Y", 2)];
        assert_eq!(shares(301, &items, AllocationPolicy::ProportionalByQuantity), vec![
            ("A".to_string(), 201),
            ("B".to_string(), 100)
        ]);
        let items = vec![item("A", "X", 1), item("B", "Y", 1), item("C", "Z", 1)];
        let parts = shares(100, &items, AllocationPolicy::ProportionalByQuantity);
        assert_eq!(parts, vec![("A".to_string(), 34), ("B".to_string(), 33), ("C".to_string(), 33)]);
        let parts = shares(-100, &items, AllocationPolicy::ProportionalByQuantity);
        assert_eq!(parts.iter().map(|(_, c)| c).sum::<i64>(), -100);
        assert_eq!(parts[0].1, -34);
    }

    #[test]
    fn zero_quantities_split_evenly() {
        let items = vec![item("A", "X", 0), item("B", "Y", 0)];
        assert_eq!(shares(5, &items, AllocationPolicy::ProportionalByQuantity), vec![
            ("A".to_string(), 3),
            ("B".to_string(), 2)
        ]);
    }

    #[test]
    fn first_line_item_policy() {
        let items = vec![item("B", "X", 5), item("A", "Y", 1)];
        assert_eq!(shares(250, &items, AllocationPolicy::FirstLineItem), vec![("A".to_string(), 250)]);
    }

    #[test]
    fn policies_parse() {
        assert_eq!("proportional".parse::<AllocationPolicy>().unwrap(), AllocationPolicy::ProportionalByQuantity);
        assert_eq!("FIRST".parse::<AllocationPolicy>().unwrap(), AllocationPolicy::FirstLineItem);
        assert!("random".parse::<AllocationPolicy>().is_err());
    }

    #[test]
    fn keys_most_specific_first() {
        let event = CanonicalFeeEvent {
            order_id: Some("O1".into()),
            sku: Some("X".into()),
            asin: Some("B00".into()),
            category: FeeCategory::Referral,
            amount: Cents::from(10),
            source: FeeSource::SettlementReport,
            batch_id: "R1".into(),
            posted_at: Utc::now(),
            captured_at: Utc::now(),
        };
        let keys = candidate_keys(&event);
        assert_eq!(keys, vec![
            MatchKey::OrderProduct { order_id: "O1".into(), product_id: "X".into() },
            MatchKey::OrderProduct { order_id: "O1".into(), product_id: "B00".into() },
            MatchKey::Order { order_id: "O1".into() },
        ]);
        let account = CanonicalFeeEvent { order_id: None, ..event };
        assert!(candidate_keys(&account).is_empty());
    }
}
