//! # Reconciliation aggregator
//!
//! Folds a run's matched fee allocations into one [`LineItemUpdate`] per line item.
//!
//! Within a run, allocations are grouped by `(line item, category)`. Only the highest-precedence source seen for a
//! group survives; amounts from that source are summed per batch id. Each per-batch sub-total later becomes one
//! contribution row, so a batch that is re-processed overwrites itself while distinct batches of the same tier add up.
//!
//! The group is then compared with what is stored for the category (see [`decide`]).
use std::collections::{BTreeMap, HashMap};

use log::*;

use crate::{
    db_types::{Cents, FeeCategory, FeeSource, LineItem},
    traits::{CategoryWrite, Decision, LineItemUpdate},
};

/// One share of one fee event, already linked to its line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFee {
    pub user_id: String,
    pub order_id: String,
    pub line_item_id: String,
    pub category: FeeCategory,
    pub source: FeeSource,
    pub batch_id: String,
    pub amount: Cents,
}

impl MatchedFee {
    pub fn new(line_item: &LineItem, category: FeeCategory, source: FeeSource, batch_id: &str, amount: Cents) -> Self {
        Self {
            user_id: line_item.user_id.clone(),
            order_id: line_item.order_id.clone(),
            line_item_id: line_item.line_item_id.clone(),
            category,
            source,
            batch_id: batch_id.to_string(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CategoryGroup {
    source: FeeSource,
    batches: BTreeMap<String, Cents>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemGroup {
    pub user_id: String,
    pub order_id: String,
    pub line_item_id: String,
    categories: BTreeMap<FeeCategory, CategoryGroup>,
}

impl LineItemGroup {
    /// The run's value for a category: the sum over the surviving source's batches.
    pub fn amount(&self, category: FeeCategory) -> Option<Cents> {
        self.categories.get(&category).map(|g| g.batches.values().sum())
    }

    pub fn source(&self, category: FeeCategory) -> Option<FeeSource> {
        self.categories.get(&category).map(|g| g.source)
    }

    pub fn categories(&self) -> impl Iterator<Item = FeeCategory> + '_ {
        self.categories.keys().copied()
    }
}

/// What the run's source does to a category, given the highest source already stored for it.
pub fn decide(stored: Option<FeeSource>, run: FeeSource) -> Decision {
    match stored {
        None => Decision::Accumulate,
        Some(stored) if run.outranks(&stored) => Decision::Replace,
        Some(stored) if stored.outranks(&run) => Decision::Superseded,
        Some(_) => Decision::Accumulate,
    }
}

#[derive(Debug, Default)]
pub struct FeeAggregator {
    groups: BTreeMap<String, LineItemGroup>,
    dropped: usize,
}

impl FeeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, fee: MatchedFee) {
        let group = self.groups.entry(fee.line_item_id.clone()).or_insert_with(|| LineItemGroup {
            user_id: fee.user_id.clone(),
            order_id: fee.order_id.clone(),
            line_item_id: fee.line_item_id.clone(),
            categories: BTreeMap::new(),
        });
        let category = group
            .categories
            .entry(fee.category)
            .or_insert_with(|| CategoryGroup { source: fee.source, batches: BTreeMap::new() });
        if fee.source.outranks(&category.source) {
            trace!(
                "🧮️ {} {} from {} replaces {} values within the run",
                fee.line_item_id,
                fee.category,
                fee.source,
                category.source
            );
            self.dropped += category.batches.len();
            category.source = fee.source;
            category.batches.clear();
        } else if category.source.outranks(&fee.source) {
            self.dropped += 1;
            return;
        }
        *category.batches.entry(fee.batch_id).or_default() += fee.amount;
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Number of contributions discarded because a higher source reported the same group in this run.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn groups(&self) -> impl Iterator<Item = &LineItemGroup> {
        self.groups.values()
    }

    pub fn into_groups(self) -> impl Iterator<Item = LineItemGroup> {
        self.groups.into_values()
    }
}

impl Extend<MatchedFee> for FeeAggregator {
    fn extend<T: IntoIterator<Item = MatchedFee>>(&mut self, iter: T) {
        for fee in iter {
            self.add(fee);
        }
    }
}

/// Plans the writes for one line item against the sources currently stored for its categories.
///
/// Returns the update (which omits superseded categories) and the number of superseded categories.
pub fn plan_update(group: LineItemGroup, stored: &HashMap<FeeCategory, FeeSource>) -> (LineItemUpdate, usize) {
    let mut superseded = 0;
    let mut writes = Vec::with_capacity(group.categories.len());
    for (category, values) in group.categories {
        let decision = decide(stored.get(&category).copied(), values.source);
        if decision == Decision::Superseded {
            debug!(
                "🧮️ {} {category} from {} is superseded by stored {:?} values",
                group.line_item_id,
                values.source,
                stored.get(&category)
            );
            superseded += 1;
            continue;
        }
        writes.push(CategoryWrite { category, source: values.source, decision, contributions: values.batches });
    }
    let update =
        LineItemUpdate { user_id: group.user_id, order_id: group.order_id, line_item_id: group.line_item_id, writes };
    (update, superseded)
}
