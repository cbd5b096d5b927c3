use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db_types::{AccountLevelFee, Cents, FeeCategory, FeeSource, LineItemFeeBreakdown};

/// What a sync run does to one `(line item, category)` it has a value for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// The run's source outranks what is stored. Lower-precedence contributions are removed.
    Replace,
    /// Same precedence tier as what is stored (or nothing stored yet). Contributions are upserted per batch.
    Accumulate,
    /// What is stored outranks the run's source. Nothing is written.
    Superseded,
}

/// The contributions one run makes to one category of one line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryWrite {
    pub category: FeeCategory,
    pub source: FeeSource,
    pub decision: Decision,
    /// Sub-totals per batch id. Each becomes one contribution row, overwriting a previous write of the same batch.
    pub contributions: BTreeMap<String, Cents>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemUpdate {
    pub user_id: String,
    pub order_id: String,
    pub line_item_id: String,
    pub writes: Vec<CategoryWrite>,
}

impl LineItemUpdate {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created(LineItemFeeBreakdown),
    Updated(LineItemFeeBreakdown),
    /// The recomputed breakdown equals the stored one, which was left untouched
    Unchanged(LineItemFeeBreakdown),
}

impl WriteOutcome {
    pub fn breakdown(&self) -> &LineItemFeeBreakdown {
        match self {
            WriteOutcome::Created(b) | WriteOutcome::Updated(b) | WriteOutcome::Unchanged(b) => b,
        }
    }
}

/// One batch's contribution to an account-level fee bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFeeUpdate {
    pub user_id: String,
    pub period: String,
    pub category: FeeCategory,
    pub batch_id: String,
    pub amount: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFeeOutcome {
    pub fee: AccountLevelFee,
    pub changed: bool,
}
