use serde::{Deserialize, Serialize};

use crate::db_types::{Cents, FeeCategory, FeeSource, SyncRun};

/// Published once per run, after its terminal state has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunFinishedEvent {
    pub run: SyncRun,
}

impl SyncRunFinishedEvent {
    pub fn new(run: SyncRun) -> Self {
        Self { run }
    }

    pub fn succeeded(&self) -> bool {
        self.run.error.is_none()
    }
}

/// Published for every fee event that could not be linked to a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedFeeEvent {
    pub user_id: String,
    pub source: FeeSource,
    pub batch_id: String,
    pub order_id: String,
    pub sku: Option<String>,
    pub category: FeeCategory,
    pub amount: Cents,
    pub reason: String,
}
