use std::collections::HashMap;

use crate::{
    db_types::{FeeCategory, FeeContribution, FeeSource, LineItemFeeBreakdown, NewUnmatchedFee, UnmatchedFee},
    traits::{FeeStoreError, LineItemUpdate, WriteOutcome},
};

/// Persistence of per-line-item fee breakdowns.
///
/// A breakdown is never written directly. Writers submit contributions; the breakdown is recomputed from the full
/// contribution set of the line item, so its category fields and total are always consistent with their provenance.
#[allow(async_fn_in_trait)]
pub trait FeeBreakdownManagement {
    /// The highest-precedence source currently contributing to each category of the line item.
    async fn fetch_category_sources(
        &self,
        user_id: &str,
        line_item_id: &str,
    ) -> Result<HashMap<FeeCategory, FeeSource>, FeeStoreError>;

    /// Applies one line item's contributions and recomputes its breakdown, atomically.
    ///
    /// `Replace` writes remove the category's lower-precedence contributions first. `Superseded` writes are ignored.
    /// If the recomputed breakdown equals the stored one, nothing is written and [`WriteOutcome::Unchanged`] is
    /// returned.
    async fn apply_line_item_update(&self, update: &LineItemUpdate) -> Result<WriteOutcome, FeeStoreError>;

    async fn fetch_breakdown(
        &self,
        user_id: &str,
        line_item_id: &str,
    ) -> Result<Option<LineItemFeeBreakdown>, FeeStoreError>;

    async fn fetch_breakdowns_for_order(
        &self,
        user_id: &str,
        order_id: &str,
    ) -> Result<Vec<LineItemFeeBreakdown>, FeeStoreError>;

    async fn fetch_breakdowns_for_user(&self, user_id: &str) -> Result<Vec<LineItemFeeBreakdown>, FeeStoreError>;

    async fn fetch_contributions(
        &self,
        user_id: &str,
        line_item_id: &str,
    ) -> Result<Vec<FeeContribution>, FeeStoreError>;

    /// Records (or overwrites) a diagnostic row for a fee that matched no line item.
    async fn record_unmatched_fee(&self, fee: NewUnmatchedFee) -> Result<UnmatchedFee, FeeStoreError>;

    async fn fetch_unmatched_fees(&self, user_id: &str) -> Result<Vec<UnmatchedFee>, FeeStoreError>;
}
