use crate::{
    db_types::AccountLevelFee,
    traits::{AccountFeeOutcome, AccountFeeUpdate, FeeStoreError},
};

/// Persistence of fees that have no order linkage. There is no precedence logic here: each batch's contribution to a
/// `(user, period, category)` bucket is overwritten on re-runs, and the bucket is the sum of its contributions.
#[allow(async_fn_in_trait)]
pub trait AccountFeeManagement {
    async fn record_account_fee(&self, update: &AccountFeeUpdate) -> Result<AccountFeeOutcome, FeeStoreError>;

    /// Account-level fees for a user, optionally limited to one `YYYY-MM` period.
    async fn fetch_account_fees(
        &self,
        user_id: &str,
        period: Option<&str>,
    ) -> Result<Vec<AccountLevelFee>, FeeStoreError>;
}
