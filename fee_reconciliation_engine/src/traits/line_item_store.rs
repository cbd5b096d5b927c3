use chrono::{DateTime, Utc};

use crate::{
    db_types::{LineItem, NewLineItem},
    traits::FeeStoreError,
};

/// Read access to the order/line-item store. Line items are created by the order-sync pipeline; the engine only
/// reads them. [`LineItemStore::upsert_line_item`] exists for that pipeline and for seeding tests.
#[allow(async_fn_in_trait)]
pub trait LineItemStore {
    /// All line items of an order, ordered by line item id.
    async fn fetch_line_items_for_order(&self, user_id: &str, order_id: &str) -> Result<Vec<LineItem>, FeeStoreError>;

    async fn fetch_line_item(&self, user_id: &str, line_item_id: &str) -> Result<Option<LineItem>, FeeStoreError>;

    /// Line items purchased since `since` that have no fee breakdown yet, with row id greater than `after_id`, in
    /// row id order.
    async fn fetch_line_items_without_breakdown(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<LineItem>, FeeStoreError>;

    async fn upsert_line_item(&self, item: NewLineItem) -> Result<LineItem, FeeStoreError>;
}
