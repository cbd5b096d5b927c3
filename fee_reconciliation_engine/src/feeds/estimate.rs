//! Order estimate adapter.
//!
//! The fallback feed for line items no other feed has reported on yet. Estimates are requested per unit and
//! arrive as positive magnitudes; records are scaled by the line item quantity and negated into the feed sign
//! convention so they flow through the same pipeline as real charges.
use marketplace_tools::data_objects::ProductIdType;

use crate::{
    db_types::{FeeSource, LineItem},
    feeds::{EstimateRequest, EstimatedFee, RawFeeRecord},
};

pub fn estimate_batch_id(line_item: &LineItem) -> String {
    format!("estimate:{}", line_item.line_item_id)
}

/// The estimate request for one unit of `line_item`. The sku is preferred; the asin is used when there is no sku.
pub fn estimate_request(line_item: &LineItem) -> EstimateRequest {
    let (id_type, product_id) = match line_item.asin.as_deref() {
        Some(asin) if line_item.sku.trim().is_empty() => (ProductIdType::Asin, asin.to_string()),
        _ => (ProductIdType::Sku, line_item.sku.clone()),
    };
    EstimateRequest { id_type, product_id, unit_price: line_item.item_price, currency: line_item.currency.clone() }
}

pub fn estimate_records(line_item: &LineItem, fees: &[EstimatedFee]) -> Vec<RawFeeRecord> {
    let batch = estimate_batch_id(line_item);
    let quantity = line_item.quantity.max(1);
    fees.iter()
        .filter(|fee| !fee.amount.is_zero())
        .map(|fee| {
            RawFeeRecord::new(FeeSource::Estimated, "Estimate", &fee.fee_type, &batch)
                .with_order(Some(&line_item.order_id))
                .with_sku(Some(&line_item.sku))
                .with_asin(line_item.asin.as_deref())
                .with_amount(-(fee.amount.abs() * quantity))
                .with_currency(Some(&line_item.currency))
                .posted_at(line_item.purchased_at)
        })
        .collect()
}
