use chrono::{DateTime, Utc};
use log::*;
use marketplace_tools::{
    data_objects::{FinancialEventsPage, ReportInfo},
    MarketplaceApi,
    MarketplaceApiError,
};

use crate::{
    db_types::Cents,
    feeds::{EstimateRequest, EstimatedFee, FeeEstimateSource, FeedError, LedgerEventSource, SettlementReportSource},
};

impl SettlementReportSource for MarketplaceApi {
    async fn list_settlement_reports(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<(Vec<ReportInfo>, Option<String>), FeedError> {
        let page = MarketplaceApi::list_settlement_reports(self, since, until, next_token).await?;
        Ok((page.reports, page.next_token))
    }

    async fn download_settlement_report(&self, report: &ReportInfo) -> Result<String, FeedError> {
        let document_id = report.report_document_id.as_deref().ok_or_else(|| {
            FeedError::Malformed(format!("Settlement report {} has no document yet", report.report_id))
        })?;
        let document = self.get_report_document(document_id).await?;
        let body = self.download_report_document(&document).await?;
        Ok(body)
    }
}

impl LedgerEventSource for MarketplaceApi {
    async fn fetch_ledger_page(
        &self,
        posted_after: DateTime<Utc>,
        posted_before: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<FinancialEventsPage, FeedError> {
        let page = self.list_financial_events(posted_after, posted_before, next_token).await?;
        Ok(page)
    }
}

impl FeeEstimateSource for MarketplaceApi {
    async fn estimate_fees(&self, request: &EstimateRequest) -> Result<Vec<EstimatedFee>, FeedError> {
        let estimate = self
            .get_fees_estimate(request.id_type, &request.product_id, request.unit_price, &request.currency, None)
            .await?;
        let mut fees = Vec::with_capacity(estimate.fee_detail_list.len());
        for detail in estimate.fee_detail_list {
            let fee_type = detail.fee_type.unwrap_or_else(|| "Unspecified".to_string());
            // FinalFee includes promotions; FeeAmount is the fallback
            let money = if detail.final_fee.currency_amount.is_some() { detail.final_fee } else { detail.fee_amount };
            let amount: Cents = money.to_cents().map_err(|e| MarketplaceApiError::JsonError(e.to_string()))?;
            trace!("📥️ Estimated {fee_type} for {}: {amount}", request.product_id);
            fees.push(EstimatedFee { fee_type, amount: amount.abs() });
        }
        Ok(fees)
    }
}
