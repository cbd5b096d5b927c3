use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use frs_common::Cents;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, RETRY_AFTER},
    Client,
    Method,
    Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::{
    config::MarketplaceConfig,
    data_objects::{
        pascal_case_keys,
        FeedErrorDetail,
        FeesEstimate,
        FeesEstimateResponse,
        FinancialEventsPage,
        FinancialEventsResponse,
        ProductIdType,
        ReportDocument,
        ReportsPage,
        SETTLEMENT_REPORT_TYPE,
    },
    helpers::{cents_to_decimal, iso8601},
    MarketplaceApiError,
};

const FINANCES_PATH: &str = "/finances/v0/financialEvents";
const REPORTS_PATH: &str = "/reports/2021-06-30/reports";
const DOCUMENTS_PATH: &str = "/reports/2021-06-30/documents";
const MAX_RESULTS_PER_PAGE: &str = "100";

#[derive(Clone)]
pub struct MarketplaceApi {
    config: MarketplaceConfig,
    client: Arc<Client>,
}

impl MarketplaceApi {
    pub fn new(config: MarketplaceConfig) -> Result<Self, MarketplaceApiError> {
        let mut headers = HeaderMap::with_capacity(3);
        let val = HeaderValue::from_str(config.access_token.reveal().as_str())
            .map_err(|e| MarketplaceApiError::Initialization(e.to_string()))?;
        headers.insert("x-amz-access-token", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| MarketplaceApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.endpoint)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, MarketplaceApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| MarketplaceApiError::RestRequestError(e.to_string()))?;
        let response = check_status(response).await?;
        trace!("REST query successful. {}", response.status());
        let value = response.json::<Value>().await.map_err(|e| MarketplaceApiError::JsonError(e.to_string()))?;
        serde_json::from_value(pascal_case_keys(value)).map_err(|e| MarketplaceApiError::JsonError(e.to_string()))
    }

    /// Fetches one page of ledger events. Pass the `next_token` of the previous page to continue; the date window is
    /// only sent on the first page.
    pub async fn list_financial_events(
        &self,
        posted_after: DateTime<Utc>,
        posted_before: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<FinancialEventsPage, MarketplaceApiError> {
        let after = iso8601(&posted_after);
        let before = iso8601(&posted_before);
        let mut params = vec![("MaxResultsPerPage", MAX_RESULTS_PER_PAGE)];
        match next_token {
            Some(token) => params.push(("NextToken", token)),
            None => {
                params.push(("PostedAfter", after.as_str()));
                params.push(("PostedBefore", before.as_str()));
            },
        }
        debug!("Fetching ledger events {after} → {before} (continuation: {})", next_token.is_some());
        let response =
            self.rest_query::<FinancialEventsResponse, ()>(Method::GET, FINANCES_PATH, &params, None).await?;
        if !response.errors.is_empty() {
            return Err(MarketplaceApiError::FeedErrors(FeedErrorDetail::join(&response.errors)));
        }
        let page = response.payload.ok_or(MarketplaceApiError::EmptyResponse)?;
        trace!("Fetched {} ledger events", page.financial_events.event_count());
        Ok(page)
    }

    /// Lists the settlement export documents created in the given window.
    pub async fn list_settlement_reports(
        &self,
        created_since: DateTime<Utc>,
        created_until: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<ReportsPage, MarketplaceApiError> {
        let since = iso8601(&created_since);
        let until = iso8601(&created_until);
        let marketplaces = self.config.marketplace_ids.join(",");
        let params = match next_token {
            Some(token) => vec![("nextToken", token)],
            None => vec![
                ("reportTypes", SETTLEMENT_REPORT_TYPE),
                ("processingStatuses", "DONE"),
                ("createdSince", since.as_str()),
                ("createdUntil", until.as_str()),
                ("marketplaceIds", marketplaces.as_str()),
                ("pageSize", MAX_RESULTS_PER_PAGE),
            ],
        };
        debug!("Listing settlement reports {since} → {until}");
        let value = self.raw_query(Method::GET, REPORTS_PATH, &params).await?;
        let page = serde_json::from_value::<ReportsPage>(value).map_err(|e| MarketplaceApiError::JsonError(e.to_string()))?;
        trace!("Found {} settlement reports", page.reports.len());
        Ok(page)
    }

    pub async fn get_report_document(&self, document_id: &str) -> Result<ReportDocument, MarketplaceApiError> {
        let path = format!("{DOCUMENTS_PATH}/{document_id}");
        let value = self.raw_query(Method::GET, &path, &[]).await?;
        serde_json::from_value(value).map_err(|e| MarketplaceApiError::JsonError(e.to_string()))
    }

    /// Downloads the flat-file body of a settlement export document.
    pub async fn download_report_document(&self, document: &ReportDocument) -> Result<String, MarketplaceApiError> {
        if let Some(algo) = document.compression_algorithm.as_ref().filter(|a| !a.is_empty()) {
            return Err(MarketplaceApiError::UnsupportedCompression(algo.clone()));
        }
        debug!("Downloading report document {}", document.report_document_id);
        let response = self
            .client
            .get(&document.url)
            .send()
            .await
            .map_err(|e| MarketplaceApiError::RestRequestError(e.to_string()))?;
        let response = check_status(response).await?;
        response.text().await.map_err(|e| MarketplaceApiError::RestResponseError(e.to_string()))
    }

    /// Requests the marketplace's estimate of the fees for selling one unit of a product at `price`.
    pub async fn get_fees_estimate(
        &self,
        id_type: ProductIdType,
        id: &str,
        price: Cents,
        currency: &str,
        marketplace_id: Option<&str>,
    ) -> Result<FeesEstimate, MarketplaceApiError> {
        let path = match id_type {
            ProductIdType::Sku => format!("/products/fees/v0/listings/{id}/feesEstimate"),
            ProductIdType::Asin => format!("/products/fees/v0/items/{id}/feesEstimate"),
        };
        let marketplace_id = marketplace_id
            .or_else(|| self.config.marketplace_ids.first().map(String::as_str))
            .ok_or_else(|| MarketplaceApiError::RestRequestError("No marketplace id configured".into()))?;
        let body = json!({
            "FeesEstimateRequest": {
                "MarketplaceId": marketplace_id,
                "IsAmazonFulfilled": true,
                "Identifier": id,
                "PriceToEstimateFees": {
                    "ListingPrice": { "CurrencyCode": currency, "Amount": cents_to_decimal(price) }
                }
            }
        });
        debug!("Requesting fee estimate for {id} at {price} {currency}");
        let response = self.rest_query::<FeesEstimateResponse, Value>(Method::POST, &path, &[], Some(body)).await?;
        if !response.errors.is_empty() {
            return Err(MarketplaceApiError::FeedErrors(FeedErrorDetail::join(&response.errors)));
        }
        let result = response.payload.ok_or(MarketplaceApiError::EmptyResponse)?.fees_estimate_result;
        if let Some(err) = result.error {
            return Err(MarketplaceApiError::FeedErrors(FeedErrorDetail::join(&[err])));
        }
        result.fees_estimate.ok_or(MarketplaceApiError::EmptyResponse)
    }

    /// Report endpoints use `camelCase` keys throughout, so their bodies are deserialized without key normalization.
    async fn raw_query(&self, method: Method, path: &str, params: &[(&str, &str)]) -> Result<Value, MarketplaceApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        let response = req.send().await.map_err(|e| MarketplaceApiError::RestRequestError(e.to_string()))?;
        let response = check_status(response).await?;
        response.json::<Value>().await.map_err(|e| MarketplaceApiError::JsonError(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, MarketplaceApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let message = response.text().await.map_err(|e| MarketplaceApiError::RestResponseError(e.to_string()))?;
    Err(MarketplaceApiError::QueryError { status, message, retry_after })
}
