//! Turning a credential reference into a live marketplace feed.
//!
//! Access tokens are never part of a trigger request. A request names a `credentialRef`, and the server looks the
//! token up in `FRS_CREDENTIAL_<REF>`, where `<REF>` is the reference upper-cased with every character other than
//! ASCII letters and digits replaced by `_`. So `main-store` is read from `FRS_CREDENTIAL_MAIN_STORE`.
use std::env;

use fee_reconciliation_engine::feeds::{FeeEstimateSource, LedgerEventSource, SettlementReportSource};
use frs_common::Secret;
use log::*;
use marketplace_tools::{MarketplaceApi, MarketplaceConfig};

use crate::errors::ServerError;

pub trait FeedConnector {
    type Feed: SettlementReportSource + LedgerEventSource + FeeEstimateSource + 'static;

    /// Opens a feed for one sync. An unknown credential reference is an authentication failure.
    fn connect(&self, credential_ref: &str, marketplace_ids: &[String]) -> Result<Self::Feed, ServerError>;
}

pub fn credential_var_name(credential_ref: &str) -> String {
    let suffix = credential_ref
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect::<String>();
    format!("FRS_CREDENTIAL_{suffix}")
}

pub fn resolve_credential(credential_ref: &str) -> Result<Secret<String>, ServerError> {
    let var = credential_var_name(credential_ref);
    match env::var(&var) {
        Ok(token) if !token.trim().is_empty() => Ok(Secret::new(token.trim().to_string())),
        _ => {
            warn!("🪛️ No access token is configured for credential reference '{credential_ref}' ({var})");
            Err(ServerError::AuthenticationError(format!("Unknown credential reference '{credential_ref}'")))
        },
    }
}

/// Connects to the marketplace HTTP API configured at startup.
#[derive(Debug, Clone)]
pub struct MarketplaceConnector {
    config: MarketplaceConfig,
}

impl MarketplaceConnector {
    pub fn new(config: MarketplaceConfig) -> Self {
        Self { config }
    }
}

impl FeedConnector for MarketplaceConnector {
    type Feed = MarketplaceApi;

    fn connect(&self, credential_ref: &str, marketplace_ids: &[String]) -> Result<MarketplaceApi, ServerError> {
        let token = resolve_credential(credential_ref)?;
        let config = self.config.clone().with_access_token(token).with_marketplace_ids(marketplace_ids.to_vec());
        MarketplaceApi::new(config).map_err(|e| {
            error!("🪛️ Could not create a marketplace client for '{credential_ref}'. {e}");
            ServerError::AuthenticationError(e.to_string())
        })
    }
}
