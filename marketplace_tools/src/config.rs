use frs_common::{helpers::parse_list, Secret};
use log::*;

const DEFAULT_ENDPOINT: &str = "https://sellingpartnerapi-na.amazon.com";
const DEFAULT_MARKETPLACE_ID: &str = "ATVPDKIKX0DER";
const DEFAULT_USER_AGENT: &str = "fee-reconciler/0.1";

#[derive(Debug, Clone, Default)]
pub struct MarketplaceConfig {
    /// Base URL of the marketplace API, without a trailing slash.
    pub endpoint: String,
    pub access_token: Secret<String>,
    /// Marketplaces whose settlement documents and fee estimates are requested.
    pub marketplace_ids: Vec<String>,
    pub user_agent: String,
}

impl MarketplaceConfig {
    pub fn new_from_env_or_default() -> Self {
        let endpoint = std::env::var("FRS_MARKETPLACE_ENDPOINT").unwrap_or_else(|_| {
            warn!("FRS_MARKETPLACE_ENDPOINT not set, using {DEFAULT_ENDPOINT} as default");
            DEFAULT_ENDPOINT.to_string()
        });
        let marketplace_ids = std::env::var("FRS_MARKETPLACE_IDS").map(|s| parse_list(&s)).unwrap_or_else(|_| {
            warn!("FRS_MARKETPLACE_IDS not set, using {DEFAULT_MARKETPLACE_ID} as default");
            vec![DEFAULT_MARKETPLACE_ID.to_string()]
        });
        let user_agent = std::env::var("FRS_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_token: Secret::default(),
            marketplace_ids,
            user_agent,
        }
    }

    pub fn with_access_token(mut self, token: Secret<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn with_marketplace_ids(mut self, ids: Vec<String>) -> Self {
        if !ids.is_empty() {
            self.marketplace_ids = ids;
        }
        self
    }
}
