use fee_reconciliation_engine::{db_types::SyncKind, SyncRequest};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

/// Body of `POST /api/sync` and `POST /api/backfill`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTriggerRequest {
    pub user_id: String,
    /// Names the access token to use. It is resolved by the server, never sent in the clear.
    pub credential_ref: String,
    /// Empty means the configured default marketplaces.
    #[serde(default)]
    pub marketplace_ids: Vec<String>,
    pub months_back: u32,
    #[serde(default)]
    pub kinds: Option<Vec<SyncKind>>,
}

impl SyncTriggerRequest {
    pub fn validate(&self, max_months_back: u32) -> Result<(), ServerError> {
        if self.user_id.trim().is_empty() {
            return Err(ServerError::InvalidRequestBody("userId is required".into()));
        }
        if self.credential_ref.trim().is_empty() {
            return Err(ServerError::InvalidRequestBody("credentialRef is required".into()));
        }
        if self.months_back == 0 || self.months_back > max_months_back {
            return Err(ServerError::InvalidRequestBody(format!(
                "monthsBack must be between 1 and {max_months_back}, got {}",
                self.months_back
            )));
        }
        if matches!(&self.kinds, Some(k) if k.is_empty()) {
            return Err(ServerError::InvalidRequestBody("kinds must name at least one sync kind".into()));
        }
        Ok(())
    }

    pub fn sync_request(&self) -> SyncRequest {
        SyncRequest::new(self.user_id.trim(), self.months_back).with_marketplace_ids(self.marketplace_ids.clone())
    }

    /// The requested kinds in request order, without repeats. Settlement then ledger when none are given.
    pub fn kinds(&self) -> Vec<SyncKind> {
        match &self.kinds {
            None => vec![SyncKind::Settlement, SyncKind::Ledger],
            Some(kinds) => kinds.iter().fold(Vec::with_capacity(kinds.len()), |mut acc, k| {
                if !acc.contains(k) {
                    acc.push(*k);
                }
                acc
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
    pub user_id: String,
    pub kinds: Vec<SyncKind>,
    pub months_back: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunHistoryParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodParams {
    /// `YYYY-MM`
    pub period: Option<String>,
}
