use std::{env, fmt::Display, str::FromStr};

use fee_reconciliation_engine::SyncConfig;
use log::*;
use marketplace_tools::MarketplaceConfig;

const DEFAULT_FRS_HOST: &str = "127.0.0.1";
const DEFAULT_FRS_PORT: u16 = 8470;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/fee_store.db";
const DEFAULT_MAX_SYNC_MONTHS_BACK: u32 = 3;
const DEFAULT_MAX_BACKFILL_MONTHS_BACK: u32 = 24;
const DEFAULT_JOB_QUEUE_SIZE: usize = 32;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
const DEFAULT_DB_CONNECTIONS: u32 = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_db_connections: u32,
    pub limits: TriggerLimits,
    /// Capacity of the background backfill queue. Backfill requests are refused while it is full.
    pub job_queue_size: usize,
    /// How many backfill jobs may run at the same time.
    pub max_concurrent_jobs: usize,
    /// Endpoint and default marketplaces. The access token is filled in per request from a credential reference.
    pub marketplace: MarketplaceConfig,
    pub sync: SyncConfig,
}

/// Bounds on `monthsBack` for the two trigger routes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerLimits {
    pub max_sync_months_back: u32,
    pub max_backfill_months_back: u32,
}

impl Default for TriggerLimits {
    fn default() -> Self {
        Self {
            max_sync_months_back: DEFAULT_MAX_SYNC_MONTHS_BACK,
            max_backfill_months_back: DEFAULT_MAX_BACKFILL_MONTHS_BACK,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_FRS_HOST.to_string(),
            port: DEFAULT_FRS_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_db_connections: DEFAULT_DB_CONNECTIONS,
            limits: TriggerLimits::default(),
            job_queue_size: DEFAULT_JOB_QUEUE_SIZE,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            marketplace: MarketplaceConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("FRS_HOST").ok().unwrap_or_else(|| DEFAULT_FRS_HOST.into());
        let port = env_or_default("FRS_PORT", DEFAULT_FRS_PORT);
        let database_url = env::var("FRS_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ FRS_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_db_connections = env_or_default("FRS_DB_CONNECTIONS", DEFAULT_DB_CONNECTIONS).max(1);
        let limits = TriggerLimits {
            max_sync_months_back: env_or_default("FRS_MAX_SYNC_MONTHS_BACK", DEFAULT_MAX_SYNC_MONTHS_BACK).max(1),
            max_backfill_months_back: env_or_default("FRS_MAX_BACKFILL_MONTHS_BACK", DEFAULT_MAX_BACKFILL_MONTHS_BACK)
                .max(1),
        };
        let job_queue_size = env_or_default("FRS_JOB_QUEUE_SIZE", DEFAULT_JOB_QUEUE_SIZE).max(1);
        let max_concurrent_jobs = env_or_default("FRS_MAX_CONCURRENT_JOBS", DEFAULT_MAX_CONCURRENT_JOBS).max(1);
        let marketplace = MarketplaceConfig::new_from_env_or_default();
        let sync = SyncConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            max_db_connections,
            limits,
            job_queue_size,
            max_concurrent_jobs,
            marketplace,
            sync,
        }
    }
}

fn env_or_default<T>(var: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(var) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
