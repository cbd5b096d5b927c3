use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use log::*;

use crate::matching::AllocationPolicy;

const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 2100;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;
const DEFAULT_LEDGER_SAFETY_MARGIN_SECS: i64 = 180;
const DEFAULT_LEDGER_PAGE_CAP: usize = 50;
const DEFAULT_LEDGER_WINDOW_DAYS: i64 = 7;
const DEFAULT_MAX_CHUNKS_PER_RUN: usize = 12;
const DEFAULT_ESTIMATE_BATCH_SIZE: i64 = 50;
const DEFAULT_STALE_RUN_TIMEOUT_MINS: i64 = 120;

/// Tuning of the sync controller.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum delay between two requests to a feed, retries included.
    pub min_request_interval: StdDuration,
    /// Attempts per page or document before the batch is marked failed.
    pub max_attempts: u32,
    pub backoff_base: StdDuration,
    pub backoff_max: StdDuration,
    /// How far the end of a ledger window trails "now". Recent ledger events are not final.
    pub ledger_safety_margin: Duration,
    pub ledger_page_cap: usize,
    pub ledger_window: Duration,
    /// Chunks (settlement documents, ledger windows, estimate batches) processed by one invocation.
    pub max_chunks_per_run: usize,
    pub estimate_batch_size: i64,
    pub allocation_policy: AllocationPolicy,
    /// An unfinished run older than this is considered abandoned and its lock is taken over.
    pub stale_run_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_request_interval: StdDuration::from_millis(DEFAULT_MIN_REQUEST_INTERVAL_MS),
            max_attempts: DEFAULT_MAX_RETRIES,
            backoff_base: StdDuration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: StdDuration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            ledger_safety_margin: Duration::seconds(DEFAULT_LEDGER_SAFETY_MARGIN_SECS),
            ledger_page_cap: DEFAULT_LEDGER_PAGE_CAP,
            ledger_window: Duration::days(DEFAULT_LEDGER_WINDOW_DAYS),
            max_chunks_per_run: DEFAULT_MAX_CHUNKS_PER_RUN,
            estimate_batch_size: DEFAULT_ESTIMATE_BATCH_SIZE,
            allocation_policy: AllocationPolicy::default(),
            stale_run_timeout: Duration::minutes(DEFAULT_STALE_RUN_TIMEOUT_MINS),
        }
    }
}

impl SyncConfig {
    pub fn from_env_or_default() -> Self {
        let min_request_interval = StdDuration::from_millis(env_or_default(
            "FRS_MIN_REQUEST_INTERVAL_MS",
            DEFAULT_MIN_REQUEST_INTERVAL_MS,
        ));
        let max_attempts = env_or_default("FRS_MAX_RETRIES", DEFAULT_MAX_RETRIES).max(1);
        let backoff_base = StdDuration::from_millis(env_or_default("FRS_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS));
        let backoff_max = StdDuration::from_millis(env_or_default("FRS_BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS));
        let ledger_safety_margin =
            Duration::seconds(env_or_default("FRS_LEDGER_SAFETY_MARGIN_SECS", DEFAULT_LEDGER_SAFETY_MARGIN_SECS));
        let ledger_page_cap = env_or_default("FRS_LEDGER_PAGE_CAP", DEFAULT_LEDGER_PAGE_CAP).max(1);
        let ledger_window = Duration::days(env_or_default("FRS_LEDGER_WINDOW_DAYS", DEFAULT_LEDGER_WINDOW_DAYS).max(1));
        let max_chunks_per_run = env_or_default("FRS_MAX_CHUNKS_PER_RUN", DEFAULT_MAX_CHUNKS_PER_RUN).max(1);
        let estimate_batch_size = env_or_default("FRS_ESTIMATE_BATCH_SIZE", DEFAULT_ESTIMATE_BATCH_SIZE).max(1);
        let allocation_policy = env_or_default("FRS_ALLOCATION_POLICY", AllocationPolicy::default());
        let stale_run_timeout =
            Duration::minutes(env_or_default("FRS_STALE_RUN_TIMEOUT_MINS", DEFAULT_STALE_RUN_TIMEOUT_MINS));
        Self {
            min_request_interval,
            max_attempts,
            backoff_base,
            backoff_max,
            ledger_safety_margin,
            ledger_page_cap,
            ledger_window,
            max_chunks_per_run,
            estimate_batch_size,
            allocation_policy,
            stale_run_timeout,
        }
    }

    /// A configuration with no pacing or backoff delays.
    pub fn without_delays() -> Self {
        Self {
            min_request_interval: StdDuration::ZERO,
            backoff_base: StdDuration::ZERO,
            backoff_max: StdDuration::ZERO,
            ..Default::default()
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
            warn!("🪛️ {s} is not a valid value for {var}. {e}. Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {var} is not set. Using the default, {default}.");
            default
        },
    }
}
