//! Request pacing and retries for feed calls.
//!
//! Every request to a feed goes through one [`FeedThrottle`], which enforces a minimum interval between requests
//! (retries count as requests) and retries transient failures with capped exponential backoff plus jitter.
use std::{future::Future, time::Duration};

use log::*;
use rand::Rng;
use tokio::{sync::Mutex, time::Instant};

use crate::{feeds::FeedError, sync::SyncConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// The deterministic part of the delay before attempt `attempt + 1`, given that `attempt` (1-based) failed:
    /// `min(base * 2^(attempt-1), max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(self.max_delay.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }

    /// Backoff plus a random jitter of up to half the base delay. A server-supplied retry delay is honoured when it
    /// is longer.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let jitter_cap = self.base_delay.as_millis() as u64 / 2;
        let jitter = if jitter_cap > 0 { rand::thread_rng().gen_range(0..=jitter_cap) } else { 0 };
        let delay = self.backoff(attempt) + Duration::from_millis(jitter);
        match retry_after {
            Some(server) if server > delay => server,
            _ => delay,
        }
    }

    pub fn should_retry(&self, attempt: u32, error: &FeedError) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }
}

/// Enforces a minimum interval between consecutive requests.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_request: Mutex::new(None) }
    }

    /// Waits until a request may be sent, and records it as sent.
    pub async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug)]
pub struct FeedThrottle {
    pacer: RequestPacer,
    policy: RetryPolicy,
}

impl FeedThrottle {
    pub fn new(min_interval: Duration, policy: RetryPolicy) -> Self {
        Self { pacer: RequestPacer::new(min_interval), policy }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        let policy = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.backoff_base,
            max_delay: config.backoff_max,
        };
        Self::new(config.min_request_interval, policy)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls `op` until it succeeds, fails permanently, or runs out of attempts. `what` names the call in logs.
    pub async fn call<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, FeedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FeedError>>,
    {
        let mut attempt = 1;
        loop {
            self.pacer.wait_turn().await;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if self.policy.should_retry(attempt, &e) => {
                    let delay = self.policy.delay_for(attempt, e.retry_after());
                    warn!(
                        "🔄️ {what} failed on attempt {attempt}/{}: {e}. Retrying in {}ms",
                        self.policy.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => {
                    if e.is_transient() {
                        error!("🔄️ {what} failed after {attempt} attempts: {e}");
                    } else {
                        debug!("🔄️ {what} failed with a permanent error: {e}");
                    }
                    return Err(e);
                },
            }
        }
    }
}
