//! Retry loop shared by every remote call
//!
//! Two budgets are kept apart: generic failures (network, 5xx) consume
//! `max_attempts` and back off by `base_delay * attempt`; 429 responses wait a
//! fixed cooldown and are counted only against `max_rate_limit_waits`.

use std::future::Future;
use tracing::warn;

use crate::api::FetchResult;
use crate::config::RetryPolicy;

pub async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let mut attempt = 0u32;
    let mut rate_limit_waits = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() => {
                rate_limit_waits += 1;
                if rate_limit_waits > policy.max_rate_limit_waits {
                    warn!(
                        "[retry] {}: still rate limited after {} cooldowns, giving up",
                        what, policy.max_rate_limit_waits
                    );
                    return Err(e);
                }
                warn!(
                    "[retry] {}: rate limited, cooling down {:?} ({}/{})",
                    what,
                    policy.rate_limit_cooldown(),
                    rate_limit_waits,
                    policy.max_rate_limit_waits
                );
                tokio::time::sleep(policy.rate_limit_cooldown()).await;
            }
            Err(e) if e.is_transient() => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    warn!(
                        "[retry] {}: giving up after {} attempts: {}",
                        what, attempt, e
                    );
                    return Err(e);
                }
                let delay = policy.backoff(attempt);
                warn!(
                    "[retry] {}: attempt {}/{} failed ({}), retrying in {:?}",
                    what, attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
