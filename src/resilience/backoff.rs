//! Exponential backoff with jitter for version-conflict retries.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay before retry `attempt` (1-based): half fixed, half random, never above `max_delay_ms`.
pub fn conflict_backoff(attempt: u32, retries: &RetryConfig) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64 << (attempt - 1).min(20);
    let ceiling = retries.base_delay_ms.saturating_mul(factor).min(retries.max_delay_ms);
    let floor = ceiling / 2;
    let jitter = rand::thread_rng().gen_range(0..=ceiling - floor);

    Duration::from_millis(floor + jitter)
}
