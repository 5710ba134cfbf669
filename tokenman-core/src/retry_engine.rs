//! Exponential backoff with full jitter. Driven by `backon`'s
//! `Backoff`/`Retryable` traits, but with a custom `Backoff`
//! implementation: `backon`'s built-in jitter multiplies a computed
//! delay by a random factor in `[0, 1]` *after* the exponential curve,
//! which is not the same distribution as full jitter
//! (`U(0, min(max, base*2^(n-1)))`) — this mirrors the teacher's own
//! precedent of forking `backon` internals for a similar gap.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// `delay = U(0, min(max_delay, base_delay * 2^(n-1)))`, computed fresh
/// on every poll so each attempt draws an independent jitter sample.
#[derive(Clone)]
pub struct FullJitterBackoff {
    config: RetryConfig,
    attempt: u32,
}

impl FullJitterBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }
}

impl Iterator for FullJitterBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts.saturating_sub(1) {
            return None;
        }
        self.attempt += 1;
        let exp = self.config.factor.powi(self.attempt as i32 - 1);
        let ceiling = (self.config.base_delay.as_secs_f64() * exp)
            .min(self.config.max_delay.as_secs_f64());
        let sampled = rand::rng().random_range(0.0..=ceiling.max(0.0));
        Some(Duration::from_secs_f64(sampled))
    }
}

/// Upstream HTTP statuses that warrant a retry, distinct from the
/// circuit breaker's (narrower) failure classification.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

/// Caps the jittered delay at `max_delay`; used when a 429 response
/// carries a `Retry-After` header that should override the computed
/// jitter.
pub fn capped_retry_after(retry_after: Duration, max_delay: Duration) -> Duration {
    retry_after.min(max_delay)
}
