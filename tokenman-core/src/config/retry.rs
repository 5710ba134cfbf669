use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RETRY_FACTOR: f64 = 2.0;

/// Full-jitter exponential backoff parameters for the retry engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            factor: DEFAULT_RETRY_FACTOR,
        }
    }
}
