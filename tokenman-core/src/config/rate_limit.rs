use std::{collections::HashMap, num::NonZeroU32};

use serde::{Deserialize, Serialize};

use crate::types::InferenceProvider;

/// Per-provider token bucket parameters, fed directly into `governor`'s
/// GCRA quota rather than through an outer HTTP layer, so the rate
/// limiter middleware can read and mutate request metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub providers: HashMap<InferenceProvider, GcraConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(InferenceProvider::Anthropic, GcraConfig::default());
        providers.insert(InferenceProvider::OpenAi, GcraConfig::default());
        Self {
            enabled: true,
            providers,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GcraConfig {
    /// Sustained requests per second.
    pub rate_per_sec: u32,
    /// Maximum burst above the sustained rate.
    pub burst: u32,
}

impl Default for GcraConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 20,
            burst: 10,
        }
    }
}

impl GcraConfig {
    pub fn quota(self) -> governor::Quota {
        let rate = NonZeroU32::new(self.rate_per_sec.max(1)).unwrap();
        let burst = NonZeroU32::new(self.burst.max(1)).unwrap();
        governor::Quota::per_second(rate).allow_burst(burst)
    }
}
