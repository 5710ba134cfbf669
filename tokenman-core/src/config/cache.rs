use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub tier1_capacity: u64,
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub purge_interval: Duration,
    pub store_path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tier1_capacity: 1000,
            default_ttl: Duration::from_secs(3600),
            purge_interval: Duration::from_secs(300),
            store_path: "tokenman.sqlite".to_string(),
        }
    }
}
