pub mod budget;
pub mod cache;
pub mod circuit_breaker;
pub mod compression;
pub mod dispatcher;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod router;
pub mod security;
pub mod server;

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use budget::{BudgetConfig, Period};
pub use cache::CacheConfig;
pub use circuit_breaker::CircuitBreakerConfig;
pub use compression::CompressionConfig;
pub use dispatcher::DispatcherConfig;
pub use provider::ProviderConfig;
pub use rate_limit::{GcraConfig, RateLimitConfig};
pub use retry::RetryConfig;
pub use router::RouterConfig;
pub use security::{InjectionConfig, PiiConfig};
pub use server::ServerConfig;

use crate::error::InitError;

/// Top-level configuration, assembled once at startup from embedded
/// defaults overridden by an optional TOML file overridden by
/// `TOKENMAN__`-prefixed environment variables. Reload of a *new*
/// snapshot (the hot-reload watcher) is an out-of-scope collaborator;
/// loading and validating one snapshot is ambient and owned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: Vec<ProviderConfig>,
    pub router: RouterConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub dispatcher: DispatcherConfig,
    pub rate_limit: RateLimitConfig,
    pub budget: BudgetConfig,
    pub injection: InjectionConfig,
    pub pii: PiiConfig,
    pub compression: CompressionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            providers: Vec::new(),
            router: RouterConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            dispatcher: DispatcherConfig::default(),
            rate_limit: RateLimitConfig::default(),
            budget: BudgetConfig::default(),
            injection: InjectionConfig::default(),
            pii: PiiConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

impl Config {
    /// Layers an optional TOML file, then `TOKENMAN__`-prefixed
    /// environment variables, over the embedded [`Config::default`].
    pub fn try_read(file: Option<&Path>) -> Result<Self, InitError> {
        let defaults = config::Config::try_from(&Config::default())
            .map_err(InitError::Config)?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path).required(false),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("TOKENMAN")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder.build().map_err(InitError::Config)?;
        let config: Config = serde_path_to_error::deserialize(raw)
            .map_err(|err| InitError::Config(config::ConfigError::Message(err.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural invariants that cannot be expressed in the type system
    /// alone: model route ids, non-zero periods, threshold ordering.
    pub fn validate(&self) -> Result<(), InitError> {
        let route_id_re = Regex::new(r"^[a-zA-Z0-9_.\-]+$").expect("static regex is valid");
        for model in self.router.models.keys() {
            if !route_id_re.is_match(model) {
                return Err(InitError::InvalidConfig(format!(
                    "invalid model route id: {model}"
                )));
            }
        }

        if self.cache.tier1_capacity == 0 {
            return Err(InitError::InvalidConfig(
                "cache.tier1_capacity must be non-zero".to_string(),
            ));
        }
        if self.cache.default_ttl.is_zero() {
            return Err(InitError::InvalidConfig(
                "cache.default_ttl must be non-zero".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(InitError::InvalidConfig(
                "retry.max_attempts must be non-zero".to_string(),
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(InitError::InvalidConfig(
                "retry.base_delay must not exceed retry.max_delay".to_string(),
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(InitError::InvalidConfig(
                "circuit_breaker.failure_threshold must be non-zero".to_string(),
            ));
        }

        let mut prev = 0.0;
        for threshold in &self.budget.alert_thresholds {
            if !(0.0..=1.0).contains(threshold) || *threshold < prev {
                return Err(InitError::InvalidConfig(
                    "budget.alert_thresholds must be non-decreasing fractions in [0, 1]"
                        .to_string(),
                ));
            }
            prev = *threshold;
        }

        Ok(())
    }
}
