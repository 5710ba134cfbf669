//! Model-to-provider resolution with ordered fallback. Deliberately
//! simpler than the teacher's weighted/peak-EWMA load balancer
//! (`tower::balance::p2c`, its `weighted-balance` crate): this core only
//! needs breaker-aware ordered fallback over a static model map, so
//! `resolve` is a plain function rather than a `tower::discover::Change`
//! stream or `Balance` service.

use crate::{
    circuit_breaker::{Admission, CircuitBreakerRegistry},
    config::RouterConfig,
    types::InferenceProvider,
};

pub struct Router {
    config: RouterConfig,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Model names routable to at least one of `enabled_providers`, for
    /// the `/v1/models` fan-in listing.
    pub fn routable_models(&self, enabled_providers: &[InferenceProvider]) -> Vec<String> {
        self.config
            .models
            .iter()
            .filter(|(_, route)| route.providers.iter().any(|p| enabled_providers.contains(p)))
            .map(|(model, _)| model.clone())
            .collect()
    }

    /// Returns the primary provider followed by fallbacks (when enabled)
    /// for `model`, filtered to providers whose circuit is not `Open`.
    /// `None` means the model is unknown. `Some(vec![])` means every
    /// provider for the model is open — the dispatcher should return 503.
    pub fn resolve(
        &self,
        model: &str,
        breakers: &CircuitBreakerRegistry,
    ) -> Option<Vec<InferenceProvider>> {
        let route = self.config.models.get(model)?;
        let candidates: &[InferenceProvider] = if self.config.fallback_enabled {
            &route.providers
        } else {
            &route.providers[..route.providers.len().min(1)]
        };

        Some(
            candidates
                .iter()
                .copied()
                .filter(|provider| breakers.admit(*provider) != Admission::Reject)
                .collect(),
        )
    }
}
