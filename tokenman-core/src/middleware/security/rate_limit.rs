//! Per-provider token-bucket rate limiting, driven directly as a
//! pipeline middleware (rather than an outer Axum layer) so it can read
//! request metadata (the resolved provider) and return a typed
//! [`ApiError::RateLimited`] carrying a computed `Retry-After`.

use std::collections::HashMap;

use async_trait::async_trait;
use governor::{
    RateLimiter,
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
};

use crate::{
    config::RateLimitConfig,
    error::ApiError,
    pipeline::{Middleware, Outcome, RequestContext},
    types::{InferenceProvider, Request},
};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct RateLimitMiddleware {
    config: RateLimitConfig,
    limiters: HashMap<InferenceProvider, Limiter>,
    clock: DefaultClock,
}

impl RateLimitMiddleware {
    pub fn new(config: RateLimitConfig) -> Self {
        let limiters = config
            .providers
            .iter()
            .map(|(provider, gcra)| (*provider, RateLimiter::direct(gcra.quota())))
            .collect();
        Self {
            config,
            limiters,
            clock: DefaultClock::default(),
        }
    }

    fn resolve_provider(req: &Request) -> Option<InferenceProvider> {
        req.metadata
            .get("resolved_provider")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn process_request(
        &self,
        _ctx: &RequestContext,
        req: Request,
    ) -> Result<Outcome, ApiError> {
        let Some(provider) = Self::resolve_provider(&req) else {
            return Ok(Outcome::Continue(req));
        };
        let Some(limiter) = self.limiters.get(&provider) else {
            return Ok(Outcome::Continue(req));
        };

        match limiter.check() {
            Ok(()) => Ok(Outcome::Continue(req)),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                Err(ApiError::RateLimited {
                    retry_after_secs: wait.as_secs().max(1),
                })
            }
        }
    }

    async fn process_response(
        &self,
        _ctx: &RequestContext,
        _req: &Request,
        resp: crate::types::Response,
    ) -> Result<crate::types::Response, ApiError> {
        Ok(resp)
    }
}
