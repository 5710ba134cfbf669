//! Ambient, in-process counters (teacher's `metrics::Metrics` shape,
//! minus the OpenTelemetry meter/exporter plumbing — this core exposes
//! no Prometheus endpoint, so plain atomics are enough to answer "how
//! many" without a push/pull pipeline behind them).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{error::ApiErrorMetric, types::InferenceProvider};

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub responses_total: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub upstream_errors: AtomicU64,
    pub retries_total: AtomicU64,
    pub circuit_rejections: AtomicU64,
    pub errors_by_type: ErrorCounters,
}

#[derive(Debug, Default)]
pub struct ErrorCounters {
    pub validation_error: AtomicU64,
    pub auth_error: AtomicU64,
    pub not_found: AtomicU64,
    pub budget_exceeded: AtomicU64,
    pub rate_limited: AtomicU64,
    pub upstream_error: AtomicU64,
    pub circuit_open: AtomicU64,
    pub upstream_timeout: AtomicU64,
    pub internal: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, cache_hit: bool) {
        self.responses_total.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_retry(&self) {
        self.retries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_rejection(&self, provider: InferenceProvider) {
        tracing::debug!(%provider, "circuit rejected dispatch attempt");
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, metric: ApiErrorMetric) {
        let counter = match metric {
            ApiErrorMetric::ValidationError => &self.errors_by_type.validation_error,
            ApiErrorMetric::AuthError => &self.errors_by_type.auth_error,
            ApiErrorMetric::NotFound => &self.errors_by_type.not_found,
            ApiErrorMetric::BudgetExceeded => &self.errors_by_type.budget_exceeded,
            ApiErrorMetric::RateLimited => &self.errors_by_type.rate_limited,
            ApiErrorMetric::UpstreamError => {
                self.upstream_errors.fetch_add(1, Ordering::Relaxed);
                &self.errors_by_type.upstream_error
            }
            ApiErrorMetric::CircuitOpen => &self.errors_by_type.circuit_open,
            ApiErrorMetric::UpstreamTimeout => &self.errors_by_type.upstream_timeout,
            ApiErrorMetric::Internal => &self.errors_by_type.internal,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            responses_total: self.responses_total.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            retries_total: self.retries_total.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of the ambient counters, logged rather than
/// exported — there is no scrape endpoint in this core.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub responses_total: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_errors: u64,
    pub retries_total: u64,
    pub circuit_rejections: u64,
}
