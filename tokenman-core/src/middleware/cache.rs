//! Two-tier deterministic-response cache: an in-memory `moka` cache
//! (tier-1) backed by a persistent [`CacheStore`] (tier-2) with
//! write-through and read-promote semantics.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::cache_key;
use crate::{
    config::CacheConfig,
    error::ApiError,
    pipeline::{Middleware, Outcome, RequestContext},
    store::{CacheRecord, CacheStore},
    types::{CachedResponse, Request, Response, ResponseBody},
};

#[derive(Clone)]
struct Tier1Entry {
    cached: CachedResponse,
    expires_at: chrono::DateTime<Utc>,
    tokens_saved: u32,
    model: String,
}

pub struct CacheMiddleware {
    config: CacheConfig,
    tier1: moka::sync::Cache<String, Tier1Entry>,
    store: Arc<dyn CacheStore>,
}

impl CacheMiddleware {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        let tier1 = moka::sync::Cache::builder()
            .max_capacity(config.tier1_capacity)
            .build();
        Self {
            config,
            tier1,
            store,
        }
    }

    fn cacheable(req: &Request) -> bool {
        req.is_deterministic()
    }

    /// Spawns the background purger, cancelled via `cancellation` and
    /// expected to be joined before the store handle is dropped during
    /// graceful shutdown.
    pub fn spawn_purger(
        store: Arc<dyn CacheStore>,
        interval: std::time::Duration,
        cancellation: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = ticker.tick() => {
                        let guard = std::panic::AssertUnwindSafe(store.delete_expired(Utc::now()));
                        match futures::FutureExt::catch_unwind(guard).await {
                            Ok(Ok(count)) if count > 0 => {
                                tracing::debug!(count, "purged expired cache entries");
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(err)) => tracing::warn!(error = %err, "cache purge failed"),
                            Err(_) => tracing::error!("cache purger panicked"),
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Middleware for CacheMiddleware {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn process_request(
        &self,
        _ctx: &RequestContext,
        mut req: Request,
    ) -> Result<Outcome, ApiError> {
        if !Self::cacheable(&req) {
            return Ok(Outcome::Continue(req));
        }

        let key = cache_key(&req.model, &req.messages, &req.tools);
        req.metadata
            .insert("cache_key".to_string(), Value::String(key.clone()));

        let now = Utc::now();
        if let Some(entry) = self.tier1.get(&key) {
            if entry.expires_at > now {
                return Ok(short_circuit(req, entry));
            }
            self.tier1.invalidate(&key);
        }

        match self.store.get(&key).await {
            Ok(Some(record)) if record.expires_at > now => {
                let entry = Tier1Entry {
                    cached: CachedResponse {
                        body: bytes::Bytes::from(record.body.clone()),
                        status: record.status,
                        content_type: record.content_type.clone(),
                    },
                    expires_at: record.expires_at,
                    tokens_saved: record.tokens_saved,
                    model: record.model.clone(),
                };
                self.tier1.insert(key.clone(), entry.clone());
                Ok(short_circuit(req, entry))
            }
            Ok(_) => Ok(Outcome::Continue(req)),
            Err(err) => {
                tracing::warn!(error = %err, "cache tier-2 lookup failed");
                Ok(Outcome::Continue(req))
            }
        }
    }

    async fn process_response(
        &self,
        _ctx: &RequestContext,
        req: &Request,
        resp: Response,
    ) -> Result<Response, ApiError> {
        if !Self::cacheable(req) || req.flag("cache_hit") || !resp.is_cacheable_status() {
            return Ok(resp);
        }

        let body = match &resp.body {
            ResponseBody::Buffered(bytes) => bytes.clone(),
            ResponseBody::Streaming(_) => return Ok(resp),
        };

        let key = req
            .metadata
            .get("cache_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| cache_key(&req.model, &req.messages, &req.tools));

        let content_type = resp
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();

        let now = Utc::now();
        let tokens_saved = req.tokens_in + resp.tokens_out;
        let record = CacheRecord {
            key: key.clone(),
            body: body.to_vec(),
            status: resp.status.as_u16(),
            content_type: content_type.clone(),
            model: req.model.clone(),
            created_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.config.default_ttl)
                    .unwrap_or_else(|_| chrono::Duration::seconds(3600)),
            tokens_saved,
        };

        self.tier1.insert(
            key.clone(),
            Tier1Entry {
                cached: CachedResponse {
                    body: body.clone(),
                    status: record.status,
                    content_type: content_type.clone(),
                },
                expires_at: record.expires_at,
                tokens_saved,
                model: req.model.clone(),
            },
        );

        if let Err(err) = self.store.put(record).await {
            tracing::warn!(error = %err, "cache tier-2 write failed");
        }

        Ok(resp)
    }
}

fn short_circuit(mut req: Request, entry: Tier1Entry) -> Outcome {
    req.set_flag("cache_hit", true);
    req.metadata.insert(
        "tokens_saved".to_string(),
        Value::Number(entry.tokens_saved.into()),
    );
    req.metadata
        .insert("cache_model".to_string(), Value::String(entry.model.clone()));
    Outcome::ShortCircuit(req, entry.cached)
}
