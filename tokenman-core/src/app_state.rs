//! Shared process state, following the teacher's `AppState(Arc<Inner>)`
//! newtype: a cheaply-cloneable handle passed into every axum handler,
//! wrapping everything a request needs read-only access to.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    circuit_breaker::CircuitBreakerRegistry,
    config::{Config, Period, ProviderConfig},
    dispatcher::Dispatcher,
    error::InitError,
    metrics::Metrics,
    middleware::{
        cache::CacheMiddleware,
        compression::{ContentDedupMiddleware, HeartbeatMiddleware, HistoryWindowMiddleware, RulesMiddleware},
        security::{BudgetMiddleware, InjectionMiddleware, PiiMiddleware, RateLimitMiddleware},
    },
    pipeline::Pipeline,
    router::Router,
    store::{
        memory::MemoryStore, sqlite::SqliteStore, BudgetRecord, BudgetStore, CacheRecord, CacheStore,
        FingerprintRecord, FingerprintStore, PiiLogRecord, PiiLogStore,
    },
    telemetry::ReloadHandle,
    types::InferenceProvider,
};

/// Selects between the on-disk and in-memory store at startup without
/// committing every trait-object field to the same concrete type —
/// each of the four store traits is implemented here by forwarding to
/// whichever backend was opened.
enum AnyStore {
    Sqlite(SqliteStore),
    Memory(MemoryStore),
}

#[async_trait]
impl CacheStore for AnyStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, sqlx::Error> {
        match self {
            AnyStore::Sqlite(s) => CacheStore::get(s, key).await,
            AnyStore::Memory(s) => CacheStore::get(s, key).await,
        }
    }

    async fn put(&self, record: CacheRecord) -> Result<(), sqlx::Error> {
        match self {
            AnyStore::Sqlite(s) => s.put(record).await,
            AnyStore::Memory(s) => s.put(record).await,
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        match self {
            AnyStore::Sqlite(s) => s.delete_expired(now).await,
            AnyStore::Memory(s) => s.delete_expired(now).await,
        }
    }
}

#[async_trait]
impl FingerprintStore for AnyStore {
    async fn upsert(
        &self,
        hash: &str,
        content_type: &str,
        token_count: u32,
        now: DateTime<Utc>,
    ) -> Result<FingerprintRecord, sqlx::Error> {
        match self {
            AnyStore::Sqlite(s) => s.upsert(hash, content_type, token_count, now).await,
            AnyStore::Memory(s) => s.upsert(hash, content_type, token_count, now).await,
        }
    }
}

#[async_trait]
impl BudgetStore for AnyStore {
    async fn get(&self, period: Period, period_start: DateTime<Utc>) -> Result<Option<BudgetRecord>, sqlx::Error> {
        match self {
            AnyStore::Sqlite(s) => BudgetStore::get(s, period, period_start).await,
            AnyStore::Memory(s) => BudgetStore::get(s, period, period_start).await,
        }
    }

    async fn add_spend(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        limit_usd: f64,
        delta_usd: f64,
    ) -> Result<BudgetRecord, sqlx::Error> {
        match self {
            AnyStore::Sqlite(s) => s.add_spend(period, period_start, limit_usd, delta_usd).await,
            AnyStore::Memory(s) => s.add_spend(period, period_start, limit_usd, delta_usd).await,
        }
    }
}

#[async_trait]
impl PiiLogStore for AnyStore {
    async fn append(&self, record: PiiLogRecord) -> Result<(), sqlx::Error> {
        match self {
            AnyStore::Sqlite(s) => s.append(record).await,
            AnyStore::Memory(s) => s.append(record).await,
        }
    }
}

#[derive(Clone)]
pub struct AppState(pub Arc<InnerAppState>);

pub struct InnerAppState {
    pub config: Config,
    pub provider_configs: HashMap<InferenceProvider, ProviderConfig>,
    pub pipeline: Pipeline,
    pub router: Router,
    pub breakers: CircuitBreakerRegistry,
    pub dispatcher: Dispatcher,
    pub metrics: Metrics,
    pub cache_store: Arc<dyn CacheStore>,
    pub log_level_handle: Option<ReloadHandle>,
    pub purger_cancellation: CancellationToken,
}

impl AppState {
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Wires every collaborator from a validated [`Config`]: opens the
    /// persistent store, builds the breaker registry and router, then
    /// assembles the middleware pipeline in the fixed order security
    /// gates run before the cache, and the cache runs before the
    /// compression passes that shape what actually reaches upstream.
    ///
    /// `cache.store_path` of `:memory:` selects the in-memory store
    /// (used by tests and ephemeral runs); anything else opens a SQLite
    /// file at that path.
    pub async fn new(config: Config, log_level_handle: Option<ReloadHandle>) -> Result<Self, InitError> {
        let store: Arc<AnyStore> = if config.cache.store_path == ":memory:" {
            Arc::new(AnyStore::Memory(MemoryStore::new()))
        } else {
            Arc::new(AnyStore::Sqlite(SqliteStore::open(&config.cache.store_path).await?))
        };
        let cache_store: Arc<dyn CacheStore> = store.clone();
        let fingerprint_store: Arc<dyn FingerprintStore> = store.clone();
        let budget_store: Arc<dyn BudgetStore> = store.clone();
        let pii_log_store: Arc<dyn PiiLogStore> = store.clone();

        let provider_configs: HashMap<InferenceProvider, ProviderConfig> = config
            .providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| (p.provider, p.clone()))
            .collect();
        let providers: Vec<InferenceProvider> = provider_configs.keys().copied().collect();

        let breakers = CircuitBreakerRegistry::new(&providers, config.circuit_breaker);
        let router = Router::new(config.router.clone());
        let dispatcher = Dispatcher::new(config.dispatcher.clone(), config.retry.clone())?;
        let metrics = Metrics::new();

        let pipeline = Pipeline::new(vec![
            Arc::new(InjectionMiddleware::new(config.injection.clone())),
            Arc::new(PiiMiddleware::new(config.pii.clone(), pii_log_store)),
            Arc::new(RateLimitMiddleware::new(config.rate_limit.clone())),
            Arc::new(BudgetMiddleware::new(config.budget.clone(), budget_store)),
            Arc::new(CacheMiddleware::new(config.cache.clone(), cache_store.clone())),
            Arc::new(ContentDedupMiddleware::new(
                config.compression.dedup_enabled,
                config.compression.dedup_threshold,
                fingerprint_store,
            )),
            Arc::new(RulesMiddleware::new(config.compression.rules.clone())),
            Arc::new(HistoryWindowMiddleware::new(
                true,
                config.compression.history_window_size,
            )),
            Arc::new(HeartbeatMiddleware::new(config.compression.heartbeat.clone())),
        ]);

        Ok(Self(Arc::new(InnerAppState {
            config,
            provider_configs,
            pipeline,
            router,
            breakers,
            dispatcher,
            metrics,
            cache_store,
            log_level_handle,
            purger_cancellation: CancellationToken::new(),
        })))
    }
}
