//! Abstract persistence contracts. The storage layer itself — schema
//! migrations, connection pooling internals, vacuuming — is an
//! out-of-scope collaborator; these traits are the boundary this crate
//! depends on, with one concrete `sqlx`-backed implementation for local,
//! single-process use.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Period;

#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub key: String,
    pub body: Vec<u8>,
    pub status: u16,
    pub content_type: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub tokens_saved: u32,
}

#[derive(Debug, Clone)]
pub struct FingerprintRecord {
    pub hash: String,
    pub content_type: String,
    pub token_count: u32,
    pub hit_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BudgetRecord {
    pub period: Period,
    pub period_start: DateTime<Utc>,
    pub spent_usd: f64,
    pub limit_usd: f64,
}

#[derive(Debug, Clone)]
pub struct PiiLogRecord {
    pub request_id: String,
    pub kind: String,
    pub action: String,
    pub field_path: String,
    pub snippet: String,
}

/// Tier-2 of the two-tier cache: a persistent, write-through,
/// read-promote key-value store for [`CacheRecord`]s.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, sqlx::Error>;
    async fn put(&self, record: CacheRecord) -> Result<(), sqlx::Error>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error>;
}

/// Stores content fingerprints for the dedup/prompt-caching middleware.
/// Per the first-insert convention: a brand-new fingerprint starts its
/// hit count at 0; every subsequent upsert increments it.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn upsert(
        &self,
        hash: &str,
        content_type: &str,
        token_count: u32,
        now: DateTime<Utc>,
    ) -> Result<FingerprintRecord, sqlx::Error>;
}

/// Per-period spend tracking for the budget enforcer.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn get(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
    ) -> Result<Option<BudgetRecord>, sqlx::Error>;

    /// Adds `delta_usd` to the period's spend, creating the bucket with
    /// `limit_usd` if it does not yet exist. Update-else-insert is
    /// atomic at the store boundary.
    async fn add_spend(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        limit_usd: f64,
        delta_usd: f64,
    ) -> Result<BudgetRecord, sqlx::Error>;
}

/// Append-only audit trail for PII detections.
#[async_trait]
pub trait PiiLogStore: Send + Sync {
    async fn append(&self, record: PiiLogRecord) -> Result<(), sqlx::Error>;
}

pub trait Store: CacheStore + FingerprintStore + BudgetStore + PiiLogStore {}
impl<T: CacheStore + FingerprintStore + BudgetStore + PiiLogStore> Store for T {}
