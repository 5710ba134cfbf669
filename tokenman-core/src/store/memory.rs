use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{BudgetRecord, BudgetStore, CacheRecord, CacheStore, FingerprintRecord, FingerprintStore, PiiLogRecord, PiiLogStore};
use crate::config::Period;

/// An in-process store with no external dependencies, used for tests and
/// as a degrade-gracefully fallback when no on-disk store is configured.
#[derive(Default)]
pub struct MemoryStore {
    cache: Mutex<HashMap<String, CacheRecord>>,
    fingerprints: Mutex<HashMap<String, FingerprintRecord>>,
    budgets: Mutex<HashMap<(Period, DateTime<Utc>), BudgetRecord>>,
    pii_log: Mutex<Vec<PiiLogRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pii_log_len(&self) -> usize {
        self.pii_log.lock().expect("pii log mutex poisoned").len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, sqlx::Error> {
        Ok(self
            .cache
            .lock()
            .expect("cache mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn put(&self, record: CacheRecord) -> Result<(), sqlx::Error> {
        self.cache
            .lock()
            .expect("cache mutex poisoned")
            .insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let mut guard = self.cache.lock().expect("cache mutex poisoned");
        let before = guard.len();
        guard.retain(|_, record| record.expires_at > now);
        Ok((before - guard.len()) as u64)
    }
}

#[async_trait]
impl FingerprintStore for MemoryStore {
    async fn upsert(
        &self,
        hash: &str,
        content_type: &str,
        token_count: u32,
        now: DateTime<Utc>,
    ) -> Result<FingerprintRecord, sqlx::Error> {
        let mut guard = self.fingerprints.lock().expect("fingerprint mutex poisoned");
        let record = guard
            .entry(hash.to_string())
            .and_modify(|record| {
                record.hit_count += 1;
                record.last_seen = now;
            })
            .or_insert_with(|| FingerprintRecord {
                hash: hash.to_string(),
                content_type: content_type.to_string(),
                token_count,
                // The first insert stores 0; subsequent upserts increment.
                hit_count: 0,
                first_seen: now,
                last_seen: now,
            });
        Ok(record.clone())
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn get(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
    ) -> Result<Option<BudgetRecord>, sqlx::Error> {
        Ok(self
            .budgets
            .lock()
            .expect("budget mutex poisoned")
            .get(&(period, period_start))
            .cloned())
    }

    async fn add_spend(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        limit_usd: f64,
        delta_usd: f64,
    ) -> Result<BudgetRecord, sqlx::Error> {
        let mut guard = self.budgets.lock().expect("budget mutex poisoned");
        let record = guard
            .entry((period, period_start))
            .and_modify(|record| record.spent_usd += delta_usd)
            .or_insert_with(|| BudgetRecord {
                period,
                period_start,
                spent_usd: delta_usd,
                limit_usd,
            });
        Ok(record.clone())
    }
}

#[async_trait]
impl PiiLogStore for MemoryStore {
    async fn append(&self, record: PiiLogRecord) -> Result<(), sqlx::Error> {
        self.pii_log.lock().expect("pii log mutex poisoned").push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fingerprint_first_insert_starts_at_zero() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store.upsert("hash", "text/plain", 10, now).await.unwrap();
        assert_eq!(first.hit_count, 0);
        let second = store.upsert("hash", "text/plain", 10, now).await.unwrap();
        assert_eq!(second.hit_count, 1);
    }

    #[tokio::test]
    async fn budget_add_spend_accumulates() {
        let store = MemoryStore::new();
        let start = Utc::now();
        store
            .add_spend(Period::Daily, start, 10.0, 3.0)
            .await
            .unwrap();
        let record = store
            .add_spend(Period::Daily, start, 10.0, 2.0)
            .await
            .unwrap();
        assert_eq!(record.spent_usd, 5.0);
    }
}
