use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, sqlite::SqlitePoolOptions, SqlitePool};

use super::{BudgetRecord, BudgetStore, CacheRecord, CacheStore, FingerprintRecord, FingerprintStore, PiiLogRecord, PiiLogStore};
use crate::{config::Period, error::InitError};

/// The reference persistent store: a single embedded SQLite file, one
/// writer connection, a small reader pool — appropriate for a
/// single-process local proxy with no multi-node coordination.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(path: &str) -> Result<Self, InitError> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|source| InitError::StoreOpen {
                path: path.to_string(),
                source,
            })?;
        let store = Self { pool };
        store.migrate().await.map_err(InitError::Migration)?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                body BLOB NOT NULL,
                status INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                tokens_saved INTEGER NOT NULL
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS fingerprints (
                hash TEXT PRIMARY KEY,
                content_type TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                hit_count INTEGER NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS budgets (
                period TEXT NOT NULL,
                period_start TEXT NOT NULL,
                spent_usd REAL NOT NULL,
                limit_usd REAL NOT NULL,
                PRIMARY KEY (period, period_start)
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS pii_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                action TEXT NOT NULL,
                field_path TEXT NOT NULL,
                snippet TEXT NOT NULL
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT key, body, status, content_type, model, created_at, expires_at, tokens_saved \
             FROM cache WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => None,
            Some(row) => Some(CacheRecord {
                key: row.try_get("key")?,
                body: row.try_get("body")?,
                status: row.try_get::<i64, _>("status")? as u16,
                content_type: row.try_get("content_type")?,
                model: row.try_get("model")?,
                created_at: row.try_get("created_at")?,
                expires_at: row.try_get("expires_at")?,
                tokens_saved: row.try_get::<i64, _>("tokens_saved")? as u32,
            }),
        })
    }

    async fn put(&self, record: CacheRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO cache (key, body, status, content_type, model, created_at, expires_at, tokens_saved) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, status = excluded.status, \
             content_type = excluded.content_type, model = excluded.model, \
             created_at = excluded.created_at, expires_at = excluded.expires_at, \
             tokens_saved = excluded.tokens_saved",
        )
        .bind(&record.key)
        .bind(&record.body)
        .bind(record.status as i64)
        .bind(&record.content_type)
        .bind(&record.model)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.tokens_saved as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cache WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FingerprintStore for SqliteStore {
    async fn upsert(
        &self,
        hash: &str,
        content_type: &str,
        token_count: u32,
        now: DateTime<Utc>,
    ) -> Result<FingerprintRecord, sqlx::Error> {
        sqlx::query(
            "INSERT INTO fingerprints (hash, content_type, token_count, hit_count, first_seen, last_seen) \
             VALUES (?1, ?2, ?3, 0, ?4, ?4) \
             ON CONFLICT(hash) DO UPDATE SET hit_count = hit_count + 1, last_seen = ?4",
        )
        .bind(hash)
        .bind(content_type)
        .bind(token_count as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT hash, content_type, token_count, hit_count, first_seen, last_seen \
             FROM fingerprints WHERE hash = ?1",
        )
        .bind(hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(FingerprintRecord {
            hash: row.try_get("hash")?,
            content_type: row.try_get("content_type")?,
            token_count: row.try_get::<i64, _>("token_count")? as u32,
            hit_count: row.try_get::<i64, _>("hit_count")? as u32,
            first_seen: row.try_get("first_seen")?,
            last_seen: row.try_get("last_seen")?,
        })
    }
}

#[async_trait]
impl BudgetStore for SqliteStore {
    async fn get(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
    ) -> Result<Option<BudgetRecord>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT period, period_start, spent_usd, limit_usd FROM budgets \
             WHERE period = ?1 AND period_start = ?2",
        )
        .bind(period.as_str())
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => None,
            Some(row) => Some(BudgetRecord {
                period,
                period_start: row.try_get("period_start")?,
                spent_usd: row.try_get("spent_usd")?,
                limit_usd: row.try_get("limit_usd")?,
            }),
        })
    }

    async fn add_spend(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        limit_usd: f64,
        delta_usd: f64,
    ) -> Result<BudgetRecord, sqlx::Error> {
        sqlx::query(
            "INSERT INTO budgets (period, period_start, spent_usd, limit_usd) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(period, period_start) DO UPDATE SET spent_usd = spent_usd + ?3",
        )
        .bind(period.as_str())
        .bind(period_start)
        .bind(delta_usd)
        .bind(limit_usd)
        .execute(&self.pool)
        .await?;

        BudgetStore::get(self, period, period_start)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound)
    }
}

#[async_trait]
impl PiiLogStore for SqliteStore {
    async fn append(&self, record: PiiLogRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO pii_log (request_id, kind, action, field_path, snippet) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.request_id)
        .bind(&record.kind)
        .bind(&record.action)
        .bind(&record.field_path)
        .bind(&record.snippet)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_and_round_trip_cache_entry() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        let now = Utc::now();
        let record = CacheRecord {
            key: "abc".to_string(),
            body: b"hello".to_vec(),
            status: 200,
            content_type: "application/json".to_string(),
            model: "claude-sonnet-4".to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::seconds(60),
            tokens_saved: 42,
        };
        store.put(record.clone()).await.unwrap();
        let fetched = CacheStore::get(&store, "abc").await.unwrap().unwrap();
        assert_eq!(fetched.body, record.body);
        assert_eq!(fetched.tokens_saved, 42);
    }
}
