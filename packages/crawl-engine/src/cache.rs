//! Content-addressed, TTL-bounded response cache.
//!
//! Keys are SHA-256 digests of prompt text (see
//! [`crate::types::prompt_cache_key`]). `get` is a pure read with respect
//! to expiry: it never returns a stale entry and never mutates the store.
//! Expired rows are removed by `sweep_expired`, which is safe to run
//! redundantly or concurrently. The only bound is TTL; there is no LRU or
//! size cap.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::types::CacheEntry;

#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Return the entry under `key` if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Upsert by key, overwriting any existing entry and resetting expiry.
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Best-effort deletion of expired rows. Returns the count removed.
    async fn sweep_expired(&self) -> Result<u64>;
}

pub struct PostgresResponseCache {
    pool: PgPool,
}

impl PostgresResponseCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResponseCache for PostgresResponseCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            r#"
            SELECT cache_key, provider, model, response, created_at, expires_at
            FROM llm_response_cache
            WHERE cache_key = $1 AND expires_at > $2
            "#,
        )
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read cache entry")?;

        Ok(row.map(|r| CacheEntry {
            cache_key: r.get("cache_key"),
            provider: r.get("provider"),
            model: r.get("model"),
            response: r.get("response"),
            created_at: r.get("created_at"),
            expires_at: r.get("expires_at"),
        }))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO llm_response_cache (
                cache_key, provider, model, response, created_at, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (cache_key) DO UPDATE SET
                provider = EXCLUDED.provider,
                model = EXCLUDED.model,
                response = EXCLUDED.response,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&entry.cache_key)
        .bind(&entry.provider)
        .bind(&entry.model)
        .bind(&entry.response)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to write cache entry")?;
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM llm_response_cache WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to sweep expired cache entries")?;
        Ok(result.rows_affected())
    }
}
