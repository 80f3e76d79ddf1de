//! Redis-backed quota counters
//!
//! Several worker processes on different hosts can share one daily budget by
//! pointing at the same Redis. Counters are plain string keys updated with
//! `INCR`, so increments stay atomic on the server.
//!
//! # Example
//!
//! ```rust,ignore
//! use harvester::storage::{RedisConfig, RedisQuotaRepository};
//!
//! let config = RedisConfig::from_env();
//! let pool = harvester::storage::redis::connect(&config).await?;
//! let quota = RedisQuotaRepository::new(pool, &config.key_prefix);
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;

use super::repository::QuotaRepository;
use super::{StorageError, StorageResult};
use crate::config::RedisSettings;
use crate::models::QuotaDay;

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::from(&RedisSettings::default())
    }
}

impl From<&RedisSettings> for RedisConfig {
    fn from(settings: &RedisSettings) -> Self {
        Self {
            url: settings.url.clone(),
            pool_size: settings.pool_size,
            key_prefix: settings.key_prefix.clone(),
        }
    }
}

impl RedisConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = RedisSettings::default();
        Self {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.url),
            pool_size: std::env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
            key_prefix: std::env::var("HARVESTER_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }
}

/// Build a connection pool and verify the server answers
pub async fn connect(config: &RedisConfig) -> StorageResult<Pool> {
    let pool = PoolConfig::from_url(&config.url)
        .builder()
        .map_err(|e| StorageError::Pool(format!("Failed to create pool builder: {e}")))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| StorageError::Pool(format!("Failed to create Redis pool: {e}")))?;

    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut *conn).await?;

    tracing::info!(url = %config.url, "Connected to Redis");
    Ok(pool)
}

/// Quota counters kept in Redis
pub struct RedisQuotaRepository {
    pool: Pool,
    key_prefix: String,
}

impl RedisQuotaRepository {
    /// Wrap an existing pool
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn planned_key(&self, day: NaiveDate) -> String {
        quota_key(&self.key_prefix, day, "planned")
    }

    fn actual_key(&self, day: NaiveDate) -> String {
        quota_key(&self.key_prefix, day, "actual")
    }
}

fn quota_key(prefix: &str, day: NaiveDate, field: &str) -> String {
    format!("{prefix}:quota:{}:{field}", day.format("%Y-%m-%d"))
}

#[async_trait]
impl QuotaRepository for RedisQuotaRepository {
    async fn get(&self, day: NaiveDate) -> StorageResult<QuotaDay> {
        let mut conn = self.pool.get().await?;
        let (planned, actual): (Option<u64>, Option<u64>) = redis::pipe()
            .get(self.planned_key(day))
            .get(self.actual_key(day))
            .query_async(&mut *conn)
            .await?;

        Ok(QuotaDay {
            date: day,
            planned_requests: planned.unwrap_or(0),
            actual_requests: actual.unwrap_or(0),
        })
    }

    async fn set_planned(&self, day: NaiveDate, planned: u64) -> StorageResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.set(self.planned_key(day), planned).await?;
        Ok(())
    }

    async fn increment_actual(&self, day: NaiveDate) -> StorageResult<u64> {
        let mut conn = self.pool.get().await?;
        let actual: u64 = conn.incr(self.actual_key(day), 1u64).await?;
        Ok(actual)
    }
}
