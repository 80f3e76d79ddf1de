//! CLI command implementations
//!
//! Every command builds the services it needs from one [`App`]. The Redis
//! pool is opened lazily and shared, so commands that never touch the queue
//! or a Redis-backed quota ledger run without a Redis server.

pub mod export;
pub mod inspect;
pub mod schedule;
pub mod serve;
pub mod sync;
pub mod work;

use std::sync::Arc;

use anyhow::{Context, Result};
use deadpool_redis::Pool;
use tokio::sync::OnceCell;

use harvester::category::CategoryStore;
use harvester::config::{Config, QuotaBackend};
use harvester::error::Error;
use harvester::marketplace::{EbayClient, SharedMarketplaceClient};
use harvester::queue::{RedisQueue, SharedJobQueue};
use harvester::quota::QuotaLedger;
use harvester::storage::{self, RedisConfig, RedisQuotaRepository, SqliteStore};

pub use export::{export, times};
pub use inspect::{quota, resolve};
pub use schedule::schedule;
pub use serve::metrics_server;
pub use sync::sync;
pub use work::{work, WorkParams};

/// Services shared by the CLI commands
pub struct App {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub client: SharedMarketplaceClient,
    pub categories: Arc<CategoryStore>,
    redis: OnceCell<Pool>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        if let Some(parent) = config.database.sqlite_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let store = storage::create_sqlite_store(&config.database.sqlite_path)
            .context("Failed to open SQLite database")?;
        let client: SharedMarketplaceClient = Arc::new(
            EbayClient::new(&config.marketplace).context("Failed to create marketplace client")?,
        );
        let categories = Arc::new(CategoryStore::new(client.clone(), store.clone()));

        Ok(Self {
            config,
            store,
            client,
            categories,
            redis: OnceCell::new(),
        })
    }

    async fn redis_pool(&self) -> Result<Pool> {
        let pool = self
            .redis
            .get_or_try_init(|| async {
                let redis_config = RedisConfig::from(&self.config.redis);
                storage::redis::connect(&redis_config)
                    .await
                    .map_err(Error::from)
            })
            .await
            .context("Failed to connect to Redis")?;
        Ok(pool.clone())
    }

    /// Quota ledger on the configured backend
    pub async fn ledger(&self) -> Result<QuotaLedger> {
        let timezone = self.config.timezone()?;
        let ledger = match self.config.quota.backend {
            QuotaBackend::Sqlite => QuotaLedger::new(self.store.clone(), timezone),
            QuotaBackend::Redis => {
                let repo = RedisQuotaRepository::new(
                    self.redis_pool().await?,
                    self.config.redis.key_prefix.as_str(),
                );
                QuotaLedger::new(Arc::new(repo), timezone)
            }
        };
        Ok(ledger)
    }

    /// Job queue on the Redis broker
    pub async fn queue(&self) -> Result<SharedJobQueue> {
        let queue = RedisQueue::new(self.redis_pool().await?, &self.config.redis.key_prefix);
        Ok(Arc::new(queue))
    }
}
