//! Configuration management for the listing harvester
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::marketplace::site_id;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Marketplace API configuration
    pub marketplace: MarketplaceConfig,

    /// Daily quota configuration
    pub quota: QuotaConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    pub redis: RedisSettings,

    /// Worker configuration
    pub worker: WorkerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Marketplace API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// Application id sent to the Finding API
    pub app_id: String,

    /// Auth token sent to the Trading API
    pub user_token: String,

    /// Global ids of the sites to harvest, in scheduling order
    pub sites: Vec<String>,

    /// Trading API endpoint
    pub trading_url: String,

    /// Finding API endpoint
    pub finding_url: String,

    /// Trading API compatibility level
    pub compatibility_level: u32,

    /// Rate limit (requests per second)
    pub rate_limit: f64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries for transient failures
    pub max_retries: u32,
}

/// Which store keeps the quota counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaBackend {
    Sqlite,
    Redis,
}

/// Daily quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Hard cap on external calls per quota day
    pub requests_per_day: u64,

    /// How far back sampled end-times may reach
    pub history_days: u32,

    /// Reference timezone for the quota day
    pub timezone: String,

    /// Counter backend
    pub backend: QuotaBackend,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// Connection URL
    pub url: String,

    /// Maximum pool size
    pub pool_size: usize,

    /// Prefix for every key written
    pub key_prefix: String,
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Jobs processed in parallel
    pub concurrency: usize,

    /// How long a reserve call waits for a job
    pub poll_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            user_token: String::new(),
            sites: vec![String::from("EBAY-US")],
            trading_url: String::from("https://api.ebay.com/ws/api.dll"),
            finding_url: String::from(
                "https://svcs.ebay.com/services/search/FindingService/v1",
            ),
            compatibility_level: 967,
            rate_limit: 5.0,
            request_timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            requests_per_day: 4900,
            history_days: 90,
            timezone: String::from("America/Los_Angeles"),
            backend: QuotaBackend::Sqlite,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/harvester.db"),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            pool_size: 16,
            key_prefix: String::from("harvester"),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_timeout_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset variables fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(app_id) = std::env::var("HARVESTER_APP_ID") {
            config.marketplace.app_id = app_id;
        }
        if let Ok(token) = std::env::var("HARVESTER_USER_TOKEN") {
            config.marketplace.user_token = token;
        }
        if let Ok(sites) = std::env::var("HARVESTER_SITES") {
            config.marketplace.sites = sites
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(url) = std::env::var("HARVESTER_TRADING_URL") {
            config.marketplace.trading_url = url;
        }
        if let Ok(url) = std::env::var("HARVESTER_FINDING_URL") {
            config.marketplace.finding_url = url;
        }
        if let Some(rate) = env_parse("HARVESTER_RATE_LIMIT") {
            config.marketplace.rate_limit = rate;
        }
        if let Some(secs) = env_parse("HARVESTER_REQUEST_TIMEOUT") {
            config.marketplace.request_timeout_secs = secs;
        }
        if let Some(retries) = env_parse("HARVESTER_MAX_RETRIES") {
            config.marketplace.max_retries = retries;
        }

        if let Some(limit) = env_parse("HARVESTER_REQUESTS_PER_DAY") {
            config.quota.requests_per_day = limit;
        }
        if let Some(days) = env_parse("HARVESTER_HISTORY_DAYS") {
            config.quota.history_days = days;
        }
        if let Ok(tz) = std::env::var("HARVESTER_TIMEZONE") {
            config.quota.timezone = tz;
        }
        if let Ok(backend) = std::env::var("HARVESTER_QUOTA_BACKEND") {
            config.quota.backend = match backend.to_ascii_lowercase().as_str() {
                "sqlite" => QuotaBackend::Sqlite,
                "redis" => QuotaBackend::Redis,
                other => anyhow::bail!("Unknown quota backend: {other}"),
            };
        }

        if let Ok(path) = std::env::var("HARVESTER_SQLITE_PATH") {
            config.database.sqlite_path = path.into();
        }

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis.url = url;
        }
        if let Some(size) = env_parse("HARVESTER_REDIS_POOL_SIZE") {
            config.redis.pool_size = size;
        }
        if let Ok(prefix) = std::env::var("HARVESTER_KEY_PREFIX") {
            config.redis.key_prefix = prefix;
        }

        if let Some(concurrency) = env_parse("HARVESTER_CONCURRENCY") {
            config.worker.concurrency = concurrency;
        }
        if let Some(secs) = env_parse("HARVESTER_POLL_TIMEOUT") {
            config.worker.poll_timeout_secs = secs;
        }

        if let Ok(level) = std::env::var("HARVESTER_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("HARVESTER_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.marketplace.sites.is_empty() {
            anyhow::bail!("at least one marketplace site must be configured");
        }

        for site in &self.marketplace.sites {
            if site_id(site).is_none() {
                anyhow::bail!("unknown marketplace site: {site}");
            }
        }

        for (name, endpoint) in [
            ("trading_url", &self.marketplace.trading_url),
            ("finding_url", &self.marketplace.finding_url),
        ] {
            url::Url::parse(endpoint)
                .with_context(|| format!("{name} is not a valid URL: {endpoint}"))?;
        }

        if self.marketplace.rate_limit <= 0.0 {
            anyhow::bail!("rate_limit must be positive");
        }

        if self.quota.requests_per_day == 0 {
            anyhow::bail!("requests_per_day must be greater than 0");
        }

        if self.quota.history_days == 0 {
            anyhow::bail!("history_days must be greater than 0");
        }

        self.timezone()?;

        if self.worker.concurrency == 0 {
            anyhow::bail!("worker concurrency must be greater than 0");
        }

        if self.redis.pool_size == 0 {
            anyhow::bail!("redis pool_size must be greater than 0");
        }

        Ok(())
    }

    /// Parsed reference timezone for quota days
    pub fn timezone(&self) -> Result<Tz> {
        self.quota
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone '{}': {e}", self.quota.timezone))
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.marketplace.request_timeout_secs)
    }

    /// Get worker poll timeout as Duration
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.poll_timeout_secs)
    }
}
