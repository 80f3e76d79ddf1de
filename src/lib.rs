//! harvester - Quota-bounded marketplace listing harvester
//!
//! Samples completed eBay listings across marketplace sites without ever
//! exceeding a daily API request cap.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`category`] - Per-site category trees, version-checked sync and top-level resolution
//! - [`quota`] - Planned/actual request counters per quota day
//! - [`scheduler`] - Fills the day's budget with whole rounds of jobs
//! - [`worker`] - Turns jobs into stored listings under the actual-request cap
//! - [`marketplace`] - eBay Trading and Finding API client
//! - [`queue`] - At-least-once job queue (Redis or in-memory)
//! - [`storage`] - SQLite and Redis persistence
//! - [`export`] - CSV export and observation-time listing
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use harvester::category::CategoryStore;
//! use harvester::config::Config;
//! use harvester::marketplace::EbayClient;
//! use harvester::storage::create_sqlite_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = Arc::new(EbayClient::new(&config.marketplace)?);
//!     let store = create_sqlite_store(&config.database.sqlite_path)?;
//!     let categories = CategoryStore::new(client, store);
//!     categories.sync("EBAY-US").await?;
//!     Ok(())
//! }
//! ```

pub mod category;
pub mod config;
pub mod error;
pub mod export;
pub mod marketplace;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod quota;
pub mod scheduler;
pub mod storage;
pub mod utils;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::category::{CategoryStore, SyncOutcome};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, HarvesterErrorTrait, Result};
    pub use crate::export::{ExportSummary, ListingExporter};
    pub use crate::marketplace::{EbayClient, MarketplaceClient, SharedMarketplaceClient};
    pub use crate::models::{Category, Job, Listing, QuotaDay, SiteCategoryTree};
    pub use crate::queue::{InMemoryQueue, JobQueue, RedisQueue, SharedJobQueue};
    pub use crate::quota::QuotaLedger;
    pub use crate::scheduler::{ScheduleReport, ScheduleSettings, Scheduler};
    pub use crate::worker::{RunOptions, Worker, WorkerReport};
}

// Direct re-exports for convenience
pub use models::{Category, Job, Listing};
