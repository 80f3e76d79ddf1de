//! Persistence for category trees, quota counters and listings
//!
//! SQLite keeps everything; Redis can take over the quota counters when
//! several worker processes share one daily budget.

pub mod redis;
pub mod repository;

use thiserror::Error;

pub use self::redis::{RedisConfig, RedisQuotaRepository};
pub use repository::{
    create_mock_store, create_sqlite_store, CategoryRepository, ListingRepository, MockStore,
    QuotaRepository, SharedCategoryRepository, SharedListingRepository, SharedQuotaRepository,
    SqliteStore,
};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the backing stores
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Redis command failure
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Could not obtain a pooled Redis connection
    #[error("Redis pool error: {0}")]
    Pool(String),

    /// Stored document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored value has an unexpected shape
    #[error("Corrupt record '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Filesystem failure while opening a store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Create a corrupt-record error
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            Self::Pool(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}

impl From<deadpool_redis::PoolError> for StorageError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
