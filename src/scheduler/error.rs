//! Error types for the scheduler module

use thiserror::Error;

use crate::category::SyncError;
use crate::storage::StorageError;

/// Result type for scheduler operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Scheduler-specific errors
///
/// Every variant aborts the run; jobs are only enqueued after all sites
/// synced successfully.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// A site's category tree could not be synced
    #[error("Category sync failed for {site}: {source}")]
    Sync {
        site: String,
        #[source]
        source: SyncError,
    },

    /// The quota ledger could not be read or written
    #[error("Quota ledger error during '{operation}': {source}")]
    Quota {
        operation: String,
        #[source]
        source: StorageError,
    },
}

impl ScheduleError {
    /// Create a sync error for a site
    pub fn sync(site: impl Into<String>, source: SyncError) -> Self {
        Self::Sync {
            site: site.into(),
            source,
        }
    }

    /// Create a quota error with context
    pub fn quota(operation: impl Into<String>, source: StorageError) -> Self {
        Self::Quota {
            operation: operation.into(),
            source,
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Sync { source, .. } => source.is_recoverable(),
            Self::Quota { source, .. } => source.is_recoverable(),
        }
    }
}
