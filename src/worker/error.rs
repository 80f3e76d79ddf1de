//! Error types for job processing

use thiserror::Error;

use crate::marketplace::MarketplaceError;
use crate::storage::StorageError;

/// Why a single job failed
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The day's cap is reached; the API was not called
    #[error("Daily quota exhausted: {used}/{limit} requests used")]
    QuotaExceeded { used: u64, limit: u64 },

    /// The marketplace call failed
    #[error("Marketplace call failed: {0}")]
    Api(#[from] MarketplaceError),

    /// A listing could not be stored
    #[error("Failed to store listing {item_id}: {source}")]
    Storage {
        item_id: String,
        #[source]
        source: StorageError,
    },

    /// The quota ledger could not be read or updated
    #[error("Quota ledger error: {0}")]
    Quota(#[source] StorageError),
}

impl WorkerError {
    /// Check if the error is recoverable
    ///
    /// A recoverable failure may succeed if the job is submitted again;
    /// nothing in the worker retries on its own.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::QuotaExceeded { .. } => false,
            Self::Api(e) => e.is_recoverable(),
            Self::Storage { source, .. } | Self::Quota(source) => source.is_recoverable(),
        }
    }

    /// Short label for metrics
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::Api(_) => "api_error",
            Self::Storage { .. } => "storage_error",
            Self::Quota(_) => "quota_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_message() {
        let err = WorkerError::QuotaExceeded {
            used: 4900,
            limit: 4900,
        };
        assert_eq!(err.to_string(), "Daily quota exhausted: 4900/4900 requests used");
        assert!(!err.is_recoverable());
        assert_eq!(err.status_label(), "quota_exceeded");
    }

    #[test]
    fn test_api_error_conversion() {
        let err: WorkerError = MarketplaceError::Status {
            status: 502,
            body: String::new(),
        }
        .into();
        assert!(err.is_recoverable());
        assert_eq!(err.status_label(), "api_error");
    }
}
