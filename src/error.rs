//! Unified error handling for the harvester crate
//!
//! Each module owns its error type. This module collects them into a single
//! [`Error`] for callers that cross module boundaries (the CLI, mostly),
//! while the domain errors stay usable on their own.
//!
//! # Architecture
//!
//! - [`HarvesterErrorTrait`] - Common interface implemented by the unified error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use harvester::error::{Error, HarvesterErrorTrait};
//!
//! fn report(err: &Error) {
//!     if err.is_recoverable() {
//!         eprintln!("Transient failure ({:?}), try again later: {err}", err.category());
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::category::{ResolveError, SyncError};
pub use crate::export::ExportError;
pub use crate::marketplace::MarketplaceError;
pub use crate::queue::QueueError;
pub use crate::scheduler::ScheduleError;
pub use crate::storage::StorageError;
pub use crate::worker::WorkerError;

/// Common trait for harvester error types
pub trait HarvesterErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Marketplace HTTP and API errors
    Network,
    /// Persistence and I/O errors
    Storage,
    /// Job broker errors
    Queue,
    /// Category tree sync and resolution errors
    Category,
    /// Daily quota exhaustion
    Quota,
    /// Scheduling run errors
    Scheduler,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Queue => "queue",
            Self::Category => "category",
            Self::Quota => "quota",
            Self::Scheduler => "scheduler",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the harvester crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Marketplace error: {0}")]
    Marketplace(#[from] MarketplaceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Category sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Category resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Scheduling error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HarvesterErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Marketplace(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            Self::Queue(e) => e.is_recoverable(),
            Self::Sync(e) => e.is_recoverable(),
            Self::Resolve(e) => e.is_recoverable(),
            Self::Schedule(e) => e.is_recoverable(),
            Self::Worker(e) => e.is_recoverable(),
            Self::Export(ExportError::Storage(e)) => e.is_recoverable(),
            Self::Export(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Marketplace(_) => ErrorCategory::Network,
            Self::Storage(_) | Self::Io(_) | Self::Export(_) => ErrorCategory::Storage,
            Self::Queue(_) => ErrorCategory::Queue,
            Self::Sync(_) | Self::Resolve(_) => ErrorCategory::Category,
            Self::Schedule(_) => ErrorCategory::Scheduler,
            Self::Worker(e) => match e {
                WorkerError::QuotaExceeded { .. } | WorkerError::Quota(_) => ErrorCategory::Quota,
                WorkerError::Api(_) => ErrorCategory::Network,
                WorkerError::Storage { .. } => ErrorCategory::Storage,
            },
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl Error {
    /// First harvester error in an anyhow cause chain
    pub fn find_in(err: &anyhow::Error) -> Option<&Error> {
        err.chain().find_map(|cause| cause.downcast_ref::<Error>())
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
