//! Error types for the category store

use thiserror::Error;

use crate::marketplace::MarketplaceError;
use crate::storage::StorageError;

/// A site's category tree could not be brought up to date
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote version or tree fetch failed
    #[error("Failed to fetch categories for {site}: {source}")]
    Remote {
        site: String,
        #[source]
        source: MarketplaceError,
    },

    /// Persisted tree could not be read or written
    #[error("Failed to access stored categories for {site}: {source}")]
    Storage {
        site: String,
        #[source]
        source: StorageError,
    },
}

impl SyncError {
    pub(crate) fn remote(site: &str, source: MarketplaceError) -> Self {
        Self::Remote {
            site: site.to_string(),
            source,
        }
    }

    pub(crate) fn storage(site: &str, source: StorageError) -> Self {
        Self::Storage {
            site: site.to_string(),
            source,
        }
    }

    /// Site the failure belongs to
    pub fn site(&self) -> &str {
        match self {
            Self::Remote { site, .. } | Self::Storage { site, .. } => site,
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Remote { source, .. } => source.is_recoverable(),
            Self::Storage { source, .. } => source.is_recoverable(),
        }
    }
}

/// A category could not be resolved to its top-level ancestor
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The category does not exist in the site's tree
    #[error("Category {category_id} not found in {site} tree")]
    NotFound { site: String, category_id: String },

    /// A parent reference points at a missing category
    #[error("Category {category_id} in {site} references missing parent {parent_id}")]
    DanglingParent {
        site: String,
        category_id: String,
        parent_id: String,
    },

    /// The parent chain does not terminate within the step bound
    #[error("Parent chain of {category_id} in {site} exceeds {limit} steps")]
    TooDeep {
        site: String,
        category_id: String,
        limit: usize,
    },

    /// No tree is available for the site
    #[error("Category tree unavailable: {0}")]
    TreeUnavailable(#[from] SyncError),
}

impl ResolveError {
    /// Check if the error is recoverable
    ///
    /// Only an unavailable tree can succeed on a later attempt; the other
    /// variants describe the tree itself.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::TreeUnavailable(e) => e.is_recoverable(),
            _ => false,
        }
    }
}
