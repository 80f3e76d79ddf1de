//! Marketplace API access
//!
//! The harvester only needs three remote operations: the category version of
//! a site, its full category tree, and one page of completed items for a
//! category up to an end time. [`MarketplaceClient`] captures exactly those so
//! the scheduler and worker can run against a fake in tests.

pub mod ebay;
pub mod xml;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Category, Listing};

pub use ebay::EbayClient;

/// Result type for marketplace calls
pub type MarketplaceResult<T> = Result<T, MarketplaceError>;

/// Global id to numeric site id, excluding eBay Motors
const SITES: &[(&str, u32)] = &[
    ("EBAY-US", 0),
    ("EBAY-AT", 16),
    ("EBAY-AU", 15),
    ("EBAY-CH", 193),
    ("EBAY-DE", 77),
    ("EBAY-ENCA", 2),
    ("EBAY-ES", 186),
    ("EBAY-FR", 71),
    ("EBAY-FRBE", 23),
    ("EBAY-FRCA", 210),
    ("EBAY-GB", 3),
    ("EBAY-HK", 201),
    ("EBAY-IE", 205),
    ("EBAY-IN", 203),
    ("EBAY-IT", 101),
    ("EBAY-MY", 207),
    ("EBAY-NL", 146),
    ("EBAY-NLBE", 123),
    ("EBAY-PH", 211),
    ("EBAY-PL", 212),
    ("EBAY-SG", 216),
];

/// Numeric site id for a global id
pub fn site_id(global_id: &str) -> Option<u32> {
    SITES
        .iter()
        .find(|(id, _)| *id == global_id)
        .map(|(_, site)| *site)
}

/// Every supported global id
pub fn supported_sites() -> impl Iterator<Item = &'static str> {
    SITES.iter().map(|(id, _)| *id)
}

/// A full category tree as returned by the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTreeSnapshot {
    pub version: String,
    pub categories: Vec<Category>,
}

/// Errors raised by marketplace calls
#[derive(Error, Debug)]
pub enum MarketplaceError {
    /// Global id missing from the site table
    #[error("Unknown marketplace site: {0}")]
    UnknownSite(String),

    /// Transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The API answered with a failure acknowledgement
    #[error("{operation} failed: {message}")]
    Api { operation: String, message: String },

    /// Response body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),
}

impl MarketplaceError {
    /// Create an API failure error
    pub fn api(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::UnknownSite(_) | Self::Api { .. } | Self::Decode(_) => false,
        }
    }
}

impl From<quick_xml::Error> for MarketplaceError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for MarketplaceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Remote operations the harvester depends on
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    /// Current category version of a site, without the tree payload
    async fn category_version(&self, global_id: &str) -> MarketplaceResult<String>;

    /// Full category tree of a site
    async fn category_tree(&self, global_id: &str) -> MarketplaceResult<CategoryTreeSnapshot>;

    /// Completed items of a category that ended at or before `end_time`
    async fn find_completed_items(
        &self,
        global_id: &str,
        category_id: &str,
        end_time: DateTime<Utc>,
    ) -> MarketplaceResult<Vec<Listing>>;
}

/// Thread-safe shared client
pub type SharedMarketplaceClient = Arc<dyn MarketplaceClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_table() {
        assert_eq!(site_id("EBAY-US"), Some(0));
        assert_eq!(site_id("EBAY-GB"), Some(3));
        assert_eq!(site_id("EBAY-SG"), Some(216));
        assert_eq!(site_id("EBAY-MOTOR"), None);
        assert_eq!(supported_sites().count(), 21);
    }

    #[test]
    fn test_error_classification() {
        assert!(MarketplaceError::Status {
            status: 503,
            body: String::new()
        }
        .is_recoverable());
        assert!(MarketplaceError::Status {
            status: 429,
            body: String::new()
        }
        .is_recoverable());
        assert!(!MarketplaceError::Status {
            status: 400,
            body: String::new()
        }
        .is_recoverable());
        assert!(!MarketplaceError::api("GetCategories", "Invalid token").is_recoverable());
        assert!(!MarketplaceError::UnknownSite("EBAY-XX".into()).is_recoverable());
    }
}
