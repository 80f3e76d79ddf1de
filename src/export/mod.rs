//! CSV export of harvested listings
//!
//! Only listings that ended with a sale are exported. Each row is labelled
//! with the listing's top-level category, resolved through the
//! [`CategoryStore`]; rows whose category cannot be resolved keep an empty
//! label and are counted as unresolved.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::category::CategoryStore;
use crate::models::Listing;
use crate::storage::{SharedListingRepository, StorageError};

/// Listings fetched per storage page
const PAGE_SIZE: usize = 500;

/// Selling state of a listing that ended with a sale
pub const ENDED_WITH_SALES: &str = "EndedWithSales";

/// Column headers, in output order
pub const COLUMNS: [&str; 11] = [
    "category",
    "id",
    "title",
    "country",
    "sellerFeedbackScore",
    "sellerPositiveFeedbackPercent",
    "shipToLocation",
    "oneDayShippingAvailable",
    "handlingTime",
    "returnsAccepted",
    "dayEnded",
];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counts from one export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Listings read from storage
    pub scanned: usize,
    /// Rows written
    pub exported: usize,
    /// Rows written without a category label
    pub unresolved: usize,
}

/// Whether a listing belongs in the export
pub fn accept_listing(listing: &Listing) -> bool {
    listing.field(&["sellingStatus", "sellingState"]).as_deref() == Some(ENDED_WITH_SALES)
}

/// Weekday a listing ended on, 0 = Sunday
pub fn day_ended(listing: &Listing) -> Option<u32> {
    let end_time = listing.field(&["listingInfo", "endTime"])?;
    let parsed = DateTime::parse_from_rfc3339(&end_time).ok()?;
    Some(parsed.with_timezone(&Utc).weekday().num_days_from_sunday())
}

pub struct ListingExporter {
    listings: SharedListingRepository,
    categories: Arc<CategoryStore>,
}

impl ListingExporter {
    pub fn new(listings: SharedListingRepository, categories: Arc<CategoryStore>) -> Self {
        Self {
            listings,
            categories,
        }
    }

    /// Write every accepted listing as CSV
    pub async fn export<W: Write>(&self, writer: W) -> Result<ExportSummary, ExportError> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(COLUMNS)?;

        let mut summary = ExportSummary::default();
        let mut offset = 0;

        loop {
            let page = self.listings.page(offset, PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            summary.scanned += page.len();

            for listing in page.iter().filter(|l| accept_listing(l)) {
                let category = self.top_category(listing).await;
                if category.is_none() {
                    summary.unresolved += 1;
                }
                out.write_record(row(listing, category.as_deref()))?;
                summary.exported += 1;
            }

            debug!(scanned = summary.scanned, exported = summary.exported, "Export page written");
        }

        out.flush()?;

        info!(
            scanned = summary.scanned,
            exported = summary.exported,
            unresolved = summary.unresolved,
            "Export finished"
        );
        Ok(summary)
    }

    /// Distinct observation times across stored listings, ascending
    pub async fn observed_times(&self) -> Result<Vec<DateTime<Utc>>, ExportError> {
        Ok(self.listings.distinct_times_observed().await?)
    }

    async fn top_category(&self, listing: &Listing) -> Option<String> {
        let site = listing.effective_global_id()?;
        let category_id = listing.primary_category_id.as_deref()?;

        match self.categories.resolve_top_parent(site, category_id).await {
            Ok(top) => Some(top),
            Err(e) => {
                warn!(
                    item_id = %listing.item_id,
                    site = %site,
                    category_id = %category_id,
                    error = %e,
                    "Could not resolve top-level category"
                );
                None
            }
        }
    }
}

fn row(listing: &Listing, category: Option<&str>) -> Vec<String> {
    let field = |path: &[&str]| listing.field(path).unwrap_or_default();

    vec![
        category.unwrap_or_default().to_string(),
        listing.item_id.clone(),
        field(&["title"]),
        field(&["country"]),
        field(&["sellerInfo", "feedbackScore"]),
        field(&["sellerInfo", "positiveFeedbackPercent"]),
        field(&["shippingInfo", "shipToLocations"]),
        field(&["shippingInfo", "oneDayShippingAvailable"]),
        field(&["shippingInfo", "handlingTime"]),
        field(&["returnsAccepted"]),
        day_ended(listing).map(|d| d.to_string()).unwrap_or_default(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing(state: &str, end_time: &str) -> Listing {
        Listing::from_document(json!({
            "itemId": ["1"],
            "sellingStatus": [{"sellingState": [state]}],
            "listingInfo": [{"endTime": [end_time]}]
        }))
        .unwrap()
    }

    #[test]
    fn test_accepts_only_sold_listings() {
        assert!(accept_listing(&listing("EndedWithSales", "2024-06-02T10:00:00.000Z")));
        assert!(!accept_listing(&listing("EndedWithoutSales", "2024-06-02T10:00:00.000Z")));
    }

    #[test]
    fn test_day_ended_counts_from_sunday() {
        // 2024-06-02 was a Sunday
        assert_eq!(day_ended(&listing("EndedWithSales", "2024-06-02T10:00:00.000Z")), Some(0));
        assert_eq!(day_ended(&listing("EndedWithSales", "2024-06-08T23:59:59.000Z")), Some(6));
        assert_eq!(day_ended(&listing("EndedWithSales", "garbage")), None);
    }

    #[test]
    fn test_row_leaves_missing_fields_empty() {
        let row = row(&listing("EndedWithSales", "2024-06-03T10:00:00.000Z"), None);
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[0], "");
        assert_eq!(row[1], "1");
        assert_eq!(row[2], "");
        assert_eq!(row[10], "1");
    }
}
