//! eBay Trading and Finding API client
//!
//! - `GetCategories` goes to the Trading API as an XML POST
//! - `findCompletedItems` goes to the Finding API as a GET with JSON output
//!
//! Every request waits on a shared `governor` rate limiter and transient
//! failures are retried with exponential backoff.

use std::num::NonZeroU32;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{header::CONTENT_TYPE, Client};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::xml::{get_categories_request, parse_get_categories};
use super::{
    site_id, CategoryTreeSnapshot, MarketplaceClient, MarketplaceError, MarketplaceResult,
};
use crate::config::MarketplaceConfig;
use crate::models::{field_str, field_value, format_end_time, Listing};
use crate::utils::retry::{with_retry_if, RetryConfig};
use crate::utils::truncate_text;

const FINDING_SERVICE_VERSION: &str = "1.13.0";
const ENTRIES_PER_PAGE: u32 = 100;

/// HTTP implementation of [`MarketplaceClient`]
pub struct EbayClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter shared by both APIs
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    retry: RetryConfig,
    app_id: String,
    user_token: String,
    trading_url: String,
    finding_url: String,
    compatibility_level: u32,
}

impl EbayClient {
    /// Create a client from the marketplace configuration
    ///
    /// # Errors
    ///
    /// Returns `MarketplaceError::Http` if the HTTP client cannot be created
    pub fn new(config: &MarketplaceConfig) -> MarketplaceResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .user_agent(concat!("listing-harvester/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let per_second = config.rate_limit.ceil().clamp(1.0, f64::from(u32::MAX)) as u32;
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            retry: RetryConfig::new(config.max_retries),
            app_id: config.app_id.clone(),
            user_token: config.user_token.clone(),
            trading_url: config.trading_url.clone(),
            finding_url: config.finding_url.clone(),
            compatibility_level: config.compatibility_level,
        })
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn site_id(global_id: &str) -> MarketplaceResult<u32> {
        site_id(global_id).ok_or_else(|| MarketplaceError::UnknownSite(global_id.to_string()))
    }

    async fn get_categories(
        &self,
        global_id: &str,
        full_tree: bool,
    ) -> MarketplaceResult<CategoryTreeSnapshot> {
        let site = Self::site_id(global_id)?;
        let body = get_categories_request(&self.user_token, site, full_tree);

        let xml = with_retry_if(
            &self.retry,
            || self.post_trading("GetCategories", site, body.clone()),
            MarketplaceError::is_recoverable,
        )
        .await?;

        parse_get_categories(&xml)
    }

    async fn post_trading(
        &self,
        call_name: &str,
        site: u32,
        body: String,
    ) -> MarketplaceResult<String> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(&self.trading_url)
            .header("X-EBAY-API-CALL-NAME", call_name)
            .header("X-EBAY-API-SITEID", site.to_string())
            .header(
                "X-EBAY-API-COMPATIBILITY-LEVEL",
                self.compatibility_level.to_string(),
            )
            .header("X-EBAY-API-APP-NAME", &self.app_id)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await?;

        read_body(response).await
    }

    async fn get_finding(&self, query: &[(&str, String)]) -> MarketplaceResult<String> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&self.finding_url)
            .query(query)
            .send()
            .await?;

        read_body(response).await
    }

    fn finding_query(
        &self,
        global_id: &str,
        category_id: &str,
        end_time: &DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("OPERATION-NAME", "findCompletedItems".to_string()),
            ("SERVICE-VERSION", FINDING_SERVICE_VERSION.to_string()),
            ("SECURITY-APPNAME", self.app_id.clone()),
            ("GLOBAL-ID", global_id.to_string()),
            ("RESPONSE-DATA-FORMAT", "JSON".to_string()),
            ("REST-PAYLOAD", String::new()),
            ("categoryId", category_id.to_string()),
            ("itemFilter(0).name", "EndTimeTo".to_string()),
            ("itemFilter(0).value", format_end_time(end_time)),
            ("outputSelector(0)", "SellerInfo".to_string()),
            ("outputSelector(1)", "StoreInfo".to_string()),
            ("paginationInput.entriesPerPage", ENTRIES_PER_PAGE.to_string()),
        ]
    }
}

async fn read_body(response: reqwest::Response) -> MarketplaceResult<String> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(MarketplaceError::Status {
            status: status.as_u16(),
            body: truncate_text(&body, 200),
        });
    }

    Ok(body)
}

/// Parse a `findCompletedItems` JSON response into listings
///
/// Items without an item id are skipped.
pub fn parse_find_completed_items(body: &str) -> MarketplaceResult<Vec<Listing>> {
    let root: Value = serde_json::from_str(body)?;
    let response = field_value(&root, &["findCompletedItemsResponse"]).ok_or_else(|| {
        MarketplaceError::Decode("missing findCompletedItemsResponse".to_string())
    })?;

    let ack = field_str(response, &["ack"]).unwrap_or_default();
    if ack == "Failure" {
        let message = field_str(response, &["errorMessage", "error", "message"])
            .unwrap_or_else(|| "unspecified failure".to_string());
        return Err(MarketplaceError::api("findCompletedItems", message));
    }

    let items = match field_value(response, &["searchResult"]).and_then(|r| r.get("item")) {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };

    let total = items.len();
    let listings: Vec<Listing> = items.into_iter().filter_map(Listing::from_document).collect();

    if listings.len() < total {
        warn!(
            skipped = total - listings.len(),
            "Completed items without itemId skipped"
        );
    }

    Ok(listings)
}

#[async_trait]
impl MarketplaceClient for EbayClient {
    async fn category_version(&self, global_id: &str) -> MarketplaceResult<String> {
        info!(site = %global_id, "Checking remote category version");
        let snapshot = self.get_categories(global_id, false).await?;
        Ok(snapshot.version)
    }

    async fn category_tree(&self, global_id: &str) -> MarketplaceResult<CategoryTreeSnapshot> {
        info!(site = %global_id, "Fetching remote category tree");
        let snapshot = self.get_categories(global_id, true).await?;
        debug!(
            site = %global_id,
            version = %snapshot.version,
            categories = snapshot.categories.len(),
            "Category tree fetched"
        );
        Ok(snapshot)
    }

    async fn find_completed_items(
        &self,
        global_id: &str,
        category_id: &str,
        end_time: DateTime<Utc>,
    ) -> MarketplaceResult<Vec<Listing>> {
        Self::site_id(global_id)?;
        let query = self.finding_query(global_id, category_id, &end_time);

        // No retries here: every attempt is billed against the daily quota
        let body = self.get_finding(&query).await?;
        let listings = parse_find_completed_items(&body)?;

        debug!(
            site = %global_id,
            category_id = %category_id,
            listings = listings.len(),
            "Completed items fetched"
        );
        Ok(listings)
    }
}
