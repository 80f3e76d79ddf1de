//! Common test utilities

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use harvester::marketplace::{
    CategoryTreeSnapshot, MarketplaceClient, MarketplaceError, MarketplaceResult,
};
use harvester::models::{Category, Listing};

/// In-memory marketplace with call counters
#[derive(Default)]
pub struct FakeMarketplace {
    trees: Mutex<HashMap<String, CategoryTreeSnapshot>>,
    failing_sites: Mutex<HashSet<String>>,
    items: Mutex<Vec<Value>>,
    fail_find: Mutex<bool>,
    pub version_calls: AtomicUsize,
    pub tree_calls: AtomicUsize,
    pub find_calls: AtomicUsize,
}

impl FakeMarketplace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `categories` for `site` at `version`
    pub fn set_tree(&self, site: &str, version: &str, categories: Vec<Category>) {
        self.trees.lock().unwrap().insert(
            site.to_string(),
            CategoryTreeSnapshot {
                version: version.to_string(),
                categories,
            },
        );
    }

    /// Make every category call for `site` fail
    pub fn fail_site(&self, site: &str) {
        self.failing_sites.lock().unwrap().insert(site.to_string());
    }

    /// Items returned by every completed-items call
    pub fn set_items(&self, items: Vec<Value>) {
        *self.items.lock().unwrap() = items;
    }

    /// Make completed-items calls fail
    pub fn fail_find(&self) {
        *self.fail_find.lock().unwrap() = true;
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn tree_calls(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    fn snapshot(&self, site: &str) -> MarketplaceResult<CategoryTreeSnapshot> {
        if self.failing_sites.lock().unwrap().contains(site) {
            return Err(MarketplaceError::api("GetCategories", "Site unavailable"));
        }
        self.trees
            .lock()
            .unwrap()
            .get(site)
            .cloned()
            .ok_or_else(|| MarketplaceError::UnknownSite(site.to_string()))
    }
}

#[async_trait]
impl MarketplaceClient for FakeMarketplace {
    async fn category_version(&self, global_id: &str) -> MarketplaceResult<String> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot(global_id)?.version)
    }

    async fn category_tree(&self, global_id: &str) -> MarketplaceResult<CategoryTreeSnapshot> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot(global_id)
    }

    async fn find_completed_items(
        &self,
        _global_id: &str,
        _category_id: &str,
        _end_time: DateTime<Utc>,
    ) -> MarketplaceResult<Vec<Listing>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_find.lock().unwrap() {
            return Err(MarketplaceError::Status {
                status: 500,
                body: "Internal error".to_string(),
            });
        }
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .filter_map(Listing::from_document)
            .collect())
    }
}

/// eBay-style tree: `count` self-parented level-1 categories, each with one
/// level-2 child
pub fn create_site_tree(prefix: &str, count: usize) -> Vec<Category> {
    let mut categories = Vec::new();
    for i in 0..count {
        let top = format!("{prefix}{i}");
        categories.push(Category::new(&top, &top, format!("Top {top}"), 1));
        categories.push(Category::new(
            format!("{top}-child"),
            &top,
            format!("Child of {top}"),
            2,
        ));
    }
    categories
}

/// Tree `{A(parent=A), B(parent=A), C(parent=B)}`
pub fn create_chain_tree() -> Vec<Category> {
    vec![
        Category::new("A", "A", "Root", 1),
        Category::new("B", "A", "Branch", 2),
        Category::new("C", "B", "Leaf", 3),
    ]
}

/// Finding API item document in the array-wrapped JSON shape
pub fn create_item(item_id: &str, site: &str, category_id: &str, state: &str) -> Value {
    json!({
        "itemId": [item_id],
        "title": [format!("Item {item_id}")],
        "globalId": [site],
        "primaryCategory": [{"categoryId": [category_id], "categoryName": ["Test"]}],
        "country": ["US"],
        "returnsAccepted": ["true"],
        "sellerInfo": [{
            "sellerUserName": ["seller"],
            "feedbackScore": ["120"],
            "positiveFeedbackPercent": ["99.5"]
        }],
        "shippingInfo": [{
            "shipToLocations": ["Worldwide"],
            "oneDayShippingAvailable": ["false"],
            "handlingTime": ["2"]
        }],
        "sellingStatus": [{
            "currentPrice": [{"@currencyId": "USD", "__value__": "10.0"}],
            "sellingState": [state]
        }],
        "listingInfo": [{"endTime": ["2024-06-02T10:00:00.000Z"]}]
    })
}
