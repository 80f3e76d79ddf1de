//! Repository Pattern for Database Abstraction
//!
//! Trait-based repositories decouple the category store, quota ledger and
//! worker from the backend that persists their data.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          CategoryStore / QuotaLedger / Worker               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Repository Traits                         │
//! │  CategoryRepository, QuotaRepository, ListingRepository     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │     SQLite      │ │ Redis (quota)   │ │      Mock       │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use harvester::storage::{create_sqlite_store, create_mock_store};
//!
//! // Production: one SQLite file backs all three repositories
//! let store = create_sqlite_store("data/harvester.db")?;
//!
//! // Testing: in-memory maps
//! let mock = create_mock_store();
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{StorageError, StorageResult};
use crate::models::{format_end_time, Category, Listing, QuotaDay, SiteCategoryTree};

// ============================================================================
// Repository Traits
// ============================================================================

/// Persisted category trees, one per site
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Load the stored tree for a site
    async fn find(&self, global_id: &str) -> StorageResult<Option<SiteCategoryTree>>;

    /// Version tag of the stored tree, without loading the categories
    async fn version(&self, global_id: &str) -> StorageResult<Option<String>>;

    /// Replace the stored tree for the site wholesale
    async fn replace(&self, tree: &SiteCategoryTree) -> StorageResult<()>;
}

/// Per-day planned/actual request counters
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    /// Read a day; a missing day reads as zeros
    async fn get(&self, day: NaiveDate) -> StorageResult<QuotaDay>;

    /// Overwrite the planned count
    async fn set_planned(&self, day: NaiveDate, planned: u64) -> StorageResult<()>;

    /// Atomically add one to the actual count and return the new value
    async fn increment_actual(&self, day: NaiveDate) -> StorageResult<u64>;
}

/// Harvested listings keyed by item id
#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Insert or overwrite a listing by item id
    async fn upsert(&self, listing: &Listing) -> StorageResult<()>;

    /// Get a listing by item id
    async fn get(&self, item_id: &str) -> StorageResult<Option<Listing>>;

    /// Count stored listings
    async fn count(&self) -> StorageResult<usize>;

    /// Listings ordered by item id
    async fn page(&self, offset: usize, limit: usize) -> StorageResult<Vec<Listing>>;

    /// Distinct observation times, ascending
    async fn distinct_times_observed(&self) -> StorageResult<Vec<DateTime<Utc>>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of every repository
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets several worker processes share the file
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves no partial transaction behind
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_schema(&self) -> StorageResult<()> {
        self.conn().execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS category_trees (
                    global_id TEXT PRIMARY KEY,
                    version TEXT NOT NULL,
                    categories TEXT NOT NULL,
                    synced_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS quota_days (
                    day TEXT PRIMARY KEY,
                    planned INTEGER NOT NULL DEFAULT 0,
                    actual INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS listings (
                    item_id TEXT PRIMARY KEY,
                    global_id TEXT,
                    primary_category_id TEXT,
                    requested_global_id TEXT,
                    time_observed TEXT,
                    document TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_listings_time_observed
                    ON listings(time_observed);
                "#,
        )?;

        Ok(())
    }
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_time(key: &str, raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::corrupt(key, e.to_string()))
}

struct ListingRow {
    item_id: String,
    global_id: Option<String>,
    primary_category_id: Option<String>,
    requested_global_id: Option<String>,
    time_observed: Option<String>,
    document: String,
}

impl ListingRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            item_id: row.get(0)?,
            global_id: row.get(1)?,
            primary_category_id: row.get(2)?,
            requested_global_id: row.get(3)?,
            time_observed: row.get(4)?,
            document: row.get(5)?,
        })
    }

    fn into_listing(self) -> StorageResult<Listing> {
        let time_observed = self
            .time_observed
            .as_deref()
            .map(|raw| parse_time(&self.item_id, raw))
            .transpose()?;

        Ok(Listing {
            document: serde_json::from_str(&self.document)?,
            item_id: self.item_id,
            global_id: self.global_id,
            primary_category_id: self.primary_category_id,
            requested_global_id: self.requested_global_id,
            time_observed,
        })
    }
}

const LISTING_COLUMNS: &str =
    "item_id, global_id, primary_category_id, requested_global_id, time_observed, document";

#[async_trait]
impl CategoryRepository for SqliteStore {
    async fn find(&self, global_id: &str) -> StorageResult<Option<SiteCategoryTree>> {
        let row: Option<(String, String)> = self
            .conn()
            .query_row(
                "SELECT version, categories FROM category_trees WHERE global_id = ?1",
                params![global_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((version, raw)) => {
                let categories: Vec<Category> = serde_json::from_str(&raw)?;
                Ok(Some(SiteCategoryTree::new(global_id, version, categories)))
            }
            None => Ok(None),
        }
    }

    async fn version(&self, global_id: &str) -> StorageResult<Option<String>> {
        let version = self
            .conn()
            .query_row(
                "SELECT version FROM category_trees WHERE global_id = ?1",
                params![global_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(version)
    }

    async fn replace(&self, tree: &SiteCategoryTree) -> StorageResult<()> {
        let categories = serde_json::to_string(tree.categories())?;
        let now = Utc::now().to_rfc3339();

        self.conn().execute(
            r#"
                INSERT INTO category_trees (global_id, version, categories, synced_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(global_id) DO UPDATE SET
                    version = excluded.version,
                    categories = excluded.categories,
                    synced_at = excluded.synced_at
                "#,
            params![tree.global_id(), tree.version(), categories, now],
        )?;

        Ok(())
    }
}

#[async_trait]
impl QuotaRepository for SqliteStore {
    async fn get(&self, day: NaiveDate) -> StorageResult<QuotaDay> {
        let row: Option<(i64, i64)> = self
            .conn()
            .query_row(
                "SELECT planned, actual FROM quota_days WHERE day = ?1",
                params![day_key(day)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((planned, actual)) => QuotaDay {
                date: day,
                planned_requests: to_count(planned),
                actual_requests: to_count(actual),
            },
            None => QuotaDay::empty(day),
        })
    }

    async fn set_planned(&self, day: NaiveDate, planned: u64) -> StorageResult<()> {
        let planned = i64::try_from(planned).unwrap_or(i64::MAX);
        self.conn().execute(
            r#"
                INSERT INTO quota_days (day, planned, actual)
                VALUES (?1, ?2, 0)
                ON CONFLICT(day) DO UPDATE SET planned = excluded.planned
                "#,
            params![day_key(day), planned],
        )?;

        Ok(())
    }

    async fn increment_actual(&self, day: NaiveDate) -> StorageResult<u64> {
        let actual: i64 = self.conn().query_row(
            r#"
                INSERT INTO quota_days (day, planned, actual)
                VALUES (?1, 0, 1)
                ON CONFLICT(day) DO UPDATE SET actual = actual + 1
                RETURNING actual
                "#,
            params![day_key(day)],
            |row| row.get(0),
        )?;

        Ok(to_count(actual))
    }
}

#[async_trait]
impl ListingRepository for SqliteStore {
    async fn upsert(&self, listing: &Listing) -> StorageResult<()> {
        let document = serde_json::to_string(&listing.document)?;
        let time_observed = listing.time_observed.as_ref().map(format_end_time);
        let now = Utc::now().to_rfc3339();

        self.conn().execute(
            r#"
                INSERT INTO listings (item_id, global_id, primary_category_id,
                    requested_global_id, time_observed, document, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(item_id) DO UPDATE SET
                    global_id = excluded.global_id,
                    primary_category_id = excluded.primary_category_id,
                    requested_global_id = excluded.requested_global_id,
                    time_observed = excluded.time_observed,
                    document = excluded.document,
                    updated_at = excluded.updated_at
                "#,
            params![
                listing.item_id,
                listing.global_id,
                listing.primary_category_id,
                listing.requested_global_id,
                time_observed,
                document,
                now
            ],
        )?;

        Ok(())
    }

    async fn get(&self, item_id: &str) -> StorageResult<Option<Listing>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE item_id = ?1"),
                params![item_id],
                ListingRow::from_row,
            )
            .optional()?;

        row.map(ListingRow::into_listing).transpose()
    }

    async fn count(&self) -> StorageResult<usize> {
        let total: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;

        Ok(usize::try_from(total).unwrap_or(0))
    }

    async fn page(&self, offset: usize, limit: usize) -> StorageResult<Vec<Listing>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {LISTING_COLUMNS} FROM listings ORDER BY item_id LIMIT ?1 OFFSET ?2"
            ))?;

            let rows = stmt
                .query_map(params![limit as i64, offset as i64], ListingRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        rows.into_iter().map(ListingRow::into_listing).collect()
    }

    async fn distinct_times_observed(&self) -> StorageResult<Vec<DateTime<Utc>>> {
        let raw = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT DISTINCT time_observed FROM listings
                 WHERE time_observed IS NOT NULL ORDER BY time_observed",
            )?;

            let raw = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raw
        };

        raw.iter()
            .map(|value| parse_time("time_observed", value))
            .collect()
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

/// In-memory mock implementation of every repository
///
/// Useful for testing without database dependencies.
#[derive(Default)]
pub struct MockStore {
    trees: RwLock<HashMap<String, SiteCategoryTree>>,
    quota: RwLock<HashMap<NaiveDate, QuotaDay>>,
    listings: RwLock<BTreeMap<String, Listing>>,
}

impl MockStore {
    /// Create a new mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored listings
    pub fn len(&self) -> usize {
        self.listings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Check if no listings are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CategoryRepository for MockStore {
    async fn find(&self, global_id: &str) -> StorageResult<Option<SiteCategoryTree>> {
        let trees = self.trees.read().unwrap_or_else(|e| e.into_inner());
        Ok(trees.get(global_id).cloned())
    }

    async fn version(&self, global_id: &str) -> StorageResult<Option<String>> {
        let trees = self.trees.read().unwrap_or_else(|e| e.into_inner());
        Ok(trees.get(global_id).map(|t| t.version().to_string()))
    }

    async fn replace(&self, tree: &SiteCategoryTree) -> StorageResult<()> {
        let mut trees = self.trees.write().unwrap_or_else(|e| e.into_inner());
        trees.insert(tree.global_id().to_string(), tree.clone());
        Ok(())
    }
}

#[async_trait]
impl QuotaRepository for MockStore {
    async fn get(&self, day: NaiveDate) -> StorageResult<QuotaDay> {
        let quota = self.quota.read().unwrap_or_else(|e| e.into_inner());
        Ok(quota.get(&day).copied().unwrap_or_else(|| QuotaDay::empty(day)))
    }

    async fn set_planned(&self, day: NaiveDate, planned: u64) -> StorageResult<()> {
        let mut quota = self.quota.write().unwrap_or_else(|e| e.into_inner());
        quota
            .entry(day)
            .or_insert_with(|| QuotaDay::empty(day))
            .planned_requests = planned;
        Ok(())
    }

    async fn increment_actual(&self, day: NaiveDate) -> StorageResult<u64> {
        let mut quota = self.quota.write().unwrap_or_else(|e| e.into_inner());
        let entry = quota.entry(day).or_insert_with(|| QuotaDay::empty(day));
        entry.actual_requests += 1;
        Ok(entry.actual_requests)
    }
}

#[async_trait]
impl ListingRepository for MockStore {
    async fn upsert(&self, listing: &Listing) -> StorageResult<()> {
        let mut listings = self.listings.write().unwrap_or_else(|e| e.into_inner());
        listings.insert(listing.item_id.clone(), listing.clone());
        Ok(())
    }

    async fn get(&self, item_id: &str) -> StorageResult<Option<Listing>> {
        let listings = self.listings.read().unwrap_or_else(|e| e.into_inner());
        Ok(listings.get(item_id).cloned())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.len())
    }

    async fn page(&self, offset: usize, limit: usize) -> StorageResult<Vec<Listing>> {
        let listings = self.listings.read().unwrap_or_else(|e| e.into_inner());
        Ok(listings.values().skip(offset).take(limit).cloned().collect())
    }

    async fn distinct_times_observed(&self) -> StorageResult<Vec<DateTime<Utc>>> {
        let listings = self.listings.read().unwrap_or_else(|e| e.into_inner());
        let times: BTreeSet<DateTime<Utc>> =
            listings.values().filter_map(|l| l.time_observed).collect();
        Ok(times.into_iter().collect())
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared repository wrappers
pub type SharedCategoryRepository = Arc<dyn CategoryRepository>;
pub type SharedQuotaRepository = Arc<dyn QuotaRepository>;
pub type SharedListingRepository = Arc<dyn ListingRepository>;

/// Create a shared SQLite store
pub fn create_sqlite_store(path: impl AsRef<Path>) -> StorageResult<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::new(path)?))
}

/// Create a shared mock store
pub fn create_mock_store() -> Arc<MockStore> {
    Arc::new(MockStore::new())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    trait TestStore: CategoryRepository + QuotaRepository + ListingRepository {}
    impl<T: CategoryRepository + QuotaRepository + ListingRepository> TestStore for T {}

    fn create_test_stores() -> Vec<Arc<dyn TestStore>> {
        vec![
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(MockStore::new()),
        ]
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn listing(item_id: &str, title: &str, observed: DateTime<Utc>) -> Listing {
        let mut listing = Listing::from_document(json!({
            "itemId": [item_id],
            "title": [title],
            "globalId": ["EBAY-US"],
            "primaryCategory": [{"categoryId": ["2"]}]
        }))
        .unwrap();
        listing.annotate("EBAY-US", observed);
        listing
    }

    #[tokio::test]
    async fn test_category_tree_replace_is_wholesale() {
        for store in create_test_stores() {
            assert!(CategoryRepository::find(store.as_ref(), "EBAY-US")
                .await
                .unwrap()
                .is_none());

            let v1 = SiteCategoryTree::new(
                "EBAY-US",
                "1",
                vec![
                    Category::new("1", "1", "Art", 1),
                    Category::new("2", "1", "Prints", 2),
                ],
            );
            store.replace(&v1).await.unwrap();

            let v2 = SiteCategoryTree::new("EBAY-US", "2", vec![Category::new("9", "9", "Toys", 1)]);
            store.replace(&v2).await.unwrap();

            let loaded = CategoryRepository::find(store.as_ref(), "EBAY-US")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(loaded.version(), "2");
            assert_eq!(loaded.len(), 1);
            assert!(loaded.get("2").is_none());
            assert_eq!(
                store.version("EBAY-US").await.unwrap().as_deref(),
                Some("2")
            );
        }
    }

    #[tokio::test]
    async fn test_missing_quota_day_reads_zero() {
        for store in create_test_stores() {
            let quota = QuotaRepository::get(store.as_ref(), day(1)).await.unwrap();
            assert_eq!(quota, QuotaDay::empty(day(1)));
        }
    }

    #[tokio::test]
    async fn test_quota_planned_overwrites_and_actual_increments() {
        for store in create_test_stores() {
            store.set_planned(day(2), 12).await.unwrap();
            store.set_planned(day(2), 6).await.unwrap();

            assert_eq!(store.increment_actual(day(2)).await.unwrap(), 1);
            assert_eq!(store.increment_actual(day(2)).await.unwrap(), 2);

            let quota = QuotaRepository::get(store.as_ref(), day(2)).await.unwrap();
            assert_eq!(quota.planned_requests, 6);
            assert_eq!(quota.actual_requests, 2);

            // Other days are independent
            let other = QuotaRepository::get(store.as_ref(), day(3)).await.unwrap();
            assert_eq!(other.actual_requests, 0);
        }
    }

    #[tokio::test]
    async fn test_listing_upsert_overwrites() {
        for store in create_test_stores() {
            let first = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
            let second = Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap();

            store.upsert(&listing("42", "old title", first)).await.unwrap();
            store.upsert(&listing("42", "new title", second)).await.unwrap();

            assert_eq!(store.count().await.unwrap(), 1);
            let stored = ListingRepository::get(store.as_ref(), "42")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.field(&["title"]).as_deref(), Some("new title"));
            assert_eq!(stored.time_observed, Some(second));
            assert_eq!(stored.requested_global_id.as_deref(), Some("EBAY-US"));
        }
    }

    #[tokio::test]
    async fn test_listing_paging_and_times() {
        for store in create_test_stores() {
            let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let late = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

            store.upsert(&listing("3", "c", late)).await.unwrap();
            store.upsert(&listing("1", "a", early)).await.unwrap();
            store.upsert(&listing("2", "b", late)).await.unwrap();

            let first_page = store.page(0, 2).await.unwrap();
            let ids: Vec<_> = first_page.iter().map(|l| l.item_id.as_str()).collect();
            assert_eq!(ids, vec!["1", "2"]);

            let rest = store.page(2, 2).await.unwrap();
            assert_eq!(rest.len(), 1);
            assert_eq!(rest[0].item_id, "3");

            let times = store.distinct_times_observed().await.unwrap();
            assert_eq!(times, vec![early, late]);
        }
    }

    #[tokio::test]
    async fn test_sqlite_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harvester.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.set_planned(day(9), 42).await.unwrap();
        }

        let reopened = SqliteStore::new(&path).unwrap();
        let quota = QuotaRepository::get(&reopened, day(9)).await.unwrap();
        assert_eq!(quota.planned_requests, 42);
    }
}
