//! CSV export integration tests

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use common::{create_chain_tree, create_item, FakeMarketplace};
use harvester::category::CategoryStore;
use harvester::export::{ListingExporter, COLUMNS};
use harvester::models::Listing;
use harvester::storage::{create_sqlite_store, ListingRepository};

fn listing(item_id: &str, category_id: &str, state: &str, observed_hour: u32) -> Listing {
    let mut listing =
        Listing::from_document(create_item(item_id, "EBAY-US", category_id, state)).unwrap();
    let observed = Utc.with_ymd_and_hms(2024, 5, 1, observed_hour, 0, 0).unwrap();
    listing.annotate("EBAY-US", observed);
    listing
}

#[tokio::test]
async fn test_export_writes_sold_listings_with_top_category() {
    let dir = tempfile::tempdir().unwrap();
    let store = create_sqlite_store(dir.path().join("harvester.db")).unwrap();
    store.upsert(&listing("1", "C", "EndedWithSales", 1)).await.unwrap();
    store.upsert(&listing("2", "C", "EndedWithoutSales", 1)).await.unwrap();
    store.upsert(&listing("3", "missing", "EndedWithSales", 2)).await.unwrap();

    let client = FakeMarketplace::new();
    client.set_tree("EBAY-US", "1", create_chain_tree());
    let categories = Arc::new(CategoryStore::new(client, store.clone()));
    let exporter = ListingExporter::new(store.clone(), categories);

    let mut output = Vec::new();
    let summary = exporter.export(&mut output).await.unwrap();
    assert_eq!(summary.scanned, 3);
    assert_eq!(summary.exported, 2);
    assert_eq!(summary.unresolved, 1);

    let mut reader = csv::Reader::from_reader(output.as_slice());
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, COLUMNS);

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);

    assert_eq!(&rows[0][0], "B");
    assert_eq!(&rows[0][1], "1");
    assert_eq!(&rows[0][2], "Item 1");
    assert_eq!(&rows[0][3], "US");
    assert_eq!(&rows[0][4], "120");
    assert_eq!(&rows[0][5], "99.5");
    assert_eq!(&rows[0][6], "Worldwide");
    assert_eq!(&rows[0][7], "false");
    assert_eq!(&rows[0][8], "2");
    assert_eq!(&rows[0][9], "true");
    assert_eq!(&rows[0][10], "0");

    assert_eq!(&rows[1][0], "");
    assert_eq!(&rows[1][1], "3");
}

#[tokio::test]
async fn test_export_of_empty_store_writes_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = create_sqlite_store(dir.path().join("harvester.db")).unwrap();
    let categories = Arc::new(CategoryStore::new(FakeMarketplace::new(), store.clone()));
    let exporter = ListingExporter::new(store, categories);

    let mut output = Vec::new();
    let summary = exporter.export(&mut output).await.unwrap();
    assert_eq!(summary.scanned, 0);

    let text = String::from_utf8(output).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("category,id,title"));
}

#[tokio::test]
async fn test_observed_times_are_distinct_and_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let store = create_sqlite_store(dir.path().join("harvester.db")).unwrap();
    store.upsert(&listing("1", "C", "EndedWithSales", 5)).await.unwrap();
    store.upsert(&listing("2", "C", "EndedWithSales", 3)).await.unwrap();
    store.upsert(&listing("3", "C", "EndedWithSales", 5)).await.unwrap();

    let categories = Arc::new(CategoryStore::new(FakeMarketplace::new(), store.clone()));
    let exporter = ListingExporter::new(store, categories);

    let times = exporter.observed_times().await.unwrap();
    assert_eq!(
        times,
        vec![
            Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 5, 0, 0).unwrap(),
        ]
    );
}
