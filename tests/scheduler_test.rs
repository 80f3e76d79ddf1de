//! Scheduler integration tests

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::America::Los_Angeles;
use proptest::prelude::*;

use common::{create_site_tree, FakeMarketplace};
use harvester::category::CategoryStore;
use harvester::queue::{InMemoryQueue, JobQueue};
use harvester::quota::QuotaLedger;
use harvester::scheduler::{ScheduleError, ScheduleSettings, Scheduler};
use harvester::storage::create_mock_store;

struct Harness {
    client: Arc<FakeMarketplace>,
    ledger: QuotaLedger,
    queue: Arc<InMemoryQueue>,
    scheduler: Scheduler,
}

fn harness(sites: &[&str], per_site: usize, requests_per_day: u64) -> Harness {
    let client = FakeMarketplace::new();
    for (i, site) in sites.iter().enumerate() {
        client.set_tree(site, "1", create_site_tree(&format!("S{i}-"), per_site));
    }

    let store = create_mock_store();
    let categories = Arc::new(CategoryStore::new(client.clone(), store.clone()));
    let ledger = QuotaLedger::new(store, Los_Angeles);
    let queue = Arc::new(InMemoryQueue::new());

    let scheduler = Scheduler::new(
        categories,
        ledger.clone(),
        queue.clone(),
        ScheduleSettings {
            sites: sites.iter().map(|s| s.to_string()).collect(),
            requests_per_day,
            history_days: 90,
        },
    )
    .with_seed(7);

    Harness {
        client,
        ledger,
        queue,
        scheduler,
    }
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 19, 0, 0).unwrap()
}

#[tokio::test]
async fn test_one_round_fits_under_cap() {
    let mut h = harness(&["EBAY-US", "EBAY-GB"], 3, 10);

    let report = h.scheduler.run_at(noon()).await.unwrap();
    assert_eq!(report.cost_per_round, 6);
    assert_eq!(report.rounds, 1);
    assert_eq!(report.jobs_enqueued, 6);

    let day = h.ledger.day_at(noon());
    assert_eq!(h.ledger.get_planned(day).await.unwrap(), 6);
    assert_eq!(h.queue.stats().await.unwrap().queued, 6);

    // A second run on the same day finds no room for another round
    let again = h.scheduler.run_at(noon()).await.unwrap();
    assert_eq!(again.rounds, 0);
    assert_eq!(h.ledger.get_planned(day).await.unwrap(), 6);
    assert_eq!(h.queue.stats().await.unwrap().queued, 6);
}

#[tokio::test]
async fn test_round_shares_one_end_time() {
    let mut h = harness(&["EBAY-US", "EBAY-GB"], 2, 8);
    h.scheduler.run_at(noon()).await.unwrap();

    let jobs = h.queue.queued_jobs().await;
    assert_eq!(jobs.len(), 8);

    for round in jobs.chunks(4) {
        let end_time = round[0].job.end_time;
        assert!(round.iter().all(|q| q.job.end_time == end_time));
        assert!(end_time <= noon());
        assert!(end_time >= noon() - Duration::days(90));
    }

    let sites: Vec<&str> = jobs[..4].iter().map(|q| q.job.global_id.as_str()).collect();
    assert_eq!(sites, vec!["EBAY-US", "EBAY-US", "EBAY-GB", "EBAY-GB"]);
}

#[tokio::test]
async fn test_sync_failure_enqueues_nothing() {
    let mut h = harness(&["EBAY-US", "EBAY-FR"], 3, 100);
    h.client.fail_site("EBAY-FR");

    let day = h.ledger.day_at(noon());
    h.ledger.set_planned(day, 4).await.unwrap();

    let err = h.scheduler.run_at(noon()).await.unwrap_err();
    assert!(matches!(err, ScheduleError::Sync { ref site, .. } if site == "EBAY-FR"));

    assert_eq!(h.queue.stats().await.unwrap().queued, 0);
    assert_eq!(h.ledger.get_planned(day).await.unwrap(), 4);
}

#[tokio::test]
async fn test_zero_cost_records_planned() {
    let mut h = harness(&["EBAY-US"], 0, 100);

    let report = h.scheduler.run_at(noon()).await.unwrap();
    assert_eq!(report.cost_per_round, 0);
    assert_eq!(report.jobs_enqueued, 0);

    let day = h.ledger.day_at(noon());
    assert_eq!(h.ledger.snapshot(day).await.unwrap().planned_requests, 0);
}

#[tokio::test]
async fn test_existing_plan_reduces_rounds() {
    let mut h = harness(&["EBAY-US"], 3, 10);
    let day = h.ledger.day_at(noon());
    h.ledger.set_planned(day, 5).await.unwrap();

    let report = h.scheduler.run_at(noon()).await.unwrap();
    assert_eq!(report.rounds, 1);
    assert_eq!(report.planned_total, 8);
}

#[tokio::test]
async fn test_planned_near_counter_limit_schedules_nothing() {
    let mut h = harness(&["EBAY-US"], 3, u64::MAX);
    let day = h.ledger.day_at(noon());
    h.ledger.set_planned(day, u64::MAX - 1).await.unwrap();

    let report = h.scheduler.run_at(noon()).await.unwrap();
    assert_eq!(report.rounds, 0);
    assert_eq!(report.planned_total, u64::MAX - 1);
    assert_eq!(h.queue.stats().await.unwrap().queued, 0);
}

#[tokio::test]
async fn test_quota_day_follows_reference_timezone() {
    let mut h = harness(&["EBAY-US"], 1, 10);

    // 05:00 UTC on June 2nd is still June 1st in Los Angeles
    let early = Utc.with_ymd_and_hms(2024, 6, 2, 5, 0, 0).unwrap();
    let report = h.scheduler.run_at(early).await.unwrap();
    assert_eq!(report.day.to_string(), "2024-06-01");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_only_whole_rounds_are_enqueued(
        sites in 1usize..4,
        per_site in 1usize..5,
        limit in 0u64..60,
        already in 0u64..30,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let names = ["EBAY-US", "EBAY-GB", "EBAY-DE"];
            let mut h = harness(&names[..sites], per_site, limit);
            let day = h.ledger.day_at(noon());
            h.ledger.set_planned(day, already).await.unwrap();

            let report = h.scheduler.run_at(noon()).await.unwrap();
            let cost = (sites * per_site) as u64;
            let enqueued = h.queue.stats().await.unwrap().queued;
            let planned = h.ledger.get_planned(day).await.unwrap();

            prop_assert_eq!(report.cost_per_round, cost);
            prop_assert_eq!(enqueued % cost, 0);
            prop_assert_eq!(planned, already + enqueued);
            if enqueued > 0 {
                prop_assert!(planned <= limit);
            }
            // Another round would have overflowed
            prop_assert!(planned + cost > limit);
            Ok(())
        })?;
    }
}
