//! Quota-bounded job scheduling
//!
//! One scheduling run:
//!
//! 1. syncs every configured site's category tree (any failure aborts the
//!    run before anything is enqueued)
//! 2. prices one round as the number of active top-level categories across
//!    all sites
//! 3. starting from the day's planned count, enqueues whole rounds, each
//!    with a fresh random end-time, while the next round still fits under
//!    the daily cap
//! 4. records the new planned count
//!
//! ```text
//!   planned ──► +cost ──► +cost ──► ... ──► stop before exceeding cap
//!               round 1   round 2
//! ```
//!
//! The round that would overflow the cap is never started, so the number of
//! enqueued jobs is always a multiple of the round cost.

pub mod error;
pub mod window;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::category::CategoryStore;
use crate::metrics;
use crate::models::{Category, Job};
use crate::queue::SharedJobQueue;
use crate::quota::QuotaLedger;

pub use error::{ScheduleError, ScheduleResult};
pub use window::EndTimeSampler;

/// Inputs that shape a scheduling run
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Sites to schedule, in order
    pub sites: Vec<String>,

    /// Hard cap on requests per quota day
    pub requests_per_day: u64,

    /// How far back end-times are sampled
    pub history_days: u32,
}

/// Summary of one scheduling run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleReport {
    pub day: NaiveDate,
    pub cost_per_round: u64,
    pub rounds: u64,
    pub jobs_enqueued: u64,
    pub enqueue_failures: u64,
    pub planned_total: u64,
}

/// Plans and enqueues the day's work
pub struct Scheduler {
    categories: Arc<CategoryStore>,
    ledger: QuotaLedger,
    queue: SharedJobQueue,
    settings: ScheduleSettings,
    sampler: EndTimeSampler,
    rng: ChaCha8Rng,
}

impl Scheduler {
    /// Create a scheduler with an entropy-seeded random source
    pub fn new(
        categories: Arc<CategoryStore>,
        ledger: QuotaLedger,
        queue: SharedJobQueue,
        settings: ScheduleSettings,
    ) -> Self {
        let sampler = EndTimeSampler::new(settings.history_days);
        Self {
            categories,
            ledger,
            queue,
            settings,
            sampler,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Use a fixed seed so end-times are reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Run against the current clock
    pub async fn run(&mut self) -> ScheduleResult<ScheduleReport> {
        self.run_at(Utc::now()).await
    }

    /// Run as if the current instant were `now`
    pub async fn run_at(&mut self, now: DateTime<Utc>) -> ScheduleResult<ScheduleReport> {
        for site in &self.settings.sites {
            let outcome = self
                .categories
                .sync(site)
                .await
                .map_err(|e| ScheduleError::sync(site.as_str(), e))?;
            info!(site = %site, version = %outcome.version(), "Categories ready");
        }

        let mut rounds_by_site: Vec<(String, Vec<Category>)> =
            Vec::with_capacity(self.settings.sites.len());
        for site in &self.settings.sites {
            let top = self
                .categories
                .top_level_categories(site)
                .await
                .map_err(|e| ScheduleError::sync(site.as_str(), e))?;
            rounds_by_site.push((site.clone(), top));
        }

        let cost_per_round: u64 = rounds_by_site
            .iter()
            .map(|(_, categories)| categories.len() as u64)
            .sum();

        let day = self.ledger.day_at(now);
        let mut planned = self
            .ledger
            .get_planned(day)
            .await
            .map_err(|e| ScheduleError::quota("get_planned", e))?;
        let limit = self.settings.requests_per_day;

        info!(
            day = %day,
            planned = planned,
            limit = limit,
            cost_per_round = cost_per_round,
            "Scheduling rounds"
        );

        let mut rounds = 0u64;
        let mut jobs_enqueued = 0u64;
        let mut enqueue_failures = 0u64;

        if cost_per_round == 0 {
            warn!(day = %day, "No active top-level categories; nothing to schedule");
        } else {
            while planned
                .checked_add(cost_per_round)
                .is_some_and(|next| next <= limit)
            {
                let end_time = self.sampler.sample(now, &mut self.rng);

                for (site, categories) in &rounds_by_site {
                    for category in categories {
                        let job = Job::new(
                            site.as_str(),
                            category.id.as_str(),
                            &category.name,
                            end_time,
                        );
                        match self.queue.enqueue(&job).await {
                            Ok(_) => {
                                jobs_enqueued += 1;
                                metrics::record_enqueue(site, true);
                            }
                            Err(e) => {
                                enqueue_failures += 1;
                                metrics::record_enqueue(site, false);
                                warn!(
                                    site = %site,
                                    category_id = %category.id,
                                    error = %e,
                                    "Failed to enqueue job"
                                );
                            }
                        }
                    }
                }

                planned += cost_per_round;
                rounds += 1;
            }
        }

        self.ledger
            .set_planned(day, planned)
            .await
            .map_err(|e| ScheduleError::quota("set_planned", e))?;

        let report = ScheduleReport {
            day,
            cost_per_round,
            rounds,
            jobs_enqueued,
            enqueue_failures,
            planned_total: planned,
        };

        info!(
            day = %day,
            rounds = rounds,
            jobs = jobs_enqueued,
            failures = enqueue_failures,
            planned = planned,
            "Scheduling run finished"
        );

        Ok(report)
    }
}
