//! Job processing
//!
//! A worker turns one queued [`Job`] into stored listings:
//!
//! 1. refuse the job when the day's actual request count already reached the cap
//! 2. call the marketplace
//! 3. count the call against the quota, whether it succeeded or not
//! 4. tag every listing with the site queried and the job's end-time, then
//!    upsert them all by item id
//!
//! Upserts make redelivered jobs harmless: the second run overwrites the
//! first run's records instead of duplicating them.

pub mod error;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::marketplace::SharedMarketplaceClient;
use crate::metrics;
use crate::models::Job;
use crate::queue::{JobQueue, QueuedJob, SharedJobQueue};
use crate::quota::QuotaLedger;
use crate::storage::SharedListingRepository;
use crate::utils::truncate_text;

pub use error::WorkerError;

/// Result of a successfully processed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    /// Listings upserted
    pub listings: usize,
}

/// Consumption loop settings
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Jobs processed in parallel
    pub concurrency: usize,

    /// Upper bound on a single reserve wait
    pub poll_timeout: Duration,
}

/// Tally of a consumption loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub completed: u64,
    pub failed: u64,
    pub quota_exceeded: u64,
    pub listings: u64,
}

enum JobStatus {
    Completed(usize),
    Failed,
    QuotaExceeded,
}

/// Processes harvesting jobs
pub struct Worker {
    client: SharedMarketplaceClient,
    ledger: QuotaLedger,
    listings: SharedListingRepository,
    requests_per_day: u64,
}

impl Worker {
    pub fn new(
        client: SharedMarketplaceClient,
        ledger: QuotaLedger,
        listings: SharedListingRepository,
        requests_per_day: u64,
    ) -> Self {
        Self {
            client,
            ledger,
            listings,
            requests_per_day,
        }
    }

    /// Process a single job
    pub async fn process_one(&self, job: &Job) -> Result<JobOutcome, WorkerError> {
        let _timer = metrics::start_job_timer(&job.global_id);
        let day = self.ledger.today();

        let used = self
            .ledger
            .get_actual(day)
            .await
            .map_err(WorkerError::Quota)?;
        if used >= self.requests_per_day {
            return Err(WorkerError::QuotaExceeded {
                used,
                limit: self.requests_per_day,
            });
        }

        let result = self
            .client
            .find_completed_items(&job.global_id, &job.category_id, job.end_time)
            .await;

        let actual = self
            .ledger
            .increment_actual(day)
            .await
            .map_err(WorkerError::Quota)?;
        debug!(day = %day, actual = actual, "Request counted");

        let mut listings = result?;
        for listing in &mut listings {
            listing.annotate(&job.global_id, job.end_time);
        }

        let results = join_all(listings.iter().map(|l| self.listings.upsert(l))).await;
        for (listing, result) in listings.iter().zip(results) {
            result.map_err(|source| WorkerError::Storage {
                item_id: listing.item_id.clone(),
                source,
            })?;
        }

        Ok(JobOutcome {
            listings: listings.len(),
        })
    }

    /// Process one reserved job and acknowledge it
    async fn handle(&self, queue: &dyn JobQueue, queued: QueuedJob) -> JobStatus {
        let job = &queued.job;

        match self.process_one(job).await {
            Ok(outcome) => {
                info!(
                    job_id = %queued.id,
                    site = %job.global_id,
                    category_id = %job.category_id,
                    listings = outcome.listings,
                    "Job completed"
                );
                metrics::record_job_processed(&job.global_id, "completed", outcome.listings);

                if let Err(e) = queue.complete(&queued).await {
                    warn!(job_id = %queued.id, error = %e, "Failed to acknowledge job");
                }
                JobStatus::Completed(outcome.listings)
            }
            Err(e) => {
                warn!(
                    job_id = %queued.id,
                    site = %job.global_id,
                    category_id = %job.category_id,
                    error = %e,
                    "Job failed"
                );
                metrics::record_job_processed(&job.global_id, e.status_label(), 0);

                let reason = truncate_text(&e.to_string(), 500);
                if let Err(ack) = queue.fail(&queued, &reason).await {
                    warn!(job_id = %queued.id, error = %ack, "Failed to record job failure");
                }

                match e {
                    WorkerError::QuotaExceeded { .. } => JobStatus::QuotaExceeded,
                    _ => JobStatus::Failed,
                }
            }
        }
    }

    /// Consume jobs until `shutdown` flips to true
    ///
    /// In-flight jobs are drained before returning.
    pub async fn run(
        self: Arc<Self>,
        queue: SharedJobQueue,
        options: RunOptions,
        mut shutdown: watch::Receiver<bool>,
    ) -> WorkerReport {
        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let mut tasks: JoinSet<JobStatus> = JoinSet::new();
        let mut report = WorkerReport::default();

        info!(concurrency = options.concurrency, "Worker started");

        while !*shutdown.borrow() {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            while let Some(finished) = tasks.try_join_next() {
                tally(&mut report, finished);
            }

            match queue.reserve(options.poll_timeout).await {
                Ok(Some(queued)) => {
                    let worker = Arc::clone(&self);
                    let queue = Arc::clone(&queue);
                    tasks.spawn(async move {
                        let _permit = permit;
                        worker.handle(queue.as_ref(), queued).await
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Failed to reserve job");
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(options.poll_timeout) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!(in_flight = tasks.len(), "Worker stopping, draining in-flight jobs");
        while let Some(finished) = tasks.join_next().await {
            tally(&mut report, finished);
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            quota_exceeded = report.quota_exceeded,
            listings = report.listings,
            "Worker stopped"
        );
        report
    }
}

fn tally(report: &mut WorkerReport, finished: Result<JobStatus, tokio::task::JoinError>) {
    match finished {
        Ok(JobStatus::Completed(listings)) => {
            report.completed += 1;
            report.listings += listings as u64;
        }
        Ok(JobStatus::Failed) => report.failed += 1,
        Ok(JobStatus::QuotaExceeded) => report.quota_exceeded += 1,
        Err(e) => {
            error!(error = %e, "Job task panicked");
            report.failed += 1;
        }
    }
}
