//! Prometheus metrics for the harvester
//!
//! This module provides metrics tracking for:
//! - Category store: tree syncs per site and outcome
//! - Scheduler: jobs enqueued and enqueue failures, planned requests
//! - Worker: jobs processed, listings stored, actual requests, job duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for every harvester metric
struct HarvesterMetrics {
    category_syncs: CounterVec,
    jobs_enqueued: CounterVec,
    enqueue_failures: CounterVec,
    jobs_processed: CounterVec,
    listings_stored: CounterVec,
    quota_planned: Gauge,
    quota_actual: Gauge,
    job_duration: HistogramVec,
}

/// Global storage for harvester metrics
static HARVESTER_METRICS: OnceLock<HarvesterMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = harvester::metrics::init_metrics() {
///     tracing::warn!(error = %e, "Metrics initialization failed");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = HarvesterMetrics {
        category_syncs: register_counter_vec!(
            "harvester_category_syncs_total",
            "Category tree syncs by site and outcome",
            &["site", "outcome"]
        )?,
        jobs_enqueued: register_counter_vec!(
            "harvester_jobs_enqueued_total",
            "Jobs enqueued by the scheduler per site",
            &["site"]
        )?,
        enqueue_failures: register_counter_vec!(
            "harvester_enqueue_failures_total",
            "Jobs the scheduler failed to enqueue per site",
            &["site"]
        )?,
        jobs_processed: register_counter_vec!(
            "harvester_jobs_processed_total",
            "Jobs processed by workers per site and status",
            &["site", "status"]
        )?,
        listings_stored: register_counter_vec!(
            "harvester_listings_stored_total",
            "Listings upserted per site",
            &["site"]
        )?,
        quota_planned: register_gauge!(
            "harvester_quota_planned_requests",
            "Requests planned for the current quota day"
        )?,
        quota_actual: register_gauge!(
            "harvester_quota_actual_requests",
            "Requests issued during the current quota day"
        )?,
        job_duration: register_histogram_vec!(
            "harvester_job_duration_seconds",
            "Time spent processing a job in seconds",
            &["site"],
            vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
    };

    HARVESTER_METRICS
        .set(metrics)
        .map_err(|_| "Harvester metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    HARVESTER_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a category sync outcome (`updated`, `up_to_date`, `failed`)
pub fn record_category_sync(site: &str, outcome: &str) {
    if let Some(m) = HARVESTER_METRICS.get() {
        m.category_syncs.with_label_values(&[site, outcome]).inc();
    }
}

/// Record the result of enqueueing one job
pub fn record_enqueue(site: &str, success: bool) {
    let Some(m) = HARVESTER_METRICS.get() else {
        return;
    };

    if success {
        m.jobs_enqueued.with_label_values(&[site]).inc();
    } else {
        m.enqueue_failures.with_label_values(&[site]).inc();
    }
}

/// Record a processed job and the listings it stored
pub fn record_job_processed(site: &str, status: &str, listings: usize) {
    let Some(m) = HARVESTER_METRICS.get() else {
        return;
    };

    m.jobs_processed.with_label_values(&[site, status]).inc();

    if listings > 0 {
        m.listings_stored
            .with_label_values(&[site])
            .inc_by(listings as f64);
    }
}

/// Update the planned-requests gauge
pub fn set_quota_planned(planned: u64) {
    if let Some(m) = HARVESTER_METRICS.get() {
        m.quota_planned.set(planned as f64);
    }
}

/// Update the actual-requests gauge
pub fn set_quota_actual(actual: u64) {
    if let Some(m) = HARVESTER_METRICS.get() {
        m.quota_actual.set(actual as f64);
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a job timer (returns a timer handle)
pub fn start_job_timer(site: &str) -> MetricsTimer {
    match HARVESTER_METRICS.get() {
        Some(m) => MetricsTimer::new(m.job_duration.with_label_values(&[site]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
