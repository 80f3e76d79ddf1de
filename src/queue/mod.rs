//! Job queue broker
//!
//! The scheduler pushes [`Job`]s, workers reserve them, and every reserved
//! job ends up either completed or failed with a reason. Delivery is
//! at-least-once: a worker that dies between reserve and acknowledge leaves
//! its job in the active list, and [`JobQueue::recover_active`] puts it back
//! in front of the queue when the next worker starts.

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Job;

pub use memory::InMemoryQueue;
pub use self::redis::RedisQueue;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue broker errors
#[derive(Debug, Error)]
pub enum QueueError {
    /// Redis command failure
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Could not obtain a pooled connection
    #[error("connection error: {0}")]
    Connection(String),

    /// Payload could not be encoded or decoded
    #[error("message parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Acknowledged job is not active
    #[error("job {0} is not active")]
    NotActive(Uuid),
}

impl QueueError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            Self::Connection(_) => true,
            Self::Parse(_) | Self::NotActive(_) => false,
        }
    }
}

impl From<deadpool_redis::PoolError> for QueueError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Envelope around a job while it lives in the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub id: Uuid,
    pub job_type: String,
    pub job: Job,
    pub enqueued_at: DateTime<Utc>,

    /// Exact stored payload, needed to remove the entry from Redis lists
    #[serde(skip)]
    pub(crate) receipt: String,
}

impl QueuedJob {
    /// Wrap a job in a fresh envelope
    pub fn new(job: Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: Job::TYPE.to_string(),
            job,
            enqueued_at: Utc::now(),
            receipt: String::new(),
        }
    }
}

/// A job that ended in failure, kept for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJob {
    pub job: QueuedJob,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Counts per lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Queue broker operations
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job, returning its envelope id
    async fn enqueue(&self, job: &Job) -> QueueResult<Uuid>;

    /// Take the next job, waiting up to `wait` for one to arrive
    async fn reserve(&self, wait: Duration) -> QueueResult<Option<QueuedJob>>;

    /// Acknowledge successful processing
    async fn complete(&self, job: &QueuedJob) -> QueueResult<()>;

    /// Record a failure; the job is not retried
    async fn fail(&self, job: &QueuedJob, reason: &str) -> QueueResult<()>;

    /// Move every unacknowledged active job back to the head of the queue,
    /// oldest first. Returns how many jobs were requeued.
    ///
    /// Only safe while no other worker is consuming; a job still being
    /// processed elsewhere would be delivered twice.
    async fn recover_active(&self) -> QueueResult<u64>;

    /// Counts per lifecycle state
    async fn stats(&self) -> QueueResult<QueueStats>;

    /// Most recent failures, newest first
    async fn failures(&self, limit: usize) -> QueueResult<Vec<FailedJob>>;
}

/// Thread-safe shared queue
pub type SharedJobQueue = Arc<dyn JobQueue>;
