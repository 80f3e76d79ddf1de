//! Redis list-based queue broker
//!
//! Layout per job type:
//!
//! ```text
//! {prefix}:{type}:queued     LPUSH on enqueue, BLMOVE to active on reserve
//! {prefix}:{type}:active     LREM on complete/fail, LMOVE back to queued on recovery
//! {prefix}:{type}:failed     LPUSH of {job, reason, failedAt}
//! {prefix}:{type}:completed  INCR counter
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use tracing::{error, warn};
use uuid::Uuid;

use super::{FailedJob, JobQueue, QueueResult, QueueStats, QueuedJob};
use crate::models::Job;

/// Shortest wait passed to BLMOVE; zero would block forever
const MIN_BLOCK_SECS: f64 = 0.01;

/// Queue broker backed by Redis lists
pub struct RedisQueue {
    pool: Pool,
    queued_key: String,
    active_key: String,
    failed_key: String,
    completed_key: String,
}

impl RedisQueue {
    /// Create a broker for the harvester's job type
    pub fn new(pool: Pool, key_prefix: &str) -> Self {
        let base = format!("{key_prefix}:{}", Job::TYPE);
        Self {
            pool,
            queued_key: format!("{base}:queued"),
            active_key: format!("{base}:active"),
            failed_key: format!("{base}:failed"),
            completed_key: format!("{base}:completed"),
        }
    }

    fn decode(&self, payload: String) -> QueueResult<QueuedJob> {
        let mut job: QueuedJob = serde_json::from_str(&payload)?;
        job.receipt = payload;
        Ok(job)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<Uuid> {
        let queued = QueuedJob::new(job.clone());
        let payload = serde_json::to_string(&queued)?;

        let mut conn = self.pool.get().await?;
        let _: () = conn.lpush(&self.queued_key, payload).await?;
        Ok(queued.id)
    }

    async fn reserve(&self, wait: Duration) -> QueueResult<Option<QueuedJob>> {
        let mut conn = self.pool.get().await?;
        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.queued_key)
            .arg(&self.active_key)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64().max(MIN_BLOCK_SECS))
            .query_async(&mut *conn)
            .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match self.decode(payload.clone()) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                // Unreadable payloads would otherwise sit in active forever
                error!(payload = %payload, error = %e, "Dropping undecodable job");
                let _: i64 = conn.lrem(&self.active_key, 1, &payload).await?;
                Err(e)
            }
        }
    }

    async fn complete(&self, job: &QueuedJob) -> QueueResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = redis::pipe()
            .atomic()
            .lrem(&self.active_key, 1, &job.receipt)
            .ignore()
            .incr(&self.completed_key, 1)
            .ignore()
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn fail(&self, job: &QueuedJob, reason: &str) -> QueueResult<()> {
        let record = serde_json::to_string(&FailedJob {
            job: job.clone(),
            reason: reason.to_string(),
            failed_at: Utc::now(),
        })?;

        let mut conn = self.pool.get().await?;
        let _: () = redis::pipe()
            .atomic()
            .lrem(&self.active_key, 1, &job.receipt)
            .ignore()
            .lpush(&self.failed_key, record)
            .ignore()
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn recover_active(&self) -> QueueResult<u64> {
        let mut conn = self.pool.get().await?;
        let mut recovered = 0u64;

        // Newest leaves active first and lands on the reserve end, so the
        // oldest stranded job ends up next in line
        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&self.active_key)
                .arg(&self.queued_key)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut *conn)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            warn!(recovered = recovered, "Requeued jobs left active by a previous worker");
        }
        Ok(recovered)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let mut conn = self.pool.get().await?;
        let (queued, active, failed, completed): (u64, u64, u64, Option<u64>) = redis::pipe()
            .llen(&self.queued_key)
            .llen(&self.active_key)
            .llen(&self.failed_key)
            .get(&self.completed_key)
            .query_async(&mut *conn)
            .await?;

        Ok(QueueStats {
            queued,
            active,
            completed: completed.unwrap_or(0),
            failed,
        })
    }

    async fn failures(&self, limit: usize) -> QueueResult<Vec<FailedJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.get().await?;
        let stop = isize::try_from(limit).unwrap_or(isize::MAX) - 1;
        let records: Vec<String> = conn.lrange(&self.failed_key, 0, stop).await?;

        records
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(Into::into))
            .collect()
    }
}
