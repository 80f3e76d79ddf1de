//! In-process queue broker for tests and single-process runs

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use super::{FailedJob, JobQueue, QueueError, QueueResult, QueueStats, QueuedJob};
use crate::models::Job;

#[derive(Default)]
struct State {
    queued: VecDeque<QueuedJob>,
    active: HashMap<Uuid, QueuedJob>,
    failed: Vec<FailedJob>,
    completed: u64,
}

/// FIFO queue held in memory
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs waiting to be reserved, in order
    pub async fn queued_jobs(&self) -> Vec<QueuedJob> {
        self.state.lock().await.queued.iter().cloned().collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<Uuid> {
        let queued = QueuedJob::new(job.clone());
        let id = queued.id;

        self.state.lock().await.queued.push_back(queued);
        self.notify.notify_one();
        Ok(id)
    }

    async fn reserve(&self, wait: Duration) -> QueueResult<Option<QueuedJob>> {
        let deadline = Instant::now() + wait;

        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(job) = state.queued.pop_front() {
                    state.active.insert(job.id, job.clone());
                    return Ok(Some(job));
                }
            }

            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn complete(&self, job: &QueuedJob) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state
            .active
            .remove(&job.id)
            .ok_or(QueueError::NotActive(job.id))?;
        state.completed += 1;
        Ok(())
    }

    async fn fail(&self, job: &QueuedJob, reason: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let job = state
            .active
            .remove(&job.id)
            .ok_or(QueueError::NotActive(job.id))?;
        state.failed.push(FailedJob {
            job,
            reason: reason.to_string(),
            failed_at: Utc::now(),
        });
        Ok(())
    }

    async fn recover_active(&self) -> QueueResult<u64> {
        let mut state = self.state.lock().await;
        let mut stranded: Vec<QueuedJob> = state.active.drain().map(|(_, job)| job).collect();
        stranded.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));

        let recovered = stranded.len() as u64;
        for job in stranded {
            state.queued.push_front(job);
            self.notify.notify_one();
        }
        Ok(recovered)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let state = self.state.lock().await;
        Ok(QueueStats {
            queued: state.queued.len() as u64,
            active: state.active.len() as u64,
            completed: state.completed,
            failed: state.failed.len() as u64,
        })
    }

    async fn failures(&self, limit: usize) -> QueueResult<Vec<FailedJob>> {
        let state = self.state.lock().await;
        Ok(state.failed.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn job(category: &str) -> Job {
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Job::new("EBAY-US", category, "Test", end)
    }

    #[tokio::test]
    async fn test_fifo_lifecycle() {
        let queue = InMemoryQueue::new();
        queue.enqueue(&job("1")).await.unwrap();
        queue.enqueue(&job("2")).await.unwrap();

        let first = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.job.category_id, "1");
        assert_eq!(second.job.category_id, "2");

        queue.complete(&first).await.unwrap();
        queue.fail(&second, "boom").await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(
            stats,
            QueueStats {
                queued: 0,
                active: 0,
                completed: 1,
                failed: 1
            }
        );

        let failures = queue.failures(10).await.unwrap();
        assert_eq!(failures[0].reason, "boom");
        assert_eq!(failures[0].job.id, second.id);
    }

    #[tokio::test]
    async fn test_reserve_times_out_when_empty() {
        let queue = InMemoryQueue::new();
        let reserved = queue.reserve(Duration::from_millis(20)).await.unwrap();
        assert!(reserved.is_none());
    }

    #[tokio::test]
    async fn test_reserve_wakes_on_enqueue() {
        let queue = Arc::new(InMemoryQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.reserve(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(&job("7")).await.unwrap();

        let reserved = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(reserved.job.category_id, "7");
    }

    #[tokio::test]
    async fn test_unacknowledged_job_is_recovered() {
        let queue = InMemoryQueue::new();
        queue.enqueue(&job("1")).await.unwrap();
        queue.enqueue(&job("2")).await.unwrap();

        // Worker takes a job and dies without acknowledging it
        let stranded = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(queue.stats().await.unwrap().active, 1);

        assert_eq!(queue.recover_active().await.unwrap(), 1);
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 2);

        let again = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again.id, stranded.id);
        assert_eq!(again.job.category_id, "1");
        queue.complete(&again).await.unwrap();

        assert_eq!(queue.recover_active().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_double_ack_rejected() {
        let queue = InMemoryQueue::new();
        queue.enqueue(&job("1")).await.unwrap();
        let reserved = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();

        queue.complete(&reserved).await.unwrap();
        assert!(matches!(
            queue.complete(&reserved).await,
            Err(QueueError::NotActive(_))
        ));
    }
}
