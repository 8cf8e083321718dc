//! In-memory [`JobQueue`] for development and tests.
//!
//! A mutex-guarded FIFO with a [`Notify`] wakeup for blocked consumers, and
//! [`DashMap`] side tables whose entries expire by deadline -- read paths
//! treat expired entries as absent, and [`sweep_expired`] reclaims them.
//!
//! [`sweep_expired`]: JobQueue::sweep_expired

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use simdoc_core::model::{JobStatus, PendingClusterHint, SimilarityJob};

use super::{
    JobQueue, QueueClearStats, QueueError, HINT_TTL, JOB_TTL,
};

/// A side-table entry with an absolute expiry deadline.
#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    deadline: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            deadline: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// In-process queue backend.
#[derive(Default)]
pub struct MemoryQueue {
    fifo: Mutex<VecDeque<String>>,
    notify: Notify,
    jobs: DashMap<String, Expiring<SimilarityJob>>,
    hints: DashMap<String, Expiring<PendingClusterHint>>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn pop(&self) -> Option<String> {
        self.fifo.lock().pop_front()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn ping(&self) -> bool {
        true
    }

    async fn enqueue_job(&self, job: &SimilarityJob) -> Result<(), QueueError> {
        self.jobs
            .insert(job.job_id.clone(), Expiring::new(job.clone(), JOB_TTL));
        self.fifo.lock().push_back(job.job_id.clone());
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<String>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job_id) = self.pop() {
                return Ok(Some(job_id));
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before the second check so a push between
            // the check and the await still wakes us.
            notified.as_mut().enable();
            if let Some(job_id) = self.pop() {
                return Ok(Some(job_id));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<SimilarityJob>, QueueError> {
        match self.jobs.get(job_id) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                drop(self.jobs.remove(job_id));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
    ) -> Result<bool, QueueError> {
        match self.jobs.get_mut(job_id) {
            Some(mut entry) if !entry.is_expired() => {
                entry.value.status = status;
                entry.value.updated_at = Some(Utc::now());
                entry.deadline = Instant::now() + JOB_TTL;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_pending_hint(
        &self,
        article_id: &str,
        hint: &PendingClusterHint,
    ) -> Result<(), QueueError> {
        self.hints
            .insert(article_id.to_string(), Expiring::new(hint.clone(), HINT_TTL));
        Ok(())
    }

    async fn get_pending_hint(
        &self,
        article_id: &str,
    ) -> Result<Option<PendingClusterHint>, QueueError> {
        match self.hints.get(article_id) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                drop(self.hints.remove(article_id));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn clear_pending_hint(&self, article_id: &str) -> Result<bool, QueueError> {
        Ok(self.hints.remove(article_id).is_some())
    }

    async fn queue_len(&self) -> Result<u64, QueueError> {
        Ok(self.fifo.lock().len() as u64)
    }

    async fn sweep_expired(&self) -> Result<u64, QueueError> {
        let mut removed = 0;
        let expired_jobs: Vec<String> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        for key in expired_jobs {
            if self.jobs.remove(&key).is_some() {
                removed += 1;
            }
        }
        let expired_hints: Vec<String> = self
            .hints
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        for key in expired_hints {
            if self.hints.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear_all(&self) -> Result<QueueClearStats, QueueError> {
        let queue_entries_deleted = {
            let mut fifo = self.fifo.lock();
            let len = fifo.len() as u64;
            fifo.clear();
            len
        };
        let jobs_deleted = self.jobs.len() as u64;
        self.jobs.clear();
        let hints_deleted = self.hints.len() as u64;
        self.hints.clear();
        Ok(QueueClearStats {
            queue_entries_deleted,
            jobs_deleted,
            hints_deleted,
        })
    }
}
