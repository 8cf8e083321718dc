//! Job-queue abstraction: a blocking FIFO of job ids plus key-value side
//! storage for job payloads and pending-cluster hints.
//!
//! Delivery is at-least-once; job effects are idempotent by design, so a
//! re-delivered job converges on the same terminal state.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use simdoc_core::model::{JobStatus, PendingClusterHint, SimilarityJob};

use crate::config::{AppConfig, QueueBackend};

/// Lifetime of a job payload in side storage.
pub const JOB_TTL: Duration = Duration::from_secs(3600);

/// Lifetime of a pending-cluster hint.
pub const HINT_TTL: Duration = Duration::from_secs(300);

/// Key prefix for job payloads.
pub const JOB_KEY_PREFIX: &str = "similarity_job:";

/// Key prefix for pending-cluster hints.
pub const HINT_KEY_PREFIX: &str = "cluster_pending:";

/// Queue failure.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue request failed: {0}")]
    Transport(String),
    #[error("queue payload is malformed: {0}")]
    Corrupt(String),
}

/// Counts returned by [`JobQueue::clear_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueClearStats {
    pub queue_entries_deleted: u64,
    pub jobs_deleted: u64,
    pub hints_deleted: u64,
}

/// Generates a queue id: `<prefix>_<utc %Y%m%d_%H%M%S>_<random6>`.
#[must_use]
pub fn new_queue_id(prefix: &str, now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", now.format("%Y%m%d_%H%M%S"), &random[..6])
}

/// The narrow queue interface consumed by the submitter and the worker.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> bool;

    /// Stores the job payload (with [`JOB_TTL`]) and pushes its id onto the
    /// FIFO.
    async fn enqueue_job(&self, job: &SimilarityJob) -> Result<(), QueueError>;

    /// Blocking pop with a bounded wait. `None` after `timeout` with no job
    /// is a normal loop iteration for the worker.
    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<String>, QueueError>;

    /// Fetches a job payload; expired or malformed payloads read as `None`.
    async fn get_job(&self, job_id: &str) -> Result<Option<SimilarityJob>, QueueError>;

    /// Updates a job's status, refreshing its TTL. Returns whether the
    /// payload still existed.
    async fn update_job_status(&self, job_id: &str, status: JobStatus)
        -> Result<bool, QueueError>;

    /// Writes the advisory pending-cluster hint (with [`HINT_TTL`]).
    async fn set_pending_hint(
        &self,
        article_id: &str,
        hint: &PendingClusterHint,
    ) -> Result<(), QueueError>;

    /// Reads the pending-cluster hint, if not expired.
    async fn get_pending_hint(
        &self,
        article_id: &str,
    ) -> Result<Option<PendingClusterHint>, QueueError>;

    /// Drops the pending-cluster hint. Clearing twice is a no-op.
    async fn clear_pending_hint(&self, article_id: &str) -> Result<bool, QueueError>;

    /// Current FIFO depth.
    async fn queue_len(&self) -> Result<u64, QueueError>;

    /// Drops expired job metadata; returns how many entries were removed.
    async fn sweep_expired(&self) -> Result<u64, QueueError>;

    /// Drops every queued id, job payload, and hint.
    async fn clear_all(&self) -> Result<QueueClearStats, QueueError>;
}

/// Builds the configured queue backend.
///
/// # Errors
///
/// Returns a [`QueueError`] when the backend connection cannot be
/// established.
pub async fn build_queue(config: &AppConfig) -> Result<Arc<dyn JobQueue>, QueueError> {
    match config.queue_backend {
        QueueBackend::Memory => Ok(Arc::new(memory::MemoryQueue::new())),
        QueueBackend::Redis => Ok(Arc::new(
            redis::RedisQueue::connect(&config.redis).await?,
        )),
    }
}
