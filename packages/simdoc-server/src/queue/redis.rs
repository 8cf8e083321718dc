//! Redis [`JobQueue`] adapter: LPUSH/BRPOP list plus SETEX side storage.
//!
//! Workers should hold their own `RedisQueue` (and thus their own
//! connection): BRPOP parks the connection for the duration of the wait,
//! and sharing it with the submitter would stall synchronous submissions.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::warn;

use simdoc_core::model::{JobStatus, PendingClusterHint, SimilarityJob};

use super::{
    JobQueue, QueueClearStats, QueueError, HINT_KEY_PREFIX, HINT_TTL, JOB_KEY_PREFIX, JOB_TTL,
};
use crate::config::RedisConfig;

/// Redis-backed queue.
pub struct RedisQueue {
    manager: ConnectionManager,
    queue_name: String,
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Transport(err.to_string())
    }
}

fn job_key(job_id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}")
}

fn hint_key(article_id: &str) -> String {
    format!("{HINT_KEY_PREFIX}{article_id}")
}

impl RedisQueue {
    /// Connects to the configured Redis instance.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] when the connection cannot be
    /// established.
    pub async fn connect(config: &RedisConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url())?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            queue_name: config.queue_name.clone(),
        })
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, QueueError> {
        let mut conn = self.manager.clone();
        let mut keys = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<u64, QueueError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let deleted: u64 = conn.del(keys).await?;
        Ok(deleted)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn ping(&self) -> bool {
        let mut conn = self.manager.clone();
        matches!(
            redis::cmd("PING").query_async::<_, String>(&mut conn).await,
            Ok(ref pong) if pong == "PONG"
        )
    }

    async fn enqueue_job(&self, job: &SimilarityJob) -> Result<(), QueueError> {
        let payload =
            serde_json::to_string(job).map_err(|err| QueueError::Corrupt(err.to_string()))?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(job_key(&job.job_id), payload, JOB_TTL.as_secs())
            .await?;
        conn.lpush::<_, _, ()>(&self.queue_name, &job.job_id).await?;
        Ok(())
    }

    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<String>, QueueError> {
        let mut conn = self.manager.clone();
        if timeout.is_zero() {
            // BRPOP with 0 blocks forever; a zero timeout means "poll".
            let popped: Option<String> = conn.rpop(&self.queue_name, None).await?;
            return Ok(popped);
        }
        let popped: Option<(String, String)> = conn
            .brpop(&self.queue_name, timeout.as_secs_f64())
            .await?;
        Ok(popped.map(|(_, job_id)| job_id))
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<SimilarityJob>, QueueError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(job_key(job_id)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(job) => Ok(Some(job)),
            Err(err) => {
                warn!(job_id, error = %err, "dropping malformed job payload");
                Ok(None)
            }
        }
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
    ) -> Result<bool, QueueError> {
        let Some(mut job) = self.get_job(job_id).await? else {
            return Ok(false);
        };
        job.status = status;
        job.updated_at = Some(chrono::Utc::now());
        let payload =
            serde_json::to_string(&job).map_err(|err| QueueError::Corrupt(err.to_string()))?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(job_key(job_id), payload, JOB_TTL.as_secs())
            .await?;
        Ok(true)
    }

    async fn set_pending_hint(
        &self,
        article_id: &str,
        hint: &PendingClusterHint,
    ) -> Result<(), QueueError> {
        let payload =
            serde_json::to_string(hint).map_err(|err| QueueError::Corrupt(err.to_string()))?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(hint_key(article_id), payload, HINT_TTL.as_secs())
            .await?;
        Ok(())
    }

    async fn get_pending_hint(
        &self,
        article_id: &str,
    ) -> Result<Option<PendingClusterHint>, QueueError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(hint_key(article_id)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(hint) => Ok(Some(hint)),
            Err(err) => {
                warn!(article_id, error = %err, "dropping malformed pending hint");
                Ok(None)
            }
        }
    }

    async fn clear_pending_hint(&self, article_id: &str) -> Result<bool, QueueError> {
        let mut conn = self.manager.clone();
        let deleted: u64 = conn.del(hint_key(article_id)).await?;
        Ok(deleted > 0)
    }

    async fn queue_len(&self) -> Result<u64, QueueError> {
        let mut conn = self.manager.clone();
        let len: u64 = conn.llen(&self.queue_name).await?;
        Ok(len)
    }

    async fn sweep_expired(&self) -> Result<u64, QueueError> {
        // Expiry is native here (SETEX); nothing to reclaim by hand.
        Ok(0)
    }

    async fn clear_all(&self) -> Result<QueueClearStats, QueueError> {
        let mut conn = self.manager.clone();
        let queue_entries_deleted: u64 = conn.del(&self.queue_name).await?;

        let job_keys = self.scan_keys(&format!("{JOB_KEY_PREFIX}*")).await?;
        let jobs_deleted = self.delete_keys(&job_keys).await?;

        let hint_keys = self.scan_keys(&format!("{HINT_KEY_PREFIX}*")).await?;
        let hints_deleted = self.delete_keys(&hint_keys).await?;

        Ok(QueueClearStats {
            queue_entries_deleted,
            jobs_deleted,
            hints_deleted,
        })
    }
}
