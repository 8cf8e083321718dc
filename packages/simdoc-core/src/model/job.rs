//! Re-score job payloads and the pending-cluster hint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing state of a queued re-score job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Wire spelling of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Candidate snapshot captured at submission time.
///
/// The shingles are a snapshot and may be stale or absent; the worker falls
/// back to the stored article when re-scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCandidate {
    pub article_id: String,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub shingles: Vec<String>,
    #[serde(default)]
    pub simhash: Option<String>,
}

/// A queued re-score job: the submitted article's shingles plus the LSH
/// candidates found at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityJob {
    pub job_id: String,
    pub article_id: String,
    pub shingles: Vec<String>,
    pub candidates: Vec<JobCandidate>,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SimilarityJob {
    /// Creates a fresh `pending` job.
    #[must_use]
    pub fn new(
        job_id: String,
        article_id: String,
        shingles: Vec<String>,
        candidates: Vec<JobCandidate>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            article_id,
            shingles,
            candidates,
            created_at: now,
            status: JobStatus::Pending,
            updated_at: None,
        }
    }
}

/// Advisory guess written by the submitter while a re-score is in flight.
///
/// Expires on its own (5-minute TTL in the queue's side storage) and is
/// cleared by the worker on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingClusterHint {
    pub cluster_id: Option<String>,
    pub eta_ms: u64,
    pub timestamp: DateTime<Utc>,
}
