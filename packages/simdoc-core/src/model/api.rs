//! Wire envelopes for the HTTP surface and their validation rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::article::{Article, ArticleTag, ArticleTopic};
use super::cluster::Cluster;

/// Maximum accepted content length, in characters (not bytes).
pub const MAX_CONTENT_CHARS: usize = 200_000;

/// Maximum number of article ids accepted by one recheck request.
pub const MAX_RECHECK_BATCH: usize = 100;

/// Prefix every cluster id carries.
pub const CLUSTER_ID_PREFIX: &str = "cluster_";

/// Rejected request payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("article_id must be a non-empty string")]
    BlankArticleId,
    #[error("article content exceeds maximum length of {MAX_CONTENT_CHARS} characters")]
    ContentTooLong,
    #[error("state must be between 0 and 2")]
    StateOutOfRange,
    #[error("top must be 0 or 1")]
    TopOutOfRange,
    #[error("article_ids must contain between 1 and {MAX_RECHECK_BATCH} entries")]
    RecheckBatchSize,
}

/// Returns whether `article_id` is acceptable: non-blank after trimming.
#[must_use]
pub fn is_valid_article_id(article_id: &str) -> bool {
    !article_id.trim().is_empty()
}

/// Returns whether `cluster_id` has the stable `cluster_<article_id>` shape.
#[must_use]
pub fn is_valid_cluster_id(cluster_id: &str) -> bool {
    cluster_id.len() > CLUSTER_ID_PREFIX.len() && cluster_id.starts_with(CLUSTER_ID_PREFIX)
}

/// Submission payload for `POST /articles/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ArticleCreate {
    pub article_id: String,
    pub title: String,
    pub content: String,
    pub publish_time: DateTime<Utc>,
    pub source: String,
    pub state: u8,
    pub top: u8,
    #[serde(default)]
    pub tags: Vec<ArticleTag>,
    #[serde(default)]
    pub topic: Vec<ArticleTopic>,
}

impl ArticleCreate {
    /// Validates the payload against the admission rules.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`ValidationError`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_article_id(&self.article_id) {
            return Err(ValidationError::BlankArticleId);
        }
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(ValidationError::ContentTooLong);
        }
        if self.state > 2 {
            return Err(ValidationError::StateOutOfRange);
        }
        if self.top > 1 {
            return Err(ValidationError::TopOutOfRange);
        }
        Ok(())
    }
}

fn default_recheck_reason() -> String {
    "manual_review".to_string()
}

/// Payload for `POST /articles/recheck`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecheckRequest {
    pub article_ids: Vec<String>,
    #[serde(default = "default_recheck_reason")]
    pub reason: String,
}

impl RecheckRequest {
    /// Validates batch size and id shape.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`ValidationError`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.article_ids.is_empty() || self.article_ids.len() > MAX_RECHECK_BATCH {
            return Err(ValidationError::RecheckBatchSize);
        }
        if self.article_ids.iter().any(|id| !is_valid_article_id(id)) {
            return Err(ValidationError::BlankArticleId);
        }
        Ok(())
    }
}

/// `GET /articles/{id}` response: the article plus its cluster, inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ArticleResponse {
    pub article: Article,
    pub cluster: Option<Cluster>,
    pub trace_id: String,
}

/// One peer in a `GET /articles/{id}/similar` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SimilarArticleEntry {
    pub article_id: String,
    pub title: String,
    pub similarity_score: f64,
}

/// `GET /articles/{id}/similar` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SimilarArticlesResponse {
    pub cluster_id: String,
    pub articles: Vec<SimilarArticleEntry>,
    pub trace_id: String,
}

/// `GET /clusters/{id}` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClusterResponse {
    pub cluster: Cluster,
    pub articles: Option<Vec<Article>>,
    pub trace_id: String,
}

/// `POST /articles/recheck` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecheckResponse {
    pub accepted: bool,
    pub job_id: String,
    pub trace_id: String,
}

/// One row of the `GET /clusters/` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClusterListingItem {
    pub article_id: String,
    pub similar_article_ids: Vec<String>,
}

/// `GET /clusters/` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClusterListingResponse {
    pub items: Vec<ClusterListingItem>,
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: u64,
}

/// Overall health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Pass,
    Warn,
    Fail,
}

/// Per-component health verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthComponents {
    pub elasticsearch: HealthStatus,
    pub redis: HealthStatus,
    pub worker: HealthStatus,
}

/// `GET /system/health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub components: HealthComponents,
    pub timestamp: DateTime<Utc>,
}

/// The `error` object of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Error envelope shared by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub trace_id: String,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn create() -> ArticleCreate {
        ArticleCreate {
            article_id: "a1".to_string(),
            title: "Fire".to_string(),
            content: "Fire in Tai Po".to_string(),
            publish_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            source: "wire".to_string(),
            state: 1,
            top: 0,
            tags: vec![],
            topic: vec![],
        }
    }

    #[test]
    fn valid_submission_passes() {
        assert!(create().validate().is_ok());
    }

    #[test]
    fn blank_article_id_rejected() {
        let mut payload = create();
        payload.article_id = "   ".to_string();
        assert_eq!(payload.validate(), Err(ValidationError::BlankArticleId));
    }

    #[test]
    fn content_boundary_is_inclusive() {
        let mut payload = create();
        payload.content = "x".repeat(MAX_CONTENT_CHARS);
        assert!(payload.validate().is_ok());

        payload.content.push('x');
        assert_eq!(payload.validate(), Err(ValidationError::ContentTooLong));
    }

    #[test]
    fn content_limit_counts_characters_not_bytes() {
        let mut payload = create();
        // 200,000 three-byte chars: 600,000 bytes but exactly at the limit.
        payload.content = "火".repeat(MAX_CONTENT_CHARS);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn state_and_top_ranges_enforced() {
        let mut payload = create();
        payload.state = 3;
        assert_eq!(payload.validate(), Err(ValidationError::StateOutOfRange));

        let mut payload = create();
        payload.top = 2;
        assert_eq!(payload.validate(), Err(ValidationError::TopOutOfRange));
    }

    #[test]
    fn recheck_batch_bounds() {
        let request = RecheckRequest {
            article_ids: vec![],
            reason: default_recheck_reason(),
        };
        assert_eq!(request.validate(), Err(ValidationError::RecheckBatchSize));

        let request = RecheckRequest {
            article_ids: (0..=MAX_RECHECK_BATCH).map(|i| format!("a{i}")).collect(),
            reason: default_recheck_reason(),
        };
        assert_eq!(request.validate(), Err(ValidationError::RecheckBatchSize));

        let request = RecheckRequest {
            article_ids: (0..MAX_RECHECK_BATCH).map(|i| format!("a{i}")).collect(),
            reason: default_recheck_reason(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn recheck_reason_defaults() {
        let parsed: RecheckRequest = serde_json::from_str(r#"{"article_ids":["a1"]}"#).unwrap();
        assert_eq!(parsed.reason, "manual_review");
    }

    #[test]
    fn cluster_id_shape() {
        assert!(is_valid_cluster_id("cluster_a1"));
        assert!(!is_valid_cluster_id("cluster_"));
        assert!(!is_valid_cluster_id("a1"));
        assert!(!is_valid_cluster_id(""));
    }

    #[test]
    fn error_envelope_shape() {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: "ARTICLE_NOT_FOUND".to_string(),
                message: "Article not found: a9".to_string(),
            },
            trace_id: "t-1".to_string(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["error"]["code"], "ARTICLE_NOT_FOUND");
        assert_eq!(value["trace_id"], "t-1");
    }
}
