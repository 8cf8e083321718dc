//! Data model: persisted documents, queue payloads, and wire envelopes.
//!
//! Documents are tagged data with explicit optional fields; adapters
//! serialize `null` rather than omitting, so a patched `cluster_id` of
//! `None` really clears the stored value.

pub mod api;
pub mod article;
pub mod cluster;
pub mod job;

pub use api::{
    ArticleCreate, ArticleResponse, ClusterListingItem, ClusterListingResponse, ClusterResponse,
    ErrorDetail, ErrorResponse, HealthCheckResponse, HealthComponents, HealthStatus,
    RecheckRequest, RecheckResponse, SimilarArticleEntry, SimilarArticlesResponse,
    ValidationError, MAX_CONTENT_CHARS, MAX_RECHECK_BATCH,
};
pub use article::{Article, ArticleDoc, ArticleTag, ArticleTopic, ClusterStatus};
pub use cluster::{Cluster, ClusterDoc, TopTerm};
pub use job::{JobCandidate, JobStatus, PendingClusterHint, SimilarityJob};
