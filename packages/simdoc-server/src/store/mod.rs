//! Document-store abstraction: the narrow interface the clustering engine
//! needs from its key/term-indexed backend.
//!
//! Two backends implement [`DocumentStore`]: [`memory::MemoryStore`] for
//! development and tests, and [`elastic::ElasticStore`] for production.
//! Both provide synchronous-refresh semantics -- every write is visible to
//! the next read -- which the exact-duplicate fast path relies on.

pub mod elastic;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

use simdoc_core::model::api::ArticleCreate;
use simdoc_core::model::{ArticleDoc, ArticleTag, ArticleTopic, ClusterDoc, ClusterStatus};

use crate::config::{AppConfig, StoreBackend};

/// LSH candidate queries use at most this many leading bands of the
/// signature, regardless of the configured band count.
pub const LSH_QUERY_BANDS: usize = 20;

/// Default result cap for MinHash candidate queries.
pub const MINHASH_CANDIDATE_LIMIT: usize = 50;

/// Default result cap when expanding a cluster's articles.
pub const CLUSTER_FETCH_LIMIT: usize = 100;

/// Document-store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store request failed: {0}")]
    Transport(String),
    #[error("document store rejected the request: status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("stored document is malformed: {0}")]
    Corrupt(String),
}

/// Field a metadata search can sort on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    PublishTime,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// The document field name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PublishTime => "publish_time",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// The wire spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A `field:order` sort specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::PublishTime,
            order: SortOrder::Desc,
        }
    }
}

/// A sort parameter that is not `field:asc|desc` over a sortable field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sort parameter {0:?}: expected publish_time|created_at|updated_at:asc|desc")]
pub struct SortSpecError(pub String);

impl FromStr for SortSpec {
    type Err = SortSpecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (field, order) = value
            .split_once(':')
            .ok_or_else(|| SortSpecError(value.to_string()))?;
        let field = match field {
            "publish_time" => SortField::PublishTime,
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            _ => return Err(SortSpecError(value.to_string())),
        };
        let order = match order {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            _ => return Err(SortSpecError(value.to_string())),
        };
        Ok(Self { field, order })
    }
}

/// Metadata filter set for the clusters listing.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
    pub sort: SortSpec,
    pub state: Option<u8>,
    pub top: Option<u8>,
    /// Title keywords; every whitespace-separated token must match.
    pub title: Option<String>,
    pub source: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub tag_id: Option<String>,
    pub topic_ids: Vec<String>,
}

/// One page of search results with the total hit count.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub items: Vec<ArticleDoc>,
    pub total: u64,
}

/// Partial update to an article document.
///
/// Each variant updates a fixed field set; fields carrying `Option` write
/// explicit nulls. This replaces free-form JSON patching with tagged data
/// the adapters can translate faithfully.
#[derive(Debug, Clone, PartialEq)]
pub enum ArticlePatch {
    /// Mutable metadata refresh on idempotent re-submission.
    Meta(MetaPatch),
    /// Clustering-state transition (fast path, worker write-back, recheck
    /// reset).
    Clustering(ClusteringPatch),
    /// Re-extracted features during a recheck.
    Features(FeaturePatch),
    /// Cluster-merge re-pointing; leaves status and score untouched.
    Repoint {
        cluster_id: String,
        updated_at: DateTime<Utc>,
    },
}

/// Fields refreshed when an existing article is re-submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaPatch {
    pub title: String,
    pub content: String,
    pub publish_time: DateTime<Utc>,
    pub source: String,
    pub state: u8,
    pub top: u8,
    pub tags: Vec<ArticleTag>,
    pub topic: Vec<ArticleTopic>,
    pub tag_ids: Vec<String>,
    pub topic_ids: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl MetaPatch {
    /// Builds the patch from a submission payload.
    #[must_use]
    pub fn from_create(payload: &ArticleCreate, now: DateTime<Utc>) -> Self {
        Self {
            title: payload.title.clone(),
            content: payload.content.clone(),
            publish_time: payload.publish_time,
            source: payload.source.clone(),
            state: payload.state,
            top: payload.top,
            tags: payload.tags.clone(),
            topic: payload.topic.clone(),
            tag_ids: payload.tags.iter().map(|tag| tag.id.to_string()).collect(),
            topic_ids: payload.topic.iter().map(|topic| topic.id.clone()).collect(),
            updated_at: now,
        }
    }
}

/// Clustering-state transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringPatch {
    pub cluster_status: ClusterStatus,
    pub cluster_id: Option<String>,
    pub similarity_score: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Re-extracted feature set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeaturePatch {
    pub simhash: String,
    pub minhash_signature: Vec<String>,
    pub shingles: Vec<String>,
}

impl ArticlePatch {
    /// The partial document this patch writes, as JSON.
    ///
    /// Used verbatim by the Elasticsearch adapter; the in-memory store
    /// applies the same field set natively via [`apply`](Self::apply).
    #[must_use]
    pub fn to_doc(&self) -> Value {
        match self {
            Self::Meta(meta) => serde_json::to_value(meta).unwrap_or(Value::Null),
            Self::Clustering(clustering) => {
                serde_json::to_value(clustering).unwrap_or(Value::Null)
            }
            Self::Features(features) => serde_json::to_value(features).unwrap_or(Value::Null),
            Self::Repoint {
                cluster_id,
                updated_at,
            } => json!({
                "cluster_id": cluster_id,
                "updated_at": updated_at,
            }),
        }
    }

    /// Applies the patch to a document in place.
    pub fn apply(&self, doc: &mut ArticleDoc) {
        match self {
            Self::Meta(meta) => {
                doc.title = meta.title.clone();
                doc.content = meta.content.clone();
                doc.publish_time = meta.publish_time;
                doc.source = meta.source.clone();
                doc.state = meta.state;
                doc.top = meta.top;
                doc.tags = meta.tags.clone();
                doc.topic = meta.topic.clone();
                doc.tag_ids = meta.tag_ids.clone();
                doc.topic_ids = meta.topic_ids.clone();
                doc.updated_at = meta.updated_at;
            }
            Self::Clustering(clustering) => {
                doc.cluster_status = clustering.cluster_status;
                doc.cluster_id = clustering.cluster_id.clone();
                doc.similarity_score = clustering.similarity_score;
                doc.updated_at = clustering.updated_at;
            }
            Self::Features(features) => {
                doc.simhash = features.simhash.clone();
                doc.minhash_signature = features.minhash_signature.clone();
                doc.shingles = features.shingles.clone();
            }
            Self::Repoint {
                cluster_id,
                updated_at,
            } => {
                doc.cluster_id = Some(cluster_id.clone());
                doc.updated_at = *updated_at;
            }
        }
    }
}

/// The narrow document-store interface consumed by the clustering engine.
///
/// Writes are single-document and last-writer-wins; there are no
/// cross-document transactions. Every method is safe to retry.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> bool;

    /// Creates indices/mappings if they do not exist yet.
    async fn ensure_indices(&self) -> Result<(), StoreError>;

    /// Drops all stored documents and recreates empty indices.
    async fn clear_all(&self) -> Result<(), StoreError>;

    /// Inserts or fully replaces an article document.
    async fn index_article(&self, doc: &ArticleDoc) -> Result<(), StoreError>;

    /// Fetches an article by id.
    async fn get_article(&self, article_id: &str) -> Result<Option<ArticleDoc>, StoreError>;

    /// Applies a partial update; returns whether the article existed.
    async fn update_article(
        &self,
        article_id: &str,
        patch: &ArticlePatch,
    ) -> Result<bool, StoreError>;

    /// Term-matches one article with exactly this SimHash fingerprint.
    async fn find_by_simhash(&self, simhash: &str) -> Result<Option<ArticleDoc>, StoreError>;

    /// Articles sharing at least one of the first [`LSH_QUERY_BANDS`] band
    /// hashes of `signature`.
    async fn find_band_candidates(
        &self,
        signature: &[String],
        limit: usize,
    ) -> Result<Vec<ArticleDoc>, StoreError>;

    /// Articles assigned to `cluster_id`, sorted by publish time descending.
    async fn find_by_cluster(
        &self,
        cluster_id: &str,
        limit: usize,
    ) -> Result<Vec<ArticleDoc>, StoreError>;

    /// Metadata search with paging; see [`ArticleQuery`].
    async fn search_articles(&self, query: &ArticleQuery) -> Result<SearchPage, StoreError>;

    /// Inserts or fully replaces a cluster document.
    async fn index_cluster(&self, doc: &ClusterDoc) -> Result<(), StoreError>;

    /// Fetches a cluster by id.
    async fn get_cluster(&self, cluster_id: &str) -> Result<Option<ClusterDoc>, StoreError>;

    /// Deletes a cluster document; returns whether it existed.
    async fn delete_cluster(&self, cluster_id: &str) -> Result<bool, StoreError>;
}

/// Builds the configured document-store backend.
///
/// # Errors
///
/// Returns a [`StoreError`] when the backend client cannot be constructed.
pub fn build_store(config: &AppConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match config.store_backend {
        StoreBackend::Memory => Ok(Arc::new(memory::MemoryStore::new())),
        StoreBackend::Elasticsearch => Ok(Arc::new(elastic::ElasticStore::new(
            &config.elasticsearch,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_spec_parses_valid_inputs() {
        let spec: SortSpec = "publish_time:desc".parse().unwrap();
        assert_eq!(spec.field, SortField::PublishTime);
        assert_eq!(spec.order, SortOrder::Desc);

        let spec: SortSpec = "created_at:asc".parse().unwrap();
        assert_eq!(spec.field, SortField::CreatedAt);
        assert_eq!(spec.order, SortOrder::Asc);
    }

    #[test]
    fn sort_spec_rejects_malformed_inputs() {
        for raw in ["publish_time", "title:asc", "publish_time:up", ""] {
            assert!(raw.parse::<SortSpec>().is_err(), "{raw:?} should fail");
        }
    }

    #[test]
    fn meta_patch_derives_search_ids() {
        let payload = ArticleCreate {
            article_id: "a1".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            publish_time: Utc::now(),
            source: "s".to_string(),
            state: 1,
            top: 0,
            tags: vec![ArticleTag {
                id: 42,
                name: "tag".to_string(),
            }],
            topic: vec![ArticleTopic {
                id: "top-1".to_string(),
                name: "topic".to_string(),
            }],
        };
        let patch = MetaPatch::from_create(&payload, Utc::now());
        assert_eq!(patch.tag_ids, vec!["42"]);
        assert_eq!(patch.topic_ids, vec!["top-1"]);
    }

    #[test]
    fn clustering_patch_serializes_explicit_nulls() {
        let patch = ArticlePatch::Clustering(ClusteringPatch {
            cluster_status: ClusterStatus::Unique,
            cluster_id: None,
            similarity_score: None,
            updated_at: Utc::now(),
        });
        let doc = patch.to_doc();
        assert_eq!(doc["cluster_status"], "unique");
        assert!(doc["cluster_id"].is_null());
        assert!(doc["similarity_score"].is_null());
    }

    #[test]
    fn repoint_patch_touches_only_pointer_and_timestamp() {
        let doc = ArticlePatch::Repoint {
            cluster_id: "cluster_a".to_string(),
            updated_at: Utc::now(),
        }
        .to_doc();
        assert_eq!(doc["cluster_id"], "cluster_a");
        assert!(doc.get("cluster_status").is_none());
        assert!(doc.get("similarity_score").is_none());
    }
}
