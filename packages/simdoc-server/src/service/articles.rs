//! Article admission (the synchronous submitter) and article read paths.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use simdoc_core::model::api::{
    ArticleCreate, ArticleResponse, RecheckRequest, RecheckResponse, SimilarArticleEntry,
    SimilarArticlesResponse,
};
use simdoc_core::model::{
    ArticleDoc, ClusterStatus, JobCandidate, PendingClusterHint, SimilarityJob,
};
use simdoc_core::similarity::{best_cluster_by_average, cluster_id_for, score_candidates};
use simdoc_core::{ArticleFeatures, FeatureExtractor};

use crate::error::ApiError;
use crate::queue::{new_queue_id, JobQueue};
use crate::registry::ClusterRegistry;
use crate::store::{
    ArticlePatch, ClusteringPatch, DocumentStore, FeaturePatch, MetaPatch, CLUSTER_FETCH_LIMIT,
    MINHASH_CANDIDATE_LIMIT,
};

/// Estimated worker latency per queued job, for the pending-cluster hint.
const ETA_PER_JOB_MS: u64 = 100;

/// Fixed scheduling overhead added to non-empty-queue estimates.
const ETA_BASE_MS: u64 = 50;

/// Submission, read, and recheck operations on articles.
pub struct ArticleService {
    store: Arc<dyn DocumentStore>,
    queue: Arc<dyn JobQueue>,
    extractor: FeatureExtractor,
    registry: ClusterRegistry,
}

impl ArticleService {
    /// Creates the service over shared backend handles.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn JobQueue>,
        extractor: FeatureExtractor,
    ) -> Self {
        let registry = ClusterRegistry::new(Arc::clone(&store));
        Self {
            store,
            queue,
            extractor,
            registry,
        }
    }

    /// Idempotent upsert keyed on `article_id`.
    ///
    /// Re-submission of a known id patches mutable metadata only -- no
    /// re-extraction, no re-enqueue. New ids either short-circuit through
    /// the exact-duplicate fast path (no job) or are indexed `pending` and
    /// handed to the re-score worker.
    ///
    /// # Errors
    ///
    /// Store and queue failures surface as [`ApiError::Internal`].
    pub async fn submit_article(&self, payload: &ArticleCreate) -> Result<(), ApiError> {
        let now = Utc::now();

        if self.store.get_article(&payload.article_id).await?.is_some() {
            self.store
                .update_article(
                    &payload.article_id,
                    &ArticlePatch::Meta(MetaPatch::from_create(payload, now)),
                )
                .await?;
            debug!(article_id = %payload.article_id, "updated existing article");
            return Ok(());
        }

        let full_text = format!("{} {}", payload.title, payload.content);
        let features = self.extractor.extract(&full_text);

        if let Some(hit) = self.store.find_by_simhash(&features.simhash).await? {
            self.admit_exact_duplicate(payload, &features, hit, now).await?;
            return Ok(());
        }

        self.admit_pending(payload, features, now).await
    }

    /// Fast path: an article with the identical fingerprint already exists.
    ///
    /// If the hit has no cluster yet (it is `pending` or `unique`), a
    /// cluster is founded on the hit and the hit is patched to `matched`
    /// first; the new article then joins that cluster. No job is enqueued.
    async fn admit_exact_duplicate(
        &self,
        payload: &ArticleCreate,
        features: &ArticleFeatures,
        hit: ArticleDoc,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let cluster_id = match hit.cluster_id.clone() {
            Some(cluster_id) => cluster_id,
            None => {
                let cluster_id = cluster_id_for(&hit.article_id);
                self.store
                    .update_article(
                        &hit.article_id,
                        &ArticlePatch::Clustering(ClusteringPatch {
                            cluster_status: ClusterStatus::Matched,
                            cluster_id: Some(cluster_id.clone()),
                            similarity_score: Some(1.0),
                            updated_at: now,
                        }),
                    )
                    .await?;
                self.registry
                    .append_member(&cluster_id, &hit, &hit.article_id)
                    .await?;
                cluster_id
            }
        };

        let doc = build_doc(
            payload,
            features.clone(),
            Some(cluster_id.clone()),
            ClusterStatus::Matched,
            Some(1.0),
            now,
        );
        self.store.index_article(&doc).await?;
        self.registry
            .append_member(&cluster_id, &hit, &payload.article_id)
            .await?;
        info!(
            article_id = %payload.article_id,
            cluster_id = %cluster_id,
            duplicate_of = %hit.article_id,
            "admitted exact duplicate"
        );
        Ok(())
    }

    /// Slow path: index `pending`, write the advisory hint, enqueue the job.
    ///
    /// The article document is written before the job so the worker can
    /// always load it.
    async fn admit_pending(
        &self,
        payload: &ArticleCreate,
        features: ArticleFeatures,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let candidates = self
            .band_candidates(&features.minhash_signature, &payload.article_id)
            .await?;

        let doc = build_doc(
            payload,
            features,
            None,
            ClusterStatus::Pending,
            None,
            now,
        );
        self.store.index_article(&doc).await?;

        let scored = score_candidates(
            &doc.shingles,
            &candidates,
            self.extractor.config().similarity_threshold,
        );
        let advisory = best_cluster_by_average(&scored);

        let queue_len = self.queue.queue_len().await?;
        self.queue
            .set_pending_hint(
                &payload.article_id,
                &PendingClusterHint {
                    cluster_id: advisory,
                    eta_ms: estimate_eta_ms(queue_len),
                    timestamp: now,
                },
            )
            .await?;

        let job = SimilarityJob::new(
            new_queue_id("job", now),
            payload.article_id.clone(),
            doc.shingles.clone(),
            candidates,
            now,
        );
        self.queue.enqueue_job(&job).await?;
        info!(
            article_id = %payload.article_id,
            job_id = %job.job_id,
            candidates = job.candidates.len(),
            "enqueued re-score job"
        );
        Ok(())
    }

    /// LSH candidates for a signature, excluding the article itself.
    async fn band_candidates(
        &self,
        signature: &[String],
        self_id: &str,
    ) -> Result<Vec<JobCandidate>, ApiError> {
        let hits = self
            .store
            .find_band_candidates(signature, MINHASH_CANDIDATE_LIMIT)
            .await?;
        Ok(hits
            .into_iter()
            .filter(|doc| doc.article_id != self_id)
            .map(|doc| JobCandidate {
                article_id: doc.article_id,
                cluster_id: doc.cluster_id,
                shingles: doc.shingles,
                simhash: Some(doc.simhash),
            })
            .collect())
    }

    /// The article plus its cluster document, inlined.
    ///
    /// # Errors
    ///
    /// `ARTICLE_NOT_FOUND` when the id is unknown.
    pub async fn get_article(
        &self,
        article_id: &str,
        trace_id: &str,
    ) -> Result<ArticleResponse, ApiError> {
        let doc = self
            .store
            .get_article(article_id)
            .await?
            .ok_or_else(|| ApiError::ArticleNotFound(article_id.to_string()))?;

        let cluster = match &doc.cluster_id {
            Some(cluster_id) => Some(
                self.registry
                    .load_or_recover(cluster_id, &doc)
                    .await?
                    .to_wire(),
            ),
            None => None,
        };

        Ok(ArticleResponse {
            article: doc.to_wire(),
            cluster,
            trace_id: trace_id.to_string(),
        })
    }

    /// Every other article in the same cluster.
    ///
    /// # Errors
    ///
    /// `CLUSTER_PENDING` when the article is unknown, still pending, or has
    /// no cluster.
    pub async fn get_similar(
        &self,
        article_id: &str,
        trace_id: &str,
    ) -> Result<SimilarArticlesResponse, ApiError> {
        let doc = self
            .store
            .get_article(article_id)
            .await?
            .ok_or(ApiError::ClusterPending)?;
        if doc.cluster_status == ClusterStatus::Pending {
            return Err(ApiError::ClusterPending);
        }
        let Some(cluster_id) = doc.cluster_id else {
            return Err(ApiError::ClusterPending);
        };

        let members = self
            .store
            .find_by_cluster(&cluster_id, CLUSTER_FETCH_LIMIT)
            .await?;
        let articles = members
            .into_iter()
            .filter(|member| member.article_id != article_id)
            .map(|member| SimilarArticleEntry {
                article_id: member.article_id,
                title: member.title,
                similarity_score: member.similarity_score.unwrap_or(0.0),
            })
            .collect();

        Ok(SimilarArticlesResponse {
            cluster_id,
            articles,
            trace_id: trace_id.to_string(),
        })
    }

    /// Resets each existing article to `pending`, re-extracts its features,
    /// and re-enqueues a re-score job. Unknown ids are skipped silently.
    ///
    /// # Errors
    ///
    /// Store and queue failures surface as [`ApiError::Internal`].
    pub async fn recheck(
        &self,
        request: &RecheckRequest,
        trace_id: &str,
    ) -> Result<RecheckResponse, ApiError> {
        let now = Utc::now();
        let batch_id = new_queue_id("recheck", now);
        info!(
            batch_id = %batch_id,
            articles = request.article_ids.len(),
            reason = %request.reason,
            "recheck requested"
        );

        for article_id in &request.article_ids {
            let Some(doc) = self.store.get_article(article_id).await? else {
                debug!(article_id = %article_id, "recheck skipping unknown article");
                continue;
            };

            self.store
                .update_article(
                    article_id,
                    &ArticlePatch::Clustering(ClusteringPatch {
                        cluster_status: ClusterStatus::Pending,
                        cluster_id: None,
                        similarity_score: None,
                        updated_at: Utc::now(),
                    }),
                )
                .await?;

            let features = self.extractor.extract(&doc.full_text());
            self.store
                .update_article(
                    article_id,
                    &ArticlePatch::Features(FeaturePatch {
                        simhash: features.simhash.clone(),
                        minhash_signature: features.minhash_signature.clone(),
                        shingles: features.shingles.clone(),
                    }),
                )
                .await?;

            let candidates = self
                .band_candidates(&features.minhash_signature, article_id)
                .await?;
            let job = SimilarityJob::new(
                new_queue_id("job", Utc::now()),
                article_id.clone(),
                features.shingles,
                candidates,
                Utc::now(),
            );
            self.queue.enqueue_job(&job).await?;
        }

        Ok(RecheckResponse {
            accepted: true,
            job_id: batch_id,
            trace_id: trace_id.to_string(),
        })
    }
}

/// Queue-depth based estimate of when the re-score will land.
fn estimate_eta_ms(queue_len: u64) -> u64 {
    if queue_len == 0 {
        0
    } else {
        queue_len * ETA_PER_JOB_MS + ETA_BASE_MS
    }
}

/// Assembles a full article document from a submission payload.
fn build_doc(
    payload: &ArticleCreate,
    features: ArticleFeatures,
    cluster_id: Option<String>,
    cluster_status: ClusterStatus,
    similarity_score: Option<f64>,
    now: chrono::DateTime<Utc>,
) -> ArticleDoc {
    ArticleDoc {
        article_id: payload.article_id.clone(),
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
        simhash: features.simhash,
        minhash_signature: features.minhash_signature,
        shingles: features.shingles,
        cluster_id,
        cluster_status,
        similarity_score,
        created_at: now,
        updated_at: now,
    }
}
