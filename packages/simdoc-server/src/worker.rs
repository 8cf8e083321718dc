//! The asynchronous re-score worker.
//!
//! Pulls jobs off the queue, re-scores the submitted article against its
//! candidates with Jaccard over stored shingles, and finalizes the cluster
//! assignment -- including multi-cluster merges and reconciliation with
//! fast-path writes that landed while the job was in flight.
//!
//! Multiple workers may run in parallel; convergence relies on the
//! deterministic merge winner, idempotent appends, and missing-cluster
//! recovery rather than locks.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use simdoc_core::config::SimilarityConfig;
use simdoc_core::model::{ClusterStatus, JobCandidate, JobStatus, SimilarityJob};
use simdoc_core::similarity::{cluster_id_for, merge_winner, score_candidates, ScoredCandidate};

use crate::queue::JobQueue;
use crate::registry::ClusterRegistry;
use crate::store::{ArticlePatch, ClusteringPatch, DocumentStore};

/// Completed jobs between queue TTL sweeps.
const SWEEP_INTERVAL: u64 = 10;

/// Signals a running worker to stop after its current job.
#[derive(Clone)]
pub struct WorkerStopHandle {
    running: Arc<AtomicBool>,
}

impl WorkerStopHandle {
    /// Requests a stop; the worker exits after the in-flight job and at
    /// most one dequeue timeout.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// One re-score worker instance.
pub struct SimilarityWorker {
    store: Arc<dyn DocumentStore>,
    queue: Arc<dyn JobQueue>,
    registry: ClusterRegistry,
    threshold: f64,
    running: Arc<AtomicBool>,
}

impl SimilarityWorker {
    /// Creates a worker over shared backend handles.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn JobQueue>,
        config: &SimilarityConfig,
    ) -> Self {
        let registry = ClusterRegistry::new(Arc::clone(&store));
        Self {
            store,
            queue,
            registry,
            threshold: config.similarity_threshold,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle other tasks can use to stop this worker.
    #[must_use]
    pub fn stop_handle(&self) -> WorkerStopHandle {
        WorkerStopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Consumes the queue until stopped or `max_jobs` jobs have completed.
    ///
    /// A dequeue returning nothing after `timeout` is a normal loop
    /// iteration; the stop flag is checked between pops and between jobs.
    /// Returns the number of completed jobs.
    pub async fn run(&self, max_jobs: Option<u64>, timeout: Duration) -> u64 {
        self.running.store(true, Ordering::SeqCst);
        let mut processed: u64 = 0;
        info!(timeout_ms = timeout.as_millis() as u64, "re-score worker started");

        while self.running.load(Ordering::SeqCst)
            && max_jobs.is_none_or(|max| processed < max)
        {
            let job_id = match self.queue.dequeue_job(timeout).await {
                Ok(Some(job_id)) => job_id,
                Ok(None) => {
                    debug!("queue empty, waiting");
                    continue;
                }
                Err(err) => {
                    error!(error = %err, "dequeue failed, stopping worker");
                    break;
                }
            };

            if self.process_job(&job_id).await {
                processed += 1;
                if processed % SWEEP_INTERVAL == 0 {
                    match self.queue.sweep_expired().await {
                        Ok(removed) if removed > 0 => {
                            debug!(removed, "swept expired queue metadata");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "queue sweep failed"),
                    }
                }
            } else {
                warn!(job_id = %job_id, "job processing failed");
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(processed, "re-score worker stopped");
        processed
    }

    /// Processes one job to completion. Returns whether the job completed.
    ///
    /// Any failure marks the job `failed` and leaves the article in its
    /// previous state; there is no automatic retry -- operator `recheck` is
    /// the recovery path.
    pub async fn process_job(&self, job_id: &str) -> bool {
        match self.try_process(job_id).await {
            Ok(completed) => completed,
            Err(err) => {
                error!(job_id = %job_id, error = %err, "error processing job");
                if let Err(status_err) = self
                    .queue
                    .update_job_status(job_id, JobStatus::Failed)
                    .await
                {
                    error!(job_id = %job_id, error = %status_err, "failed to mark job failed");
                }
                false
            }
        }
    }

    async fn try_process(&self, job_id: &str) -> anyhow::Result<bool> {
        let Some(job) = self.queue.get_job(job_id).await? else {
            warn!(job_id = %job_id, "job payload not found (expired?)");
            return Ok(false);
        };
        info!(job_id = %job_id, article_id = %job.article_id, "processing job");
        self.queue
            .update_job_status(job_id, JobStatus::Processing)
            .await?;

        let Some(article) = self.store.get_article(&job.article_id).await? else {
            error!(job_id = %job_id, article_id = %job.article_id, "article not found");
            self.queue
                .update_job_status(job_id, JobStatus::Failed)
                .await?;
            return Ok(false);
        };

        let resolved = self.resolve_candidates(&job).await?;
        let scored = score_candidates(&job.shingles, &resolved, self.threshold);

        // Clusters the similar peers already belong to. BTreeSet keeps the
        // merge set ordered, independent of candidate arrival order.
        let mut merge_set: BTreeSet<String> = scored
            .iter()
            .filter_map(|peer| peer.cluster_id.clone())
            .collect();

        let mut final_cluster = if scored.is_empty() {
            None
        } else if merge_set.is_empty() {
            // Peers exist but none is clustered yet: found a new cluster
            // and recruit them.
            Some(cluster_id_for(&job.article_id))
        } else {
            merge_winner(merge_set.iter().map(String::as_str))
        };

        // Reconcile with fast-path writes that landed while we worked: a
        // concurrent exact-duplicate submission may have matched this
        // article already.
        let mut external_score = None;
        if let Some(current) = self.store.get_article(&job.article_id).await? {
            if current.cluster_status == ClusterStatus::Matched {
                if let Some(external) = current.cluster_id {
                    match &final_cluster {
                        None => {
                            info!(
                                job_id = %job_id,
                                cluster_id = %external,
                                "adopting externally assigned cluster"
                            );
                            external_score = current.similarity_score;
                            final_cluster = Some(external);
                        }
                        Some(chosen) if *chosen != external => {
                            merge_set.insert(external);
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        let now = Utc::now();
        if let Some(final_id) = &final_cluster {
            let mut winner = self.registry.load_or_recover(final_id, &article).await?;
            winner.append(&job.article_id, now);

            for peer in &scored {
                winner.append(&peer.article_id, now);
                if peer.cluster_id.as_deref() != Some(final_id) {
                    self.store
                        .update_article(
                            &peer.article_id,
                            &ArticlePatch::Clustering(ClusteringPatch {
                                cluster_status: ClusterStatus::Matched,
                                cluster_id: Some(final_id.clone()),
                                similarity_score: Some(peer.similarity_score),
                                updated_at: now,
                            }),
                        )
                        .await?;
                }
            }

            for absorbed in &merge_set {
                if absorbed != final_id {
                    self.registry.absorb_into(&mut winner, absorbed).await?;
                }
            }
            self.store.index_cluster(&winner).await?;
        }

        let (status, score) = match &final_cluster {
            Some(_) => (
                ClusterStatus::Matched,
                best_score(&scored).or(external_score),
            ),
            None => (ClusterStatus::Unique, None),
        };
        self.store
            .update_article(
                &job.article_id,
                &ArticlePatch::Clustering(ClusteringPatch {
                    cluster_status: status,
                    cluster_id: final_cluster.clone(),
                    similarity_score: score,
                    updated_at: now,
                }),
            )
            .await?;

        self.queue.clear_pending_hint(&job.article_id).await?;
        self.queue
            .update_job_status(job_id, JobStatus::Completed)
            .await?;
        info!(
            job_id = %job_id,
            article_id = %job.article_id,
            cluster_id = final_cluster.as_deref().unwrap_or("-"),
            status = status.as_str(),
            "completed job"
        );
        Ok(true)
    }

    /// Re-reads each candidate's shingles from the store; the job snapshot
    /// may be stale or incomplete. Candidates that vanished or have no
    /// shingles are skipped. The snapshot's cluster pointer is kept -- it is
    /// what the candidate retrieval saw at submission time.
    async fn resolve_candidates(
        &self,
        job: &SimilarityJob,
    ) -> anyhow::Result<Vec<JobCandidate>> {
        let mut resolved = Vec::with_capacity(job.candidates.len());
        for candidate in &job.candidates {
            let Some(stored) = self.store.get_article(&candidate.article_id).await? else {
                continue;
            };
            if stored.shingles.is_empty() {
                continue;
            }
            resolved.push(JobCandidate {
                article_id: candidate.article_id.clone(),
                cluster_id: candidate.cluster_id.clone(),
                shingles: stored.shingles,
                simhash: Some(stored.simhash),
            });
        }
        Ok(resolved)
    }
}

/// Highest similarity among the scored peers (they are sorted descending).
fn best_score(scored: &[ScoredCandidate]) -> Option<f64> {
    scored.first().map(|peer| peer.similarity_score)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use simdoc_core::model::{ArticleDoc, ClusterDoc, PendingClusterHint};

    use super::*;
    use crate::queue::memory::MemoryQueue;
    use crate::store::memory::MemoryStore;

    fn shingleize(text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.windows(5).map(|w| w.iter().collect()).collect()
    }

    fn article(id: &str, text: &str, cluster: Option<&str>) -> ArticleDoc {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ArticleDoc {
            article_id: id.to_string(),
            title: format!("title {id}"),
            content: text.to_string(),
            publish_time: now,
            source: "wire".to_string(),
            state: 1,
            top: 0,
            tags: vec![],
            topic: vec![],
            tag_ids: vec![],
            topic_ids: vec![],
            simhash: format!("hash-{id}"),
            minhash_signature: vec![],
            shingles: shingleize(text),
            cluster_id: cluster.map(ToString::to_string),
            cluster_status: if cluster.is_some() {
                ClusterStatus::Matched
            } else {
                ClusterStatus::Pending
            },
            similarity_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn job_for(doc: &ArticleDoc, candidates: &[&ArticleDoc]) -> SimilarityJob {
        SimilarityJob::new(
            format!("job_test_{}", doc.article_id),
            doc.article_id.clone(),
            doc.shingles.clone(),
            candidates
                .iter()
                .map(|candidate| JobCandidate {
                    article_id: candidate.article_id.clone(),
                    cluster_id: candidate.cluster_id.clone(),
                    shingles: candidate.shingles.clone(),
                    simhash: Some(candidate.simhash.clone()),
                })
                .collect(),
            Utc::now(),
        )
    }

    fn setup() -> (SimilarityWorker, Arc<MemoryStore>, Arc<MemoryQueue>) {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let worker = SimilarityWorker::new(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            &SimilarityConfig::default(),
        );
        (worker, store, queue)
    }

    const BODY: &str = "a fire broke out in a tai po apartment block early this morning \
                        and firefighters spent several hours bringing the blaze under \
                        control while residents were evacuated to nearby shelters";

    #[tokio::test]
    async fn unique_article_gets_no_cluster() {
        let (worker, store, queue) = setup();
        let doc = article("a1", BODY, None);
        store.index_article(&doc).await.unwrap();
        let job = job_for(&doc, &[]);
        queue.enqueue_job(&job).await.unwrap();

        assert!(worker.process_job(&job.job_id).await);

        let updated = store.get_article("a1").await.unwrap().unwrap();
        assert_eq!(updated.cluster_status, ClusterStatus::Unique);
        assert!(updated.cluster_id.is_none());
        assert!(updated.similarity_score.is_none());
        let stored_job = queue.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored_job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn unclustered_peers_found_a_new_cluster() {
        let (worker, store, queue) = setup();
        let peer = article("a1", BODY, None);
        let doc = article("b1", &format!("{BODY} extra tail"), None);
        store.index_article(&peer).await.unwrap();
        store.index_article(&doc).await.unwrap();
        let job = job_for(&doc, &[&peer]);
        queue.enqueue_job(&job).await.unwrap();

        assert!(worker.process_job(&job.job_id).await);

        let b = store.get_article("b1").await.unwrap().unwrap();
        assert_eq!(b.cluster_status, ClusterStatus::Matched);
        assert_eq!(b.cluster_id.as_deref(), Some("cluster_b1"));
        assert!(b.similarity_score.unwrap() >= 0.8);

        // The recruited peer was patched to the same cluster.
        let a = store.get_article("a1").await.unwrap().unwrap();
        assert_eq!(a.cluster_status, ClusterStatus::Matched);
        assert_eq!(a.cluster_id.as_deref(), Some("cluster_b1"));

        let cluster = store.get_cluster("cluster_b1").await.unwrap().unwrap();
        assert!(cluster.article_ids.contains(&"a1".to_string()));
        assert!(cluster.article_ids.contains(&"b1".to_string()));
        assert_eq!(cluster.size, cluster.article_ids.len());
    }

    #[tokio::test]
    async fn joining_one_existing_cluster_is_not_a_merge() {
        let (worker, store, queue) = setup();
        let peer = article("a1", BODY, Some("cluster_a1"));
        store.index_article(&peer).await.unwrap();
        store
            .index_cluster(&ClusterDoc::new(
                "cluster_a1".to_string(),
                "a1".to_string(),
                vec![],
                Utc::now(),
            ))
            .await
            .unwrap();
        let doc = article("b1", &format!("{BODY} extra tail"), None);
        store.index_article(&doc).await.unwrap();
        let job = job_for(&doc, &[&peer]);
        queue.enqueue_job(&job).await.unwrap();

        assert!(worker.process_job(&job.job_id).await);

        let b = store.get_article("b1").await.unwrap().unwrap();
        assert_eq!(b.cluster_id.as_deref(), Some("cluster_a1"));
        let cluster = store.get_cluster("cluster_a1").await.unwrap().unwrap();
        assert!(cluster.article_ids.contains(&"b1".to_string()));
        assert_eq!(cluster.representative_article_id, "a1");
    }

    #[tokio::test]
    async fn merge_picks_lexicographic_winner_and_deletes_loser() {
        let (worker, store, queue) = setup();
        let x = article("x", BODY, Some("cluster_b"));
        let y = article("y", &format!("{BODY} y variant"), Some("cluster_a"));
        store.index_article(&x).await.unwrap();
        store.index_article(&y).await.unwrap();
        store
            .index_cluster(&ClusterDoc::new(
                "cluster_b".to_string(),
                "x".to_string(),
                vec![],
                Utc::now(),
            ))
            .await
            .unwrap();
        store
            .index_cluster(&ClusterDoc::new(
                "cluster_a".to_string(),
                "y".to_string(),
                vec![],
                Utc::now(),
            ))
            .await
            .unwrap();

        let z = article("z", &format!("{BODY} z variant"), None);
        store.index_article(&z).await.unwrap();
        let job = job_for(&z, &[&x, &y]);
        queue.enqueue_job(&job).await.unwrap();

        assert!(worker.process_job(&job.job_id).await);

        // Winner is the lexicographically smallest id.
        let z_doc = store.get_article("z").await.unwrap().unwrap();
        assert_eq!(z_doc.cluster_id.as_deref(), Some("cluster_a"));
        for id in ["x", "y"] {
            let member = store.get_article(id).await.unwrap().unwrap();
            assert_eq!(member.cluster_id.as_deref(), Some("cluster_a"));
        }
        assert!(store.get_cluster("cluster_b").await.unwrap().is_none());

        let winner = store.get_cluster("cluster_a").await.unwrap().unwrap();
        for id in ["x", "y", "z"] {
            assert!(winner.article_ids.contains(&id.to_string()), "{id} missing");
        }
        assert_eq!(winner.size, winner.article_ids.len());
        // The winner's representative survives the merge.
        assert_eq!(winner.representative_article_id, "y");
    }

    #[tokio::test]
    async fn redelivered_job_converges_to_the_same_state() {
        let (worker, store, queue) = setup();
        let peer = article("a1", BODY, None);
        let doc = article("b1", &format!("{BODY} extra tail"), None);
        store.index_article(&peer).await.unwrap();
        store.index_article(&doc).await.unwrap();
        let job = job_for(&doc, &[&peer]);
        queue.enqueue_job(&job).await.unwrap();

        assert!(worker.process_job(&job.job_id).await);
        let first_cluster = store.get_cluster("cluster_b1").await.unwrap().unwrap();

        // At-least-once delivery: process the same job again.
        assert!(worker.process_job(&job.job_id).await);
        let second_cluster = store.get_cluster("cluster_b1").await.unwrap().unwrap();
        assert_eq!(first_cluster.article_ids, second_cluster.article_ids);
        assert_eq!(second_cluster.size, second_cluster.article_ids.len());
    }

    #[tokio::test]
    async fn adopts_external_fast_path_assignment() {
        let (worker, store, queue) = setup();
        // The article was matched by a concurrent exact-duplicate
        // submission while its job sat in the queue.
        let mut doc = article("a1", BODY, Some("cluster_ext"));
        doc.similarity_score = Some(1.0);
        store.index_article(&doc).await.unwrap();
        store
            .index_cluster(&ClusterDoc::new(
                "cluster_ext".to_string(),
                "a1".to_string(),
                vec![],
                Utc::now(),
            ))
            .await
            .unwrap();

        let job = SimilarityJob::new(
            "job_test_a1".to_string(),
            "a1".to_string(),
            doc.shingles.clone(),
            vec![],
            Utc::now(),
        );
        queue.enqueue_job(&job).await.unwrap();

        assert!(worker.process_job(&job.job_id).await);

        let updated = store.get_article("a1").await.unwrap().unwrap();
        assert_eq!(updated.cluster_status, ClusterStatus::Matched);
        assert_eq!(updated.cluster_id.as_deref(), Some("cluster_ext"));
        // The fast-path score survives the reconcile.
        assert_eq!(updated.similarity_score, Some(1.0));
    }

    #[tokio::test]
    async fn missing_article_fails_the_job() {
        let (worker, _store, queue) = setup();
        // The article is never indexed.
        let doc = article("ghost", BODY, None);
        let job = job_for(&doc, &[]);
        queue.enqueue_job(&job).await.unwrap();

        assert!(!worker.process_job(&job.job_id).await);
        let stored_job = queue.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored_job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn missing_job_payload_is_not_an_error() {
        let (worker, _store, _queue) = setup();
        assert!(!worker.process_job("job_never_enqueued").await);
    }

    #[tokio::test]
    async fn completion_clears_the_pending_hint() {
        let (worker, store, queue) = setup();
        let doc = article("a1", BODY, None);
        store.index_article(&doc).await.unwrap();
        queue
            .set_pending_hint(
                "a1",
                &PendingClusterHint {
                    cluster_id: None,
                    eta_ms: 150,
                    timestamp: Utc::now(),
                },
            )
            .await
            .unwrap();
        let job = job_for(&doc, &[]);
        queue.enqueue_job(&job).await.unwrap();

        assert!(worker.process_job(&job.job_id).await);
        assert!(queue.get_pending_hint("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_respects_max_jobs() {
        let (worker, store, queue) = setup();
        for i in 0..3 {
            let doc = article(&format!("a{i}"), &format!("{BODY} {i}"), None);
            store.index_article(&doc).await.unwrap();
            queue.enqueue_job(&job_for(&doc, &[])).await.unwrap();
        }

        let processed = worker.run(Some(2), Duration::from_millis(20)).await;
        assert_eq!(processed, 2);
        assert_eq!(queue.queue_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stop_handle_ends_the_loop() {
        let (worker, _store, queue) = setup();
        let handle = worker.stop_handle();
        let worker = Arc::new(worker);
        let task = {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.run(None, Duration::from_millis(10)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop();
        let processed = task.await.unwrap();
        assert_eq!(processed, 0);
        assert_eq!(queue.queue_len().await.unwrap(), 0);
    }
}
