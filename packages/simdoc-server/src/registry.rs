//! Cluster registry: the façade over the document store that owns the
//! cluster-document invariants.
//!
//! Appends are duplicate-free and never move the representative; merges pick
//! the lexicographically smallest id so concurrent writers converge; a
//! missing cluster document is recreated from the referring article, which
//! covers partial writes from crashed workers.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use simdoc_core::model::{ArticleDoc, ClusterDoc};
use simdoc_core::similarity::{extract_top_terms, TOP_TERMS_LIMIT};

use crate::store::{ArticlePatch, DocumentStore, StoreError, CLUSTER_FETCH_LIMIT};

/// Shared façade over cluster documents.
#[derive(Clone)]
pub struct ClusterRegistry {
    store: Arc<dyn DocumentStore>,
}

impl ClusterRegistry {
    /// Creates a registry over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Builds a fresh cluster document founded by `founder`, keeping
    /// `cluster_id` as given so recovery preserves dangling ids.
    #[must_use]
    pub fn new_cluster_doc(cluster_id: &str, founder: &ArticleDoc) -> ClusterDoc {
        let top_terms = extract_top_terms(&founder.full_text(), TOP_TERMS_LIMIT);
        ClusterDoc::new(
            cluster_id.to_string(),
            founder.article_id.clone(),
            top_terms,
            Utc::now(),
        )
    }

    /// Loads a cluster document, or recreates it from the referring article
    /// when the invariants say it should exist but the read found nothing.
    ///
    /// The recreated document is not persisted here; callers write it back
    /// after applying their own membership changes.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn load_or_recover(
        &self,
        cluster_id: &str,
        referrer: &ArticleDoc,
    ) -> Result<ClusterDoc, StoreError> {
        match self.store.get_cluster(cluster_id).await? {
            Some(doc) => Ok(doc),
            None => {
                warn!(
                    cluster_id,
                    referrer = %referrer.article_id,
                    "cluster document missing, recreating from referring article"
                );
                Ok(Self::new_cluster_doc(cluster_id, referrer))
            }
        }
    }

    /// Appends `member_id` to `cluster_id`, creating the document from
    /// `referrer` if it does not exist, and persists the result.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn append_member(
        &self,
        cluster_id: &str,
        referrer: &ArticleDoc,
        member_id: &str,
    ) -> Result<ClusterDoc, StoreError> {
        let mut cluster = self.load_or_recover(cluster_id, referrer).await?;
        cluster.append(member_id, Utc::now());
        self.store.index_cluster(&cluster).await?;
        Ok(cluster)
    }

    /// Absorbs `absorbed_id` into `winner`: re-points every article of the
    /// absorbed cluster at the winner, unions the memberships, and deletes
    /// the absorbed document.
    ///
    /// The winner document is modified in place; the caller persists it
    /// once all absorptions are applied.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn absorb_into(
        &self,
        winner: &mut ClusterDoc,
        absorbed_id: &str,
    ) -> Result<(), StoreError> {
        if absorbed_id == winner.cluster_id {
            return Ok(());
        }
        let now = Utc::now();

        let members = self
            .store
            .find_by_cluster(absorbed_id, CLUSTER_FETCH_LIMIT)
            .await?;
        for member in &members {
            self.store
                .update_article(
                    &member.article_id,
                    &ArticlePatch::Repoint {
                        cluster_id: winner.cluster_id.clone(),
                        updated_at: now,
                    },
                )
                .await?;
        }
        let member_ids: Vec<String> = members.into_iter().map(|doc| doc.article_id).collect();
        winner.absorb_members(&member_ids, now);

        if let Some(absorbed) = self.store.get_cluster(absorbed_id).await? {
            winner.absorb_members(&absorbed.article_ids, now);
        }
        self.store.delete_cluster(absorbed_id).await?;
        info!(
            absorbed = absorbed_id,
            winner = %winner.cluster_id,
            "absorbed cluster into merge winner"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use simdoc_core::model::ClusterStatus;

    use super::*;
    use crate::store::memory::MemoryStore;

    fn article(id: &str, cluster: Option<&str>) -> ArticleDoc {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ArticleDoc {
            article_id: id.to_string(),
            title: "Fire".to_string(),
            content: "Fire in Tai Po".to_string(),
            publish_time: now,
            source: "wire".to_string(),
            state: 1,
            top: 0,
            tags: vec![],
            topic: vec![],
            tag_ids: vec![],
            topic_ids: vec![],
            simhash: "ff".to_string(),
            minhash_signature: vec![],
            shingles: vec![],
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

    #[tokio::test]
    async fn append_creates_then_grows_the_document() {
        let store = Arc::new(MemoryStore::new());
        let registry = ClusterRegistry::new(store.clone());
        let founder = article("a1", None);

        let cluster = registry
            .append_member("cluster_a1", &founder, "a1")
            .await
            .unwrap();
        assert_eq!(cluster.article_ids, vec!["a1"]);
        assert_eq!(cluster.representative_article_id, "a1");
        assert!(!cluster.top_terms.is_empty());

        let cluster = registry
            .append_member("cluster_a1", &founder, "a2")
            .await
            .unwrap();
        assert_eq!(cluster.article_ids, vec!["a1", "a2"]);
        assert_eq!(cluster.size, 2);

        // Idempotent: appending an existing member changes nothing.
        let cluster = registry
            .append_member("cluster_a1", &founder, "a2")
            .await
            .unwrap();
        assert_eq!(cluster.size, 2);

        let stored = store.get_cluster("cluster_a1").await.unwrap().unwrap();
        assert_eq!(stored.size, 2);
    }

    #[tokio::test]
    async fn recovery_preserves_the_dangling_id() {
        let store = Arc::new(MemoryStore::new());
        let registry = ClusterRegistry::new(store);
        let referrer = article("a7", Some("cluster_gone"));

        let recovered = registry
            .load_or_recover("cluster_gone", &referrer)
            .await
            .unwrap();
        assert_eq!(recovered.cluster_id, "cluster_gone");
        assert_eq!(recovered.representative_article_id, "a7");
        assert_eq!(recovered.article_ids, vec!["a7"]);
    }

    #[tokio::test]
    async fn absorb_repoints_members_and_deletes_the_loser() {
        let store = Arc::new(MemoryStore::new());
        let registry = ClusterRegistry::new(store.clone());

        let x = article("x", Some("cluster_b"));
        store.index_article(&x).await.unwrap();
        store
            .index_cluster(&ClusterDoc::new(
                "cluster_b".to_string(),
                "x".to_string(),
                vec![],
                Utc::now(),
            ))
            .await
            .unwrap();

        let founder = article("a1", Some("cluster_a"));
        let mut winner = ClusterRegistry::new_cluster_doc("cluster_a", &founder);
        registry.absorb_into(&mut winner, "cluster_b").await.unwrap();

        assert!(winner.article_ids.contains(&"x".to_string()));
        assert_eq!(winner.size, winner.article_ids.len());
        assert!(store.get_cluster("cluster_b").await.unwrap().is_none());
        let repointed = store.get_article("x").await.unwrap().unwrap();
        assert_eq!(repointed.cluster_id.as_deref(), Some("cluster_a"));
        // Status and score are untouched by re-pointing.
        assert_eq!(repointed.cluster_status, ClusterStatus::Matched);
    }

    #[tokio::test]
    async fn absorb_into_self_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let registry = ClusterRegistry::new(store);
        let founder = article("a1", Some("cluster_a"));
        let mut winner = ClusterRegistry::new_cluster_doc("cluster_a", &founder);

        registry.absorb_into(&mut winner, "cluster_a").await.unwrap();
        assert_eq!(winner.article_ids, vec!["a1"]);
    }
}
