//! In-memory [`DocumentStore`] backed by [`DashMap`].
//!
//! Provides concurrent access without external locking and immediate write
//! visibility, matching the synchronous-refresh semantics the submitter
//! fast path depends on. Suitable for development and tests; queries are
//! linear scans, which is fine at those scales.

use async_trait::async_trait;
use dashmap::DashMap;

use simdoc_core::model::{ArticleDoc, ClusterDoc};

use super::{
    ArticlePatch, ArticleQuery, DocumentStore, SearchPage, SortField, SortOrder, StoreError,
    LSH_QUERY_BANDS,
};

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    articles: DashMap<String, ArticleDoc>,
    clusters: DashMap<String, ClusterDoc>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot_articles(&self) -> Vec<ArticleDoc> {
        self.articles
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Whether every whitespace token of `needle` occurs in `haystack`,
/// case-insensitively. Approximates the term-match-with-AND-operator
/// semantics of the production backend.
fn title_matches(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    needle
        .to_lowercase()
        .split_whitespace()
        .all(|token| haystack.contains(token))
}

fn matches_query(doc: &ArticleDoc, query: &ArticleQuery) -> bool {
    if let Some(state) = query.state {
        if doc.state != state {
            return false;
        }
    }
    if let Some(top) = query.top {
        if doc.top != top {
            return false;
        }
    }
    if let Some(source) = &query.source {
        if &doc.source != source {
            return false;
        }
    }
    if let Some(tag_id) = &query.tag_id {
        if !doc.tag_ids.contains(tag_id) {
            return false;
        }
    }
    if !query.topic_ids.is_empty()
        && !query.topic_ids.iter().any(|id| doc.topic_ids.contains(id))
    {
        return false;
    }
    if let Some(start) = query.start_time {
        if doc.publish_time < start {
            return false;
        }
    }
    if let Some(end) = query.end_time {
        if doc.publish_time > end {
            return false;
        }
    }
    if let Some(title) = &query.title {
        if !title_matches(&doc.title, title) {
            return false;
        }
    }
    true
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn ensure_indices(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.articles.clear();
        self.clusters.clear();
        Ok(())
    }

    async fn index_article(&self, doc: &ArticleDoc) -> Result<(), StoreError> {
        self.articles.insert(doc.article_id.clone(), doc.clone());
        Ok(())
    }

    async fn get_article(&self, article_id: &str) -> Result<Option<ArticleDoc>, StoreError> {
        Ok(self.articles.get(article_id).map(|entry| entry.clone()))
    }

    async fn update_article(
        &self,
        article_id: &str,
        patch: &ArticlePatch,
    ) -> Result<bool, StoreError> {
        match self.articles.get_mut(article_id) {
            Some(mut entry) => {
                patch.apply(entry.value_mut());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_simhash(&self, simhash: &str) -> Result<Option<ArticleDoc>, StoreError> {
        // Ties broken by article id so the fast path is deterministic.
        Ok(self
            .articles
            .iter()
            .filter(|entry| entry.value().simhash == simhash)
            .map(|entry| entry.value().clone())
            .min_by(|a, b| a.article_id.cmp(&b.article_id)))
    }

    async fn find_band_candidates(
        &self,
        signature: &[String],
        limit: usize,
    ) -> Result<Vec<ArticleDoc>, StoreError> {
        let bands = &signature[..signature.len().min(LSH_QUERY_BANDS)];
        let mut hits: Vec<ArticleDoc> = self
            .articles
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .minhash_signature
                    .iter()
                    .any(|band| bands.contains(band))
            })
            .map(|entry| entry.value().clone())
            .collect();
        hits.sort_by(|a, b| a.article_id.cmp(&b.article_id));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn find_by_cluster(
        &self,
        cluster_id: &str,
        limit: usize,
    ) -> Result<Vec<ArticleDoc>, StoreError> {
        let mut hits: Vec<ArticleDoc> = self
            .articles
            .iter()
            .filter(|entry| entry.value().cluster_id.as_deref() == Some(cluster_id))
            .map(|entry| entry.value().clone())
            .collect();
        hits.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn search_articles(&self, query: &ArticleQuery) -> Result<SearchPage, StoreError> {
        let mut hits: Vec<ArticleDoc> = self
            .snapshot_articles()
            .into_iter()
            .filter(|doc| matches_query(doc, query))
            .collect();

        hits.sort_by(|a, b| {
            let (a_key, b_key) = match query.sort.field {
                SortField::PublishTime => (a.publish_time, b.publish_time),
                SortField::CreatedAt => (a.created_at, b.created_at),
                SortField::UpdatedAt => (a.updated_at, b.updated_at),
            };
            match query.sort.order {
                SortOrder::Asc => a_key.cmp(&b_key),
                SortOrder::Desc => b_key.cmp(&a_key),
            }
        });

        let total = hits.len() as u64;
        let offset = query.page.saturating_sub(1) * query.page_size;
        let items: Vec<ArticleDoc> = hits
            .into_iter()
            .skip(offset)
            .take(query.page_size)
            .collect();
        Ok(SearchPage { items, total })
    }

    async fn index_cluster(&self, doc: &ClusterDoc) -> Result<(), StoreError> {
        self.clusters.insert(doc.cluster_id.clone(), doc.clone());
        Ok(())
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<Option<ClusterDoc>, StoreError> {
        Ok(self.clusters.get(cluster_id).map(|entry| entry.clone()))
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<bool, StoreError> {
        Ok(self.clusters.remove(cluster_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use simdoc_core::model::ClusterStatus;

    use super::*;
    use crate::store::{ClusteringPatch, SortSpec};

    fn doc(id: &str, simhash: &str, bands: &[&str]) -> ArticleDoc {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ArticleDoc {
            article_id: id.to_string(),
            title: format!("title {id}"),
            content: "content".to_string(),
            publish_time: now,
            source: "wire".to_string(),
            state: 1,
            top: 0,
            tags: vec![],
            topic: vec![],
            tag_ids: vec![],
            topic_ids: vec![],
            simhash: simhash.to_string(),
            minhash_signature: bands.iter().map(ToString::to_string).collect(),
            shingles: vec![],
            cluster_id: None,
            cluster_status: ClusterStatus::Pending,
            similarity_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn article_round_trip() {
        let store = MemoryStore::new();
        store.index_article(&doc("a1", "ff", &[])).await.unwrap();

        let fetched = store.get_article("a1").await.unwrap().unwrap();
        assert_eq!(fetched.article_id, "a1");
        assert!(store.get_article("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_patches_in_place() {
        let store = MemoryStore::new();
        store.index_article(&doc("a1", "ff", &[])).await.unwrap();

        let patch = ArticlePatch::Clustering(ClusteringPatch {
            cluster_status: ClusterStatus::Matched,
            cluster_id: Some("cluster_a1".to_string()),
            similarity_score: Some(1.0),
            updated_at: Utc::now(),
        });
        assert!(store.update_article("a1", &patch).await.unwrap());
        assert!(!store.update_article("missing", &patch).await.unwrap());

        let fetched = store.get_article("a1").await.unwrap().unwrap();
        assert_eq!(fetched.cluster_status, ClusterStatus::Matched);
        assert_eq!(fetched.cluster_id.as_deref(), Some("cluster_a1"));
    }

    #[tokio::test]
    async fn simhash_lookup_is_exact_and_deterministic() {
        let store = MemoryStore::new();
        store.index_article(&doc("b", "aa", &[])).await.unwrap();
        store.index_article(&doc("a", "aa", &[])).await.unwrap();
        store.index_article(&doc("c", "bb", &[])).await.unwrap();

        let hit = store.find_by_simhash("aa").await.unwrap().unwrap();
        assert_eq!(hit.article_id, "a");
        assert!(store.find_by_simhash("00").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn band_candidates_share_a_leading_band() {
        let store = MemoryStore::new();
        store
            .index_article(&doc("a1", "ff", &["b1", "b2"]))
            .await
            .unwrap();
        store
            .index_article(&doc("a2", "ff", &["b2", "b3"]))
            .await
            .unwrap();
        store
            .index_article(&doc("a3", "ff", &["b9"]))
            .await
            .unwrap();

        let hits = store
            .find_band_candidates(&["b2".to_string()], 50)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|d| d.article_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn band_candidates_ignore_bands_past_the_query_cap() {
        let store = MemoryStore::new();
        store
            .index_article(&doc("a1", "ff", &["late"]))
            .await
            .unwrap();

        // "late" only appears as band 21 of the probe signature.
        let mut signature: Vec<String> = (0..LSH_QUERY_BANDS).map(|i| format!("q{i}")).collect();
        signature.push("late".to_string());
        let hits = store.find_band_candidates(&signature, 50).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn cluster_articles_sorted_by_publish_time_desc() {
        let store = MemoryStore::new();
        let mut older = doc("old", "ff", &[]);
        older.cluster_id = Some("cluster_x".to_string());
        older.publish_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut newer = doc("new", "ff", &[]);
        newer.cluster_id = Some("cluster_x".to_string());
        newer.publish_time = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store.index_article(&older).await.unwrap();
        store.index_article(&newer).await.unwrap();

        let hits = store.find_by_cluster("cluster_x", 100).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|d| d.article_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn search_filters_and_paginates() {
        let store = MemoryStore::new();
        for i in 0..25 {
            let mut d = doc(&format!("a{i:02}"), "ff", &[]);
            d.title = format!("integration story {i}");
            d.created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, i).unwrap();
            store.index_article(&d).await.unwrap();
        }
        let mut other = doc("other", "ff", &[]);
        other.title = "unrelated".to_string();
        store.index_article(&other).await.unwrap();

        let query = ArticleQuery {
            page: 2,
            page_size: 10,
            sort: SortSpec::default(),
            title: Some("integration".to_string()),
            ..ArticleQuery::default()
        };
        let page = store.search_articles(&query).await.unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.items.len(), 10);
    }

    #[tokio::test]
    async fn search_filters_by_state_topic_and_range() {
        let store = MemoryStore::new();
        let mut a = doc("a", "ff", &[]);
        a.state = 2;
        a.topic_ids = vec!["t1".to_string()];
        let mut b = doc("b", "ff", &[]);
        b.state = 1;
        b.topic_ids = vec!["t2".to_string()];
        store.index_article(&a).await.unwrap();
        store.index_article(&b).await.unwrap();

        let query = ArticleQuery {
            page: 1,
            page_size: 10,
            state: Some(2),
            topic_ids: vec!["t1".to_string(), "t9".to_string()],
            ..ArticleQuery::default()
        };
        let page = store.search_articles(&query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].article_id, "a");
    }

    #[tokio::test]
    async fn cluster_round_trip_and_delete() {
        let store = MemoryStore::new();
        let cluster = ClusterDoc::new(
            "cluster_a1".to_string(),
            "a1".to_string(),
            vec![],
            Utc::now(),
        );
        store.index_cluster(&cluster).await.unwrap();
        assert!(store.get_cluster("cluster_a1").await.unwrap().is_some());
        assert!(store.delete_cluster("cluster_a1").await.unwrap());
        assert!(!store.delete_cluster("cluster_a1").await.unwrap());
        assert!(store.get_cluster("cluster_a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_all_empties_both_indices() {
        let store = MemoryStore::new();
        store.index_article(&doc("a1", "ff", &[])).await.unwrap();
        store
            .index_cluster(&ClusterDoc::new(
                "cluster_a1".to_string(),
                "a1".to_string(),
                vec![],
                Utc::now(),
            ))
            .await
            .unwrap();

        store.clear_all().await.unwrap();
        assert!(store.get_article("a1").await.unwrap().is_none());
        assert!(store.get_cluster("cluster_a1").await.unwrap().is_none());
    }
}
