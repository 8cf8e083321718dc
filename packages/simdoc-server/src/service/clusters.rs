//! Cluster read paths: the cluster view and the metadata listing.

use std::collections::HashMap;
use std::sync::Arc;

use simdoc_core::model::api::{ClusterListingItem, ClusterListingResponse, ClusterResponse};

use crate::error::ApiError;
use crate::store::{ArticleQuery, DocumentStore, CLUSTER_FETCH_LIMIT};

/// Read operations over cluster documents.
pub struct ClusterService {
    store: Arc<dyn DocumentStore>,
}

impl ClusterService {
    /// Creates the service over a shared store handle.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The cluster document, optionally expanded with its articles sorted
    /// by publish time descending.
    ///
    /// # Errors
    ///
    /// `CLUSTER_NOT_FOUND` when the id is unknown.
    pub async fn get_cluster(
        &self,
        cluster_id: &str,
        include_articles: bool,
        trace_id: &str,
    ) -> Result<ClusterResponse, ApiError> {
        let cluster = self
            .store
            .get_cluster(cluster_id)
            .await?
            .ok_or_else(|| ApiError::ClusterNotFound(cluster_id.to_string()))?;

        let articles = if include_articles {
            let members = self
                .store
                .find_by_cluster(cluster_id, CLUSTER_FETCH_LIMIT)
                .await?;
            Some(members.iter().map(|doc| doc.to_wire()).collect())
        } else {
            None
        };

        Ok(ClusterResponse {
            cluster: cluster.to_wire(),
            articles,
            trace_id: trace_id.to_string(),
        })
    }

    /// Metadata search over articles, each row expanded with the ids of its
    /// cluster peers.
    ///
    /// # Errors
    ///
    /// Store failures surface as [`ApiError::Internal`].
    pub async fn search(&self, query: &ArticleQuery) -> Result<ClusterListingResponse, ApiError> {
        let page = self.store.search_articles(query).await?;

        // One lookup per distinct cluster on the page.
        let mut memberships: HashMap<String, Vec<String>> = HashMap::new();
        let mut items = Vec::with_capacity(page.items.len());
        for doc in &page.items {
            let similar_article_ids = match &doc.cluster_id {
                Some(cluster_id) => {
                    if !memberships.contains_key(cluster_id) {
                        let ids = self
                            .store
                            .get_cluster(cluster_id)
                            .await?
                            .map(|cluster| cluster.article_ids)
                            .unwrap_or_default();
                        memberships.insert(cluster_id.clone(), ids);
                    }
                    memberships[cluster_id]
                        .iter()
                        .filter(|id| *id != &doc.article_id)
                        .cloned()
                        .collect()
                }
                None => Vec::new(),
            };
            items.push(ClusterListingItem {
                article_id: doc.article_id.clone(),
                similar_article_ids,
            });
        }

        let page_size = query.page_size.max(1) as u64;
        Ok(ClusterListingResponse {
            items,
            total: page.total,
            page: query.page,
            page_size: query.page_size,
            total_pages: page.total.div_ceil(page_size),
        })
    }
}
