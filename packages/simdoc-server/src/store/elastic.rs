//! Elasticsearch [`DocumentStore`] adapter over the HTTP API.
//!
//! All writes pass `refresh=wait_for` so the next read observes them -- the
//! exact-duplicate fast path requires seeing the founder it just patched.
//! Indices are created by `simdoc init` and lazily on the first write that
//! hits a missing index.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use simdoc_core::model::{ArticleDoc, ClusterDoc};

use super::{
    ArticlePatch, ArticleQuery, DocumentStore, SearchPage, StoreError, LSH_QUERY_BANDS,
};
use crate::config::EsConfig;

/// Elasticsearch-backed document store.
pub struct ElasticStore {
    http: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    articles_index: String,
    clusters_index: String,
}

#[derive(Debug, Deserialize)]
struct GetResponse<T> {
    #[serde(rename = "_source")]
    source: T,
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    hits: SearchHits<T>,
}

#[derive(Debug, Deserialize)]
struct SearchHits<T> {
    #[serde(default)]
    total: Option<TotalField>,
    hits: Vec<SearchHit<T>>,
}

#[derive(Debug, Deserialize)]
struct SearchHit<T> {
    #[serde(rename = "_source")]
    source: T,
}

/// `hits.total` is an object on modern clusters and a bare number on old
/// ones (or with `rest_total_hits_as_int`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalField {
    Object { value: u64 },
    Number(u64),
}

impl TotalField {
    fn value(&self) -> u64 {
        match self {
            Self::Object { value } | Self::Number(value) => *value,
        }
    }
}

impl ElasticStore {
    /// Creates an adapter for the configured cluster.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn new(config: &EsConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .build()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: config.url(),
            username: config.username.clone(),
            password: config.password.clone(),
            articles_index: config.articles_index_full(),
            clusters_index: config.clusters_index_full(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        builder
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))
    }

    async fn rejected(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StoreError::Rejected { status, body }
    }

    async fn get_doc<T>(&self, index: &str, id: &str) -> Result<Option<T>, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::GET, &format!("/{index}/_doc/{id}")))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let parsed: GetResponse<T> = response
                    .json()
                    .await
                    .map_err(|err| StoreError::Corrupt(err.to_string()))?;
                Ok(Some(parsed.source))
            }
            _ => Err(Self::rejected(response).await),
        }
    }

    async fn put_doc(&self, index: &str, id: &str, body: &Value) -> Result<(), StoreError> {
        let response = self
            .send(
                self.request(Method::PUT, &format!("/{index}/_doc/{id}"))
                    .query(&[("refresh", "wait_for")])
                    .json(body),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            // Index not created yet: initialize lazily and retry once.
            self.ensure_indices().await?;
            let retry = self
                .send(
                    self.request(Method::PUT, &format!("/{index}/_doc/{id}"))
                        .query(&[("refresh", "wait_for")])
                        .json(body),
                )
                .await?;
            if !retry.status().is_success() {
                return Err(Self::rejected(retry).await);
            }
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(())
    }

    async fn update_doc(&self, index: &str, id: &str, doc: &Value) -> Result<bool, StoreError> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/{index}/_update/{id}"))
                    .query(&[("refresh", "wait_for")])
                    .json(&json!({ "doc": doc })),
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::rejected(response).await),
        }
    }

    async fn search<T>(&self, index: &str, body: &Value) -> Result<(Vec<T>, u64), StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .send(
                self.request(Method::POST, &format!("/{index}/_search"))
                    .json(body),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        let parsed: SearchResponse<T> = response
            .json()
            .await
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let hits: Vec<T> = parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| hit.source)
            .collect();
        let total = parsed
            .hits
            .total
            .as_ref()
            .map_or(hits.len() as u64, TotalField::value);
        Ok((hits, total))
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let response = self.send(self.request(Method::HEAD, &format!("/{index}"))).await?;
        Ok(response.status().is_success())
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), StoreError> {
        let response = self
            .send(self.request(Method::PUT, &format!("/{index}")).json(body))
            .await?;
        if response.status().is_success() {
            info!(index, "created index");
            return Ok(());
        }
        // Racing creators: treat resource_already_exists as success.
        let status = response.status().as_u16();
        let body_text = response.text().await.unwrap_or_default();
        if body_text.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(StoreError::Rejected {
            status,
            body: body_text,
        })
    }

    async fn delete_index(&self, index: &str) -> Result<(), StoreError> {
        let response = self
            .send(self.request(Method::DELETE, &format!("/{index}")))
            .await?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::rejected(response).await)
        }
    }

    fn articles_mapping() -> Value {
        json!({
            "mappings": {
                "properties": {
                    "article_id": {"type": "keyword"},
                    "title": {"type": "text"},
                    "content": {"type": "text"},
                    "publish_time": {"type": "date"},
                    "source": {"type": "keyword"},
                    "state": {"type": "integer"},
                    "top": {"type": "integer"},
                    "tags": {
                        "type": "object",
                        "properties": {
                            // Tag ids can exceed the integer range.
                            "id": {"type": "long"},
                            "name": {"type": "keyword"}
                        }
                    },
                    "topic": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "keyword"},
                            "name": {"type": "keyword"}
                        }
                    },
                    "tag_ids": {"type": "keyword"},
                    "topic_ids": {"type": "keyword"},
                    "simhash": {"type": "keyword"},
                    "minhash_signature": {"type": "keyword"},
                    "shingles": {"type": "keyword", "index": false},
                    "cluster_id": {"type": "keyword"},
                    "cluster_status": {"type": "keyword"},
                    "similarity_score": {"type": "float"},
                    "created_at": {"type": "date"},
                    "updated_at": {"type": "date"}
                }
            },
            "settings": {
                "number_of_shards": 1,
                "number_of_replicas": 0
            }
        })
    }

    fn clusters_mapping() -> Value {
        json!({
            "mappings": {
                "properties": {
                    "cluster_id": {"type": "keyword"},
                    "article_ids": {"type": "keyword"},
                    "size": {"type": "integer"},
                    "representative_article_id": {"type": "keyword"},
                    "top_terms": {"type": "object", "enabled": false},
                    "last_updated": {"type": "date"},
                    "created_at": {"type": "date"}
                }
            },
            "settings": {
                "number_of_shards": 1,
                "number_of_replicas": 0
            }
        })
    }

    fn search_query(query: &ArticleQuery) -> Value {
        let mut filters: Vec<Value> = Vec::new();
        if let Some(state) = query.state {
            filters.push(json!({"term": {"state": state}}));
        }
        if let Some(top) = query.top {
            filters.push(json!({"term": {"top": top}}));
        }
        if let Some(source) = &query.source {
            filters.push(json!({"term": {"source": source}}));
        }
        if let Some(tag_id) = &query.tag_id {
            filters.push(json!({"term": {"tag_ids": tag_id}}));
        }
        if !query.topic_ids.is_empty() {
            filters.push(json!({"terms": {"topic_ids": query.topic_ids}}));
        }
        if query.start_time.is_some() || query.end_time.is_some() {
            let mut range = serde_json::Map::new();
            if let Some(start) = query.start_time {
                range.insert("gte".to_string(), json!(start));
            }
            if let Some(end) = query.end_time {
                range.insert("lte".to_string(), json!(end));
            }
            filters.push(json!({"range": {"publish_time": Value::Object(range)}}));
        }

        let mut bool_query = json!({"filter": filters});
        if let Some(title) = &query.title {
            bool_query["must"] = json!([
                {"match": {"title": {"query": title, "operator": "and"}}}
            ]);
        }

        let mut sort_entry = serde_json::Map::new();
        sort_entry.insert(
            query.sort.field.as_str().to_string(),
            json!({"order": query.sort.order.as_str()}),
        );

        json!({
            "query": {"bool": bool_query},
            "from": query.page.saturating_sub(1) * query.page_size,
            "size": query.page_size,
            "sort": [Value::Object(sort_entry)],
            "track_total_hits": true
        })
    }
}

#[async_trait]
impl DocumentStore for ElasticStore {
    async fn ping(&self) -> bool {
        match self.send(self.request(Method::GET, "/")).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn ensure_indices(&self) -> Result<(), StoreError> {
        if !self.index_exists(&self.articles_index).await? {
            self.create_index(&self.articles_index, &Self::articles_mapping())
                .await?;
        }
        if !self.index_exists(&self.clusters_index).await? {
            self.create_index(&self.clusters_index, &Self::clusters_mapping())
                .await?;
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.delete_index(&self.articles_index).await?;
        self.delete_index(&self.clusters_index).await?;
        self.ensure_indices().await
    }

    async fn index_article(&self, doc: &ArticleDoc) -> Result<(), StoreError> {
        let body =
            serde_json::to_value(doc).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.put_doc(&self.articles_index, &doc.article_id, &body).await
    }

    async fn get_article(&self, article_id: &str) -> Result<Option<ArticleDoc>, StoreError> {
        self.get_doc(&self.articles_index, article_id).await
    }

    async fn update_article(
        &self,
        article_id: &str,
        patch: &ArticlePatch,
    ) -> Result<bool, StoreError> {
        self.update_doc(&self.articles_index, article_id, &patch.to_doc())
            .await
    }

    async fn find_by_simhash(&self, simhash: &str) -> Result<Option<ArticleDoc>, StoreError> {
        let body = json!({
            "query": {"term": {"simhash": simhash}},
            "size": 1
        });
        let (hits, _) = self.search::<ArticleDoc>(&self.articles_index, &body).await?;
        Ok(hits.into_iter().next())
    }

    async fn find_band_candidates(
        &self,
        signature: &[String],
        limit: usize,
    ) -> Result<Vec<ArticleDoc>, StoreError> {
        let bands = &signature[..signature.len().min(LSH_QUERY_BANDS)];
        let should: Vec<Value> = bands
            .iter()
            .map(|band| json!({"term": {"minhash_signature": band}}))
            .collect();
        let body = json!({
            "query": {
                "bool": {
                    "should": should,
                    "minimum_should_match": 1
                }
            },
            "size": limit
        });
        let (hits, _) = self.search::<ArticleDoc>(&self.articles_index, &body).await?;
        Ok(hits)
    }

    async fn find_by_cluster(
        &self,
        cluster_id: &str,
        limit: usize,
    ) -> Result<Vec<ArticleDoc>, StoreError> {
        let body = json!({
            "query": {"term": {"cluster_id": cluster_id}},
            "size": limit,
            "sort": [{"publish_time": {"order": "desc"}}]
        });
        let (hits, _) = self.search::<ArticleDoc>(&self.articles_index, &body).await?;
        Ok(hits)
    }

    async fn search_articles(&self, query: &ArticleQuery) -> Result<SearchPage, StoreError> {
        let body = Self::search_query(query);
        let (items, total) = self.search::<ArticleDoc>(&self.articles_index, &body).await?;
        Ok(SearchPage { items, total })
    }

    async fn index_cluster(&self, doc: &ClusterDoc) -> Result<(), StoreError> {
        let body =
            serde_json::to_value(doc).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.put_doc(&self.clusters_index, &doc.cluster_id, &body).await
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<Option<ClusterDoc>, StoreError> {
        self.get_doc(&self.clusters_index, cluster_id).await
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<bool, StoreError> {
        let response = self
            .send(
                self.request(
                    Method::DELETE,
                    &format!("/{}/_doc/{cluster_id}", self.clusters_index),
                )
                .query(&[("refresh", "wait_for")]),
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::rejected(response).await),
        }
    }
}
