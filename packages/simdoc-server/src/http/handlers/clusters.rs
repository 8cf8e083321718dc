//! Cluster endpoints: detail and the filtered listing.

use axum::extract::{Path, State};
use axum::Json;
use axum_extra::extract::Query;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use simdoc_core::model::api::{
    is_valid_cluster_id, ClusterListingResponse, ClusterResponse,
};

use super::{ApiFailure, TraceId};
use crate::error::ApiError;
use crate::http::AppState;
use crate::store::{ArticleQuery, SortSpec};

#[derive(Debug, Deserialize)]
pub struct ClusterDetailParams {
    #[serde(default)]
    include_articles: bool,
}

/// Cluster detail, optionally expanded with its articles.
#[utoipa::path(
    get,
    path = "/api/v1/clusters/{cluster_id}",
    tag = "clusters",
    params(
        ("cluster_id" = String, Path, description = "Cluster id"),
        ("include_articles" = Option<bool>, Query, description = "Expand member articles"),
    ),
    responses(
        (status = 200, body = ClusterResponse),
        (status = 400, description = "Invalid cluster id"),
        (status = 404, description = "Unknown cluster"),
    )
)]
pub async fn get_cluster_detail(
    State(state): State<AppState>,
    trace: TraceId,
    Path(cluster_id): Path<String>,
    Query(params): Query<ClusterDetailParams>,
) -> Result<Json<ClusterResponse>, ApiFailure> {
    if !is_valid_cluster_id(&cluster_id) {
        return Err(trace.fail(ApiError::InvalidArgument(format!(
            "Invalid cluster_id: {cluster_id}"
        ))));
    }
    let response = state
        .services
        .clusters
        .get_cluster(&cluster_id, params.include_articles, &trace.0)
        .await
        .map_err(|err| trace.fail(err))?;
    Ok(Json(response))
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct ClusterListParams {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_page_size")]
    page_size: usize,
    sort: Option<String>,
    state: Option<u8>,
    top: Option<u8>,
    title: Option<String>,
    /// Source platform id.
    source: Option<i64>,
    start_time: Option<String>,
    end_time: Option<String>,
    tag_id: Option<String>,
    /// Topic ids; the parameter repeats for multi-select.
    #[serde(default)]
    topic: Vec<String>,
}

fn parse_time(
    raw: Option<&String>,
    field: &str,
    trace: &TraceId,
) -> Result<Option<DateTime<Utc>>, ApiFailure> {
    match raw {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(|_| {
                trace.fail(ApiError::InvalidArgument(format!(
                    "Invalid {field}: {raw}"
                )))
            }),
    }
}

impl ClusterListParams {
    fn into_query(self, trace: &TraceId) -> Result<ArticleQuery, ApiFailure> {
        if self.page == 0 {
            return Err(trace.fail(ApiError::InvalidArgument(
                "page must be at least 1".to_string(),
            )));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(trace.fail(ApiError::InvalidArgument(
                "page_size must be between 1 and 100".to_string(),
            )));
        }
        if matches!(self.state, Some(state) if state > 2) {
            return Err(trace.fail(ApiError::InvalidArgument(
                "state must be between 0 and 2".to_string(),
            )));
        }
        if matches!(self.top, Some(top) if top > 1) {
            return Err(trace.fail(ApiError::InvalidArgument(
                "top must be 0 or 1".to_string(),
            )));
        }
        let sort = match &self.sort {
            None => SortSpec::default(),
            Some(raw) => raw
                .parse()
                .map_err(|err: crate::store::SortSpecError| {
                    trace.fail(ApiError::InvalidArgument(err.to_string()))
                })?,
        };
        let start_time = parse_time(self.start_time.as_ref(), "start_time", trace)?;
        let end_time = parse_time(self.end_time.as_ref(), "end_time", trace)?;

        Ok(ArticleQuery {
            page: self.page,
            page_size: self.page_size,
            sort,
            state: self.state,
            top: self.top,
            title: self.title,
            source: self.source.map(|source| source.to_string()),
            start_time,
            end_time,
            tag_id: self.tag_id,
            topic_ids: self.topic,
        })
    }
}

/// Metadata search over articles, each row carrying its cluster peers.
#[utoipa::path(
    get,
    path = "/api/v1/clusters/",
    tag = "clusters",
    params(
        ("page" = Option<usize>, Query, description = "1-based page number"),
        ("page_size" = Option<usize>, Query, description = "Items per page, at most 100"),
        ("sort" = Option<String>, Query, description = "field:asc|desc"),
        ("state" = Option<u8>, Query, description = "Visibility state 0..2"),
        ("top" = Option<u8>, Query, description = "Pinned flag 0..1"),
        ("title" = Option<String>, Query, description = "Title keywords"),
        ("source" = Option<i64>, Query, description = "Source platform id"),
        ("start_time" = Option<String>, Query, description = "Publish-time lower bound (RFC 3339)"),
        ("end_time" = Option<String>, Query, description = "Publish-time upper bound (RFC 3339)"),
        ("tag_id" = Option<String>, Query, description = "Tag id"),
        ("topic" = Option<Vec<String>>, Query, description = "Topic ids (repeatable)"),
    ),
    responses(
        (status = 200, body = ClusterListingResponse),
        (status = 400, description = "Invalid filter or sort"),
        (status = 500, description = "Backend failure"),
    )
)]
pub async fn list_clusters(
    State(state): State<AppState>,
    trace: TraceId,
    Query(params): Query<ClusterListParams>,
) -> Result<Json<ClusterListingResponse>, ApiFailure> {
    let query = params.into_query(&trace)?;
    let response = state
        .services
        .clusters
        .search(&query)
        .await
        .map_err(|err| trace.fail(err))?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> TraceId {
        TraceId("t".to_string())
    }

    fn params() -> ClusterListParams {
        ClusterListParams {
            page: 1,
            page_size: 20,
            sort: None,
            state: None,
            top: None,
            title: None,
            source: None,
            start_time: None,
            end_time: None,
            tag_id: None,
            topic: vec![],
        }
    }

    #[test]
    fn page_size_boundary() {
        let mut p = params();
        p.page_size = 100;
        assert!(p.into_query(&trace()).is_ok());

        let mut p = params();
        p.page_size = 101;
        assert!(p.into_query(&trace()).is_err());

        let mut p = params();
        p.page_size = 0;
        assert!(p.into_query(&trace()).is_err());
    }

    #[test]
    fn state_and_top_bounds() {
        let mut p = params();
        p.state = Some(3);
        assert!(p.into_query(&trace()).is_err());

        let mut p = params();
        p.top = Some(2);
        assert!(p.into_query(&trace()).is_err());
    }

    #[test]
    fn sort_spec_and_times_are_parsed() {
        let mut p = params();
        p.sort = Some("created_at:asc".to_string());
        p.start_time = Some("2024-05-01T00:00:00Z".to_string());
        let query = p.into_query(&trace()).unwrap();
        assert!(query.start_time.is_some());

        let mut p = params();
        p.sort = Some("title:asc".to_string());
        assert!(p.into_query(&trace()).is_err());

        let mut p = params();
        p.end_time = Some("yesterday".to_string());
        assert!(p.into_query(&trace()).is_err());
    }

    #[test]
    fn source_id_becomes_a_term_string() {
        let mut p = params();
        p.source = Some(42);
        let query = p.into_query(&trace()).unwrap();
        assert_eq!(query.source.as_deref(), Some("42"));
    }
}
