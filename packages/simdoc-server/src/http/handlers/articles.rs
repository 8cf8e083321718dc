//! Article endpoints: submission, detail, similar peers, and recheck.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use simdoc_core::model::api::{
    is_valid_article_id, ArticleCreate, ArticleResponse, RecheckRequest, RecheckResponse,
    SimilarArticlesResponse,
};

use super::{ApiFailure, TraceId};
use crate::error::ApiError;
use crate::http::AppState;

fn require_article_id(article_id: &str, trace: &TraceId) -> Result<(), ApiFailure> {
    if is_valid_article_id(article_id) {
        Ok(())
    } else {
        Err(trace.fail(ApiError::InvalidArgument(format!(
            "Invalid article_id: {article_id}"
        ))))
    }
}

/// Submit an article for near-duplicate clustering.
///
/// Idempotent upsert: re-submitting a known id refreshes its metadata and
/// neither re-extracts features nor re-enqueues a job.
#[utoipa::path(
    post,
    path = "/api/v1/articles/",
    tag = "articles",
    request_body = ArticleCreate,
    responses(
        (status = 200, description = "Accepted"),
        (status = 400, description = "Validation failure"),
        (status = 500, description = "Backend failure"),
    )
)]
pub async fn submit_article(
    State(state): State<AppState>,
    trace: TraceId,
    Json(payload): Json<ArticleCreate>,
) -> Result<Json<Value>, ApiFailure> {
    payload
        .validate()
        .map_err(|err| trace.fail(err.into()))?;
    state
        .services
        .articles
        .submit_article(&payload)
        .await
        .map_err(|err| trace.fail(err))?;
    Ok(Json(json!({})))
}

/// Article detail with its cluster inlined.
#[utoipa::path(
    get,
    path = "/api/v1/articles/{article_id}",
    tag = "articles",
    params(("article_id" = String, Path, description = "Article id")),
    responses(
        (status = 200, body = ArticleResponse),
        (status = 400, description = "Invalid article id"),
        (status = 404, description = "Unknown article"),
    )
)]
pub async fn get_article(
    State(state): State<AppState>,
    trace: TraceId,
    Path(article_id): Path<String>,
) -> Result<Json<ArticleResponse>, ApiFailure> {
    require_article_id(&article_id, &trace)?;
    let response = state
        .services
        .articles
        .get_article(&article_id, &trace.0)
        .await
        .map_err(|err| trace.fail(err))?;
    Ok(Json(response))
}

/// The other members of the article's cluster.
#[utoipa::path(
    get,
    path = "/api/v1/articles/{article_id}/similar",
    tag = "articles",
    params(("article_id" = String, Path, description = "Article id")),
    responses(
        (status = 200, body = SimilarArticlesResponse),
        (status = 400, description = "Invalid article id"),
        (status = 404, description = "Clustering not finalized"),
    )
)]
pub async fn get_similar_articles(
    State(state): State<AppState>,
    trace: TraceId,
    Path(article_id): Path<String>,
) -> Result<Json<SimilarArticlesResponse>, ApiFailure> {
    require_article_id(&article_id, &trace)?;
    let response = state
        .services
        .articles
        .get_similar(&article_id, &trace.0)
        .await
        .map_err(|err| trace.fail(err))?;
    Ok(Json(response))
}

/// Reset articles to `pending` and re-enqueue their re-score jobs.
#[utoipa::path(
    post,
    path = "/api/v1/articles/recheck",
    tag = "articles",
    request_body = RecheckRequest,
    responses(
        (status = 200, body = RecheckResponse),
        (status = 400, description = "Validation failure"),
        (status = 500, description = "Backend failure"),
    )
)]
pub async fn recheck_articles(
    State(state): State<AppState>,
    trace: TraceId,
    Json(request): Json<RecheckRequest>,
) -> Result<Json<RecheckResponse>, ApiFailure> {
    request
        .validate()
        .map_err(|err| trace.fail(err.into()))?;
    let response = state
        .services
        .articles
        .recheck(&request, &trace.0)
        .await
        .map_err(|err| trace.fail(err))?;
    Ok(Json(response))
}
