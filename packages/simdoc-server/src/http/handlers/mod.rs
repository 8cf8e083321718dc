//! Request handlers and the request-scoped error plumbing.

pub mod articles;
pub mod clusters;
pub mod system;

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use simdoc_core::model::api::{ErrorDetail, ErrorResponse};

use crate::error::ApiError;

pub use articles::{get_article, get_similar_articles, recheck_articles, submit_article};
pub use clusters::{get_cluster_detail, list_clusters};
pub use system::health_check;

/// The per-request trace id.
///
/// Reads the `x-request-id` header assigned by the request-id middleware;
/// falls back to a fresh UUID if the stack did not run (e.g. in isolated
/// handler tests).
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

impl TraceId {
    /// Wraps an [`ApiError`] with this request's trace id for the wire.
    #[must_use]
    pub fn fail(&self, error: ApiError) -> ApiFailure {
        ApiFailure {
            error,
            trace_id: self.0.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for TraceId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trace_id = parts
            .headers
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);
        Ok(Self(trace_id))
    }
}

/// An [`ApiError`] bound to a request, rendered as the error envelope.
#[derive(Debug)]
pub struct ApiFailure {
    pub error: ApiError,
    pub trace_id: String,
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error.code().to_string(),
                message: self.error.to_string(),
            },
            trace_id: self.trace_id,
        };
        (self.error.status(), Json(body)).into_response()
    }
}
