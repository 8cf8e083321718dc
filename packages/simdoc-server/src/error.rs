//! The error taxonomy surfaced to API clients.
//!
//! Services return [`ApiError`]; the HTTP layer is a thin translator from
//! these variants to status codes and the `{error: {code, message},
//! trace_id}` envelope. Store and queue failures are wrapped as `Internal`
//! at the service boundary.

use axum::http::StatusCode;

use simdoc_core::model::ValidationError;

use crate::queue::QueueError;
use crate::store::StoreError;

/// API-visible failure.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Article not found: {0}")]
    ArticleNotFound(String),
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),
    #[error("Article similarity processing is not yet complete")]
    ClusterPending,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::ArticleNotFound(_) => "ARTICLE_NOT_FOUND",
            Self::ClusterNotFound(_) => "CLUSTER_NOT_FOUND",
            Self::ClusterPending => "CLUSTER_PENDING",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::ArticleNotFound(_) | Self::ClusterNotFound(_) | Self::ClusterPending => {
                StatusCode::NOT_FOUND
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.into())
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self::Internal(err.into())
    }
}
