//! HTTP surface: router assembly, shared state, and the serve loop.
//!
//! The HTTP layer is a thin translator: handlers validate input, call a
//! service, and map [`ApiError`](crate::error::ApiError) variants onto
//! status codes and the error envelope. All domain logic lives in the
//! services.

pub mod handlers;
pub mod middleware;
pub mod openapi;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::AppConfig;
use crate::service::Services;

use self::handlers::{
    get_article, get_cluster_detail, get_similar_articles, health_check, list_clusters,
    recheck_articles, submit_article,
};
use self::middleware::build_http_layers;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Services,
}

/// Assembles the full router: the v1 API nested under the configured
/// prefix, wrapped in the transport middleware stack.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/articles/", post(submit_article))
        .route("/articles/recheck", post(recheck_articles))
        .route("/articles/{article_id}", get(get_article))
        .route("/articles/{article_id}/similar", get(get_similar_articles))
        .route("/clusters/", get(list_clusters))
        .route("/clusters/{cluster_id}", get(get_cluster_detail))
        .route("/system/health", get(health_check));

    let layers = build_http_layers(&state.config);

    Router::new()
        .nest(&state.config.api_v1_prefix, api)
        .layer(layers)
        .with_state(state)
}

/// Binds the configured address and serves until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error when the address cannot be bound or the server hits a
/// fatal I/O error.
pub async fn serve(
    config: Arc<AppConfig>,
    services: Services,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let state = AppState {
        config: Arc::clone(&config),
        services,
    };
    let router = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!(
        addr = %listener.local_addr()?,
        prefix = %config.api_v1_prefix,
        "API server listening"
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("API server stopped");
    Ok(())
}
