//! System endpoints.

use axum::extract::State;
use axum::Json;

use simdoc_core::model::api::HealthCheckResponse;

use crate::http::AppState;

/// Component health. Always 200 -- the `status` field carries the verdict,
/// so monitors can distinguish degraded from unreachable.
#[utoipa::path(
    get,
    path = "/api/v1/system/health",
    tag = "system",
    responses((status = 200, body = HealthCheckResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(state.services.health.check().await)
}
