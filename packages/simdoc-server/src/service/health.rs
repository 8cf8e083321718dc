//! System health checks over the store, the queue, and the worker backlog.

use chrono::Utc;
use std::sync::Arc;

use simdoc_core::model::api::{HealthCheckResponse, HealthComponents, HealthStatus};

use crate::queue::JobQueue;
use crate::store::DocumentStore;

/// Queue depth above which the worker component reports `warn`.
const WORKER_BACKLOG_WARN: u64 = 1000;

/// Component health aggregation.
pub struct HealthService {
    store: Arc<dyn DocumentStore>,
    queue: Arc<dyn JobQueue>,
}

impl HealthService {
    /// Creates the service over shared backend handles.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Probes each component and aggregates the overall verdict: `fail` if
    /// any component fails, else `warn` if any warns, else `pass`.
    ///
    /// The worker component is judged by queue backlog -- a deep queue means
    /// re-scores are falling behind, but it is advisory, never `fail`.
    pub async fn check(&self) -> HealthCheckResponse {
        let elasticsearch = if self.store.ping().await {
            HealthStatus::Pass
        } else {
            HealthStatus::Fail
        };
        let redis = if self.queue.ping().await {
            HealthStatus::Pass
        } else {
            HealthStatus::Fail
        };
        let worker = match self.queue.queue_len().await {
            Ok(depth) if depth > WORKER_BACKLOG_WARN => HealthStatus::Warn,
            Ok(_) => HealthStatus::Pass,
            Err(_) => HealthStatus::Fail,
        };

        let components = HealthComponents {
            elasticsearch,
            redis,
            worker,
        };
        let status = if [elasticsearch, redis, worker].contains(&HealthStatus::Fail) {
            HealthStatus::Fail
        } else if worker == HealthStatus::Warn {
            HealthStatus::Warn
        } else {
            HealthStatus::Pass
        };

        HealthCheckResponse {
            status,
            components,
            timestamp: Utc::now(),
        }
    }
}
