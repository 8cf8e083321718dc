//! Business services over the store and queue handles.
//!
//! Construction is explicit dependency injection: handles are built once at
//! startup and shared immutably via `Arc`.

pub mod articles;
pub mod clusters;
pub mod health;

use std::sync::Arc;

use simdoc_core::config::ConfigError;
use simdoc_core::FeatureExtractor;

use crate::config::AppConfig;
use crate::queue::JobQueue;
use crate::store::DocumentStore;

pub use articles::ArticleService;
pub use clusters::ClusterService;
pub use health::HealthService;

/// The wired service set shared by the HTTP surface and the CLI.
#[derive(Clone)]
pub struct Services {
    pub articles: Arc<ArticleService>,
    pub clusters: Arc<ClusterService>,
    pub health: Arc<HealthService>,
}

impl Services {
    /// Wires the services over the given backends.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the similarity configuration is
    /// inconsistent.
    pub fn build(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Result<Self, ConfigError> {
        let extractor = FeatureExtractor::new(config.similarity.clone())?;
        Ok(Self {
            articles: Arc::new(ArticleService::new(
                Arc::clone(&store),
                Arc::clone(&queue),
                extractor,
            )),
            clusters: Arc::new(ClusterService::new(Arc::clone(&store))),
            health: Arc::new(HealthService::new(store, queue)),
        })
    }
}
