//! OpenAPI document assembly for the `simdoc openapi` command.

use utoipa::OpenApi;

use simdoc_core::model::api::{
    ArticleCreate, ArticleResponse, ClusterListingItem, ClusterListingResponse, ClusterResponse,
    ErrorDetail, ErrorResponse, HealthCheckResponse, HealthComponents, HealthStatus,
    RecheckRequest, RecheckResponse, SimilarArticleEntry, SimilarArticlesResponse,
};
use simdoc_core::model::{Article, ArticleTag, ArticleTopic, Cluster, ClusterStatus, TopTerm};

use super::handlers::{articles, clusters, system};

/// The service's OpenAPI description.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "sim-doc-cluster",
        description = "Near-duplicate article clustering service"
    ),
    paths(
        articles::submit_article,
        articles::get_article,
        articles::get_similar_articles,
        articles::recheck_articles,
        clusters::get_cluster_detail,
        clusters::list_clusters,
        system::health_check,
    ),
    components(schemas(
        Article,
        ArticleCreate,
        ArticleResponse,
        ArticleTag,
        ArticleTopic,
        Cluster,
        ClusterListingItem,
        ClusterListingResponse,
        ClusterResponse,
        ClusterStatus,
        ErrorDetail,
        ErrorResponse,
        HealthCheckResponse,
        HealthComponents,
        HealthStatus,
        RecheckRequest,
        RecheckResponse,
        SimilarArticleEntry,
        SimilarArticlesResponse,
        TopTerm,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/api/v1/articles/",
            "/api/v1/articles/{article_id}",
            "/api/v1/articles/{article_id}/similar",
            "/api/v1/articles/recheck",
            "/api/v1/clusters/",
            "/api/v1/clusters/{cluster_id}",
            "/api/v1/system/health",
        ] {
            assert!(
                paths.iter().any(|path| *path == expected),
                "missing path {expected}"
            );
        }
    }

    #[test]
    fn document_serializes_to_json() {
        let json = ApiDoc::openapi().to_pretty_json().unwrap();
        assert!(json.contains("sim-doc-cluster"));
    }
}
