//! Article documents and their wire representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of an article's cluster assignment.
///
/// `Pending` means the asynchronous re-score has not finalized yet;
/// `Matched` articles carry a cluster id and appear in that cluster's
/// membership; `Unique` articles have no cluster id and no score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Pending,
    Matched,
    Unique,
}

impl ClusterStatus {
    /// Wire spelling of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::Unique => "unique",
        }
    }
}

/// Tag attached to an article. Tag ids can be large (64-bit) values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ArticleTag {
    pub id: i64,
    pub name: String,
}

/// Topic attached to an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ArticleTopic {
    pub id: String,
    pub name: String,
}

/// The persisted article document -- one per `article_id`.
///
/// Carries the raw content, the derived features used for candidate
/// retrieval and re-scoring, and the clustering state. The wire view
/// ([`Article`]) omits the content and the feature fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDoc {
    pub article_id: String,
    pub title: String,
    pub content: String,
    pub publish_time: DateTime<Utc>,
    pub source: String,
    pub state: u8,
    pub top: u8,
    #[serde(default)]
    pub tags: Vec<ArticleTag>,
    #[serde(default)]
    pub topic: Vec<ArticleTopic>,
    /// Tag ids as strings, denormalized for term filtering.
    #[serde(default)]
    pub tag_ids: Vec<String>,
    /// Topic ids, denormalized for term filtering.
    #[serde(default)]
    pub topic_ids: Vec<String>,
    #[serde(default)]
    pub simhash: String,
    #[serde(default)]
    pub minhash_signature: Vec<String>,
    #[serde(default)]
    pub shingles: Vec<String>,
    pub cluster_id: Option<String>,
    pub cluster_status: ClusterStatus,
    pub similarity_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArticleDoc {
    /// The text features are extracted from: title and content joined by a
    /// single space.
    #[must_use]
    pub fn full_text(&self) -> String {
        format!("{} {}", self.title, self.content)
    }

    /// Projects the document onto its wire representation.
    #[must_use]
    pub fn to_wire(&self) -> Article {
        Article {
            article_id: self.article_id.clone(),
            title: self.title.clone(),
            publish_time: self.publish_time,
            source: self.source.clone(),
            state: self.state,
            top: self.top,
            tags: self.tags.clone(),
            topic: self.topic.clone(),
            cluster_id: self.cluster_id.clone(),
            cluster_status: self.cluster_status,
            similarity_score: self.similarity_score,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Wire view of an article: clustering state plus display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Article {
    pub article_id: String,
    pub title: String,
    pub publish_time: DateTime<Utc>,
    pub source: String,
    pub state: u8,
    pub top: u8,
    pub tags: Vec<ArticleTag>,
    pub topic: Vec<ArticleTopic>,
    pub cluster_id: Option<String>,
    pub cluster_status: ClusterStatus,
    pub similarity_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn doc() -> ArticleDoc {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ArticleDoc {
            article_id: "a1".to_string(),
            title: "Fire".to_string(),
            content: "Fire in Tai Po".to_string(),
            publish_time: now,
            source: "wire".to_string(),
            state: 1,
            top: 0,
            tags: vec![ArticleTag {
                id: 9_007_199_254_740_993,
                name: "local".to_string(),
            }],
            topic: vec![ArticleTopic {
                id: "t1".to_string(),
                name: "incidents".to_string(),
            }],
            tag_ids: vec!["9007199254740993".to_string()],
            topic_ids: vec!["t1".to_string()],
            simhash: "00ff".to_string(),
            minhash_signature: vec!["aabbccdd".to_string()],
            shingles: vec!["fire ".to_string()],
            cluster_id: None,
            cluster_status: ClusterStatus::Pending,
            similarity_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn full_text_joins_title_and_content() {
        assert_eq!(doc().full_text(), "Fire Fire in Tai Po");
    }

    #[test]
    fn wire_view_drops_content_and_features() {
        let wire = serde_json::to_value(doc().to_wire()).unwrap();
        assert!(wire.get("content").is_none());
        assert!(wire.get("simhash").is_none());
        assert!(wire.get("shingles").is_none());
        assert_eq!(wire["article_id"], "a1");
        assert_eq!(wire["cluster_status"], "pending");
        // Explicit nulls, not omissions.
        assert!(wire["cluster_id"].is_null());
        assert!(wire["similarity_score"].is_null());
    }

    #[test]
    fn status_round_trips_lowercase() {
        for (status, text) in [
            (ClusterStatus::Pending, "\"pending\""),
            (ClusterStatus::Matched, "\"matched\""),
            (ClusterStatus::Unique, "\"unique\""),
        ] {
            assert_eq!(serde_json::to_string(&status).unwrap(), text);
            let parsed: ClusterStatus = serde_json::from_str(text).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn document_round_trips_through_json() {
        let original = doc();
        let json = serde_json::to_string(&original).unwrap();
        let parsed: ArticleDoc = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn missing_feature_fields_default_to_empty() {
        let json = serde_json::json!({
            "article_id": "a2",
            "title": "t",
            "content": "c",
            "publish_time": "2024-05-01T12:00:00Z",
            "source": "s",
            "state": 1,
            "top": 0,
            "cluster_id": null,
            "cluster_status": "pending",
            "similarity_score": null,
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": "2024-05-01T12:00:00Z"
        });
        let parsed: ArticleDoc = serde_json::from_value(json).unwrap();
        assert!(parsed.simhash.is_empty());
        assert!(parsed.minhash_signature.is_empty());
        assert!(parsed.shingles.is_empty());
        assert!(parsed.tags.is_empty());
    }
}
