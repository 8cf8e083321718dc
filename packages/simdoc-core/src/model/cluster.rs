//! Cluster documents: membership, size, and the advisory top terms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Weighted term from the founding article's text. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopTerm {
    pub term: String,
    pub weight: f64,
}

/// The persisted cluster document -- one per `cluster_id`.
///
/// Maintained invariants: `size == article_ids.len()`, `article_ids` is
/// duplicate-free, and `representative_article_id` is a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDoc {
    pub cluster_id: String,
    pub article_ids: Vec<String>,
    pub size: usize,
    pub representative_article_id: String,
    #[serde(default)]
    pub top_terms: Vec<TopTerm>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ClusterDoc {
    /// Creates a singleton cluster founded by `founder_id`.
    ///
    /// The cluster id is passed in rather than derived so missing-cluster
    /// recovery can recreate a document under its original id.
    #[must_use]
    pub fn new(
        cluster_id: String,
        founder_id: String,
        top_terms: Vec<TopTerm>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            cluster_id,
            article_ids: vec![founder_id.clone()],
            size: 1,
            representative_article_id: founder_id,
            top_terms,
            last_updated: now,
            created_at: now,
        }
    }

    /// Appends `article_id` to the membership if absent, refreshing `size`
    /// and `last_updated`. Returns whether the membership changed.
    ///
    /// The representative and the top terms are never touched by appends.
    pub fn append(&mut self, article_id: &str, now: DateTime<Utc>) -> bool {
        if self.article_ids.iter().any(|id| id == article_id) {
            return false;
        }
        self.article_ids.push(article_id.to_string());
        self.size = self.article_ids.len();
        self.last_updated = now;
        true
    }

    /// Unions another membership list in, deduplicating, and refreshes
    /// `size` and `last_updated`.
    pub fn absorb_members(&mut self, members: &[String], now: DateTime<Utc>) {
        for id in members {
            if !self.article_ids.contains(id) {
                self.article_ids.push(id.clone());
            }
        }
        self.size = self.article_ids.len();
        self.last_updated = now;
    }

    /// Projects the document onto its wire representation.
    #[must_use]
    pub fn to_wire(&self) -> Cluster {
        Cluster {
            cluster_id: self.cluster_id.clone(),
            article_ids: self.article_ids.clone(),
            size: self.size,
            representative_article_id: self.representative_article_id.clone(),
            last_updated: self.last_updated,
            top_terms: self.top_terms.clone(),
        }
    }
}

/// Wire view of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Cluster {
    pub cluster_id: String,
    pub article_ids: Vec<String>,
    pub size: usize,
    pub representative_article_id: String,
    pub last_updated: DateTime<Utc>,
    pub top_terms: Vec<TopTerm>,
}
