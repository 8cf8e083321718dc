//! simdoc core -- deterministic building blocks for near-duplicate article
//! clustering: feature extraction (character shingles, SimHash, banded
//! MinHash), similarity primitives (Jaccard, Hamming, merge selection), and
//! the article/cluster/job data model shared by the submitter, the re-score
//! worker, and the HTTP surface.
//!
//! Everything in this crate is pure and synchronous. All I/O lives in
//! `simdoc-server`.

pub mod config;
pub mod features;
pub mod model;
pub mod similarity;

pub use config::SimilarityConfig;
pub use features::{ArticleFeatures, FeatureExtractor};
