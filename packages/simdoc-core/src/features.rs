//! Feature extraction: character shingles, SimHash fingerprints, and banded
//! MinHash signatures.
//!
//! Extraction is pure and deterministic: the same text and the same
//! [`SimilarityConfig`] always produce bitwise-identical features. This is
//! what makes re-delivered jobs and operator rechecks idempotent.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::{ConfigError, SimilarityConfig};

/// Number of hex characters kept from each band hash.
const BAND_HASH_HEX_LEN: usize = 8;

/// The full feature set derived from one article's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleFeatures {
    /// SimHash fingerprint as lowercase hex, zero-padded to `bits / 4` chars.
    pub simhash: String,
    /// Ordered list of band hashes (8 hex chars each), one per LSH band.
    pub minhash_signature: Vec<String>,
    /// Character k-grams of the normalized text, in order, duplicates kept.
    pub shingles: Vec<String>,
}

/// Extracts [`ArticleFeatures`] from raw text.
///
/// Construction validates the configuration once; extraction itself is
/// infallible and thread-safe (the extractor holds no mutable state).
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: SimilarityConfig,
}

impl FeatureExtractor {
    /// Creates an extractor for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration is inconsistent,
    /// e.g. banding that needs more hash values than permutations exist.
    pub fn new(config: SimilarityConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the configuration this extractor was built with.
    #[must_use]
    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Extracts all features from `text`.
    #[must_use]
    pub fn extract(&self, text: &str) -> ArticleFeatures {
        let shingles = self.shingles(text);
        tracing::debug!(
            text_chars = text.chars().count(),
            shingles = shingles.len(),
            "extracting features"
        );
        ArticleFeatures {
            simhash: self.simhash(text),
            minhash_signature: self.band_signature(&shingles),
            shingles,
        }
    }

    /// Produces character k-grams over the normalized (trimmed, lowercased)
    /// text.
    ///
    /// For a normalized text of `n` characters and shingle size `k`, returns
    /// exactly `n - k + 1` shingles in order with duplicates kept; shorter
    /// texts return an empty list. Shingling is `char`-based, so multi-byte
    /// scripts shingle by character, not by byte.
    #[must_use]
    pub fn shingles(&self, text: &str) -> Vec<String> {
        let normalized = normalize(text);
        let chars: Vec<char> = normalized.chars().collect();
        let k = self.config.shingle_size;
        if chars.len() < k {
            return Vec::new();
        }
        chars
            .windows(k)
            .map(|window| window.iter().collect())
            .collect()
    }

    /// Computes the SimHash fingerprint over the whitespace-split tokens of
    /// the normalized text.
    ///
    /// Each token votes +1/-1 on every bit position of its hash; bit `i` of
    /// the fingerprint is set when the accumulated weight is positive.
    /// Repeated tokens vote once per occurrence. The empty token list yields
    /// the all-zero fingerprint.
    #[must_use]
    pub fn simhash(&self, text: &str) -> String {
        let normalized = normalize(text);
        let bits = self.config.simhash_bit_size as usize;
        let mut weights = vec![0i64; bits];

        for token in normalized.split_whitespace() {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            for (i, weight) in weights.iter_mut().enumerate() {
                if (bytes[i / 8] >> (i % 8)) & 1 == 1 {
                    *weight += 1;
                } else {
                    *weight -= 1;
                }
            }
        }

        let mut value: u128 = 0;
        for (i, weight) in weights.iter().enumerate() {
            if *weight > 0 {
                value |= 1u128 << i;
            }
        }
        format!("{value:0width$x}", width = bits / 4)
    }

    /// Computes the banded MinHash signature for `text`.
    #[must_use]
    pub fn minhash_signature(&self, text: &str) -> Vec<String> {
        self.band_signature(&self.shingles(text))
    }

    /// Raw MinHash values: the minimum seeded hash per permutation.
    ///
    /// With no shingles every slot stays at `u64::MAX`, so two empty texts
    /// share every band but have Jaccard 0.0 downstream.
    fn minhash_values(&self, shingles: &[String]) -> Vec<u64> {
        let mut values = vec![u64::MAX; self.config.minhash_permutations];
        for shingle in shingles {
            let bytes = shingle.as_bytes();
            for (seed, slot) in values.iter_mut().enumerate() {
                let hash = xxh3_64_with_seed(bytes, seed as u64);
                if hash < *slot {
                    *slot = hash;
                }
            }
        }
        values
    }

    /// Splits the MinHash values into bands and hashes each band.
    ///
    /// Band `b` covers values `[b * rows, (b + 1) * rows)`; hash values past
    /// `bands * rows` are dropped (the historical 20x6-of-128 layout).
    fn band_signature(&self, shingles: &[String]) -> Vec<String> {
        let values = self.minhash_values(shingles);
        let rows = self.config.minhash_rows_per_band;
        (0..self.config.minhash_bands)
            .map(|band| band_hash(&values[band * rows..(band + 1) * rows]))
            .collect()
    }
}

/// Normalizes text for feature extraction: trim, then lowercase.
///
/// Deliberately nothing more. Near-duplicate detection must stay sensitive
/// to wording, so there is no stemming and no stopword removal.
fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Hashes one band of MinHash values to its 8-hex-char band hash.
///
/// The values are joined as decimal strings (`"v0,v1,..."`) and hashed with
/// BLAKE3; the first [`BAND_HASH_HEX_LEN`] hex chars form the band hash.
fn band_hash(values: &[u64]) -> String {
    let joined = values
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let digest = blake3::hash(joined.as_bytes());
    hex::encode(&digest.as_bytes()[..BAND_HASH_HEX_LEN / 2])
}
