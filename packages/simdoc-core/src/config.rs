//! Tuning knobs for feature extraction and candidate scoring.

use serde::{Deserialize, Serialize};

/// Widest SimHash fingerprint supported; fingerprints are carried as `u128`.
pub const MAX_SIMHASH_BITS: u32 = 128;

/// Similarity algorithm configuration.
///
/// The defaults reproduce the production setup: 64-bit SimHash, a 128-value
/// MinHash split into 20 bands of 6 rows, 5-character shingles, and a 0.8
/// Jaccard admission threshold.
///
/// Note that 20 x 6 = 120 < 128: the trailing 8 MinHash values are unused by
/// banding. That slack is deliberate and accepted by [`validate`]; only
/// configurations that would need *more* rows than there are permutations
/// are rejected.
///
/// [`validate`]: SimilarityConfig::validate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// SimHash fingerprint width in bits. Must be a multiple of 4 (the
    /// fingerprint serializes as hex) and at most [`MAX_SIMHASH_BITS`].
    pub simhash_bit_size: u32,
    /// Number of MinHash permutations (hash functions).
    pub minhash_permutations: usize,
    /// Number of LSH bands the signature is split into.
    pub minhash_bands: usize,
    /// Number of MinHash values per band.
    pub minhash_rows_per_band: usize,
    /// Character length of each shingle (k-gram).
    pub shingle_size: usize,
    /// Minimum Jaccard similarity for two articles to be clustered together.
    pub similarity_threshold: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            simhash_bit_size: 64,
            minhash_permutations: 128,
            minhash_bands: 20,
            minhash_rows_per_band: 6,
            shingle_size: 5,
            similarity_threshold: 0.8,
        }
    }
}

/// Rejected similarity configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("simhash_bit_size must be a multiple of 4 between 4 and {MAX_SIMHASH_BITS}, got {0}")]
    SimhashBitSize(u32),
    #[error("minhash_permutations must be at least 1")]
    NoPermutations,
    #[error("minhash banding needs {needed} hash values but only {available} permutations are configured")]
    BandOverflow { needed: usize, available: usize },
    #[error("minhash_bands and minhash_rows_per_band must be at least 1")]
    EmptyBands,
    #[error("shingle_size must be at least 1")]
    ShingleSize,
    #[error("similarity_threshold must be within [0.0, 1.0], got {0}")]
    Threshold(f64),
}

impl SimilarityConfig {
    /// Checks the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simhash_bit_size == 0
            || self.simhash_bit_size % 4 != 0
            || self.simhash_bit_size > MAX_SIMHASH_BITS
        {
            return Err(ConfigError::SimhashBitSize(self.simhash_bit_size));
        }
        if self.minhash_permutations == 0 {
            return Err(ConfigError::NoPermutations);
        }
        if self.minhash_bands == 0 || self.minhash_rows_per_band == 0 {
            return Err(ConfigError::EmptyBands);
        }
        let needed = self.minhash_bands * self.minhash_rows_per_band;
        if needed > self.minhash_permutations {
            return Err(ConfigError::BandOverflow {
                needed,
                available: self.minhash_permutations,
            });
        }
        if self.shingle_size == 0 {
            return Err(ConfigError::ShingleSize);
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Threshold(self.similarity_threshold));
        }
        Ok(())
    }
}
