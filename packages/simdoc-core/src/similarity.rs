//! Similarity primitives and cluster-selection math.
//!
//! Jaccard over shingle sets is the re-score measure; Hamming distance over
//! SimHash fingerprints is the exact-duplicate test; merge-winner selection
//! is deliberately a pure function of the candidate set so concurrent
//! workers converge on the same cluster regardless of arrival order.

use ahash::{AHashMap, AHashSet};
use std::cmp::Ordering;

use crate::model::cluster::TopTerm;
use crate::model::job::JobCandidate;

/// Hamming distance at or below which two SimHashes count as exact
/// duplicates.
pub const EXACT_DUPLICATE_HAMMING: u32 = 3;

/// Number of advisory top terms kept on a cluster document.
pub const TOP_TERMS_LIMIT: usize = 10;

/// A SimHash fingerprint that could not be parsed as hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid simhash fingerprint: {0:?}")]
pub struct SimhashParseError(pub String);

/// Jaccard similarity between two shingle lists, computed set-wise.
///
/// Returns 0.0 when the union is empty, so an article too short to shingle
/// never matches anything.
#[must_use]
pub fn jaccard(shingles_a: &[String], shingles_b: &[String]) -> f64 {
    let set_a: AHashSet<&str> = shingles_a.iter().map(String::as_str).collect();
    let set_b: AHashSet<&str> = shingles_b.iter().map(String::as_str).collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}

/// Hamming distance between two hex SimHash fingerprints.
///
/// # Errors
///
/// Returns [`SimhashParseError`] when either fingerprint is not valid hex
/// of at most 128 bits.
pub fn hamming_distance(simhash_a: &str, simhash_b: &str) -> Result<u32, SimhashParseError> {
    let a = parse_simhash(simhash_a)?;
    let b = parse_simhash(simhash_b)?;
    Ok((a ^ b).count_ones())
}

/// Whether two fingerprints are within [`EXACT_DUPLICATE_HAMMING`] bits.
///
/// # Errors
///
/// Returns [`SimhashParseError`] on malformed fingerprints.
pub fn is_exact_duplicate(simhash_a: &str, simhash_b: &str) -> Result<bool, SimhashParseError> {
    Ok(hamming_distance(simhash_a, simhash_b)? <= EXACT_DUPLICATE_HAMMING)
}

fn parse_simhash(simhash: &str) -> Result<u128, SimhashParseError> {
    u128::from_str_radix(simhash, 16).map_err(|_| SimhashParseError(simhash.to_string()))
}

/// A candidate that cleared the similarity threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub article_id: String,
    pub cluster_id: Option<String>,
    pub similarity_score: f64,
}

/// Scores `candidates` against `shingles` and keeps those at or above
/// `threshold`, sorted by score descending (stable for ties).
///
/// Candidates without shingles are skipped; the caller is expected to have
/// resolved snapshot fallbacks before scoring.
#[must_use]
pub fn score_candidates(
    shingles: &[String],
    candidates: &[JobCandidate],
    threshold: f64,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .filter(|candidate| !candidate.shingles.is_empty())
        .filter_map(|candidate| {
            let score = jaccard(shingles, &candidate.shingles);
            (score >= threshold).then(|| ScoredCandidate {
                article_id: candidate.article_id.clone(),
                cluster_id: candidate.cluster_id.clone(),
                similarity_score: score,
            })
        })
        .collect();
    scored.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(Ordering::Equal)
    });
    scored
}

/// Picks the cluster with the highest average similarity among the scored
/// candidates that already belong to one.
///
/// Ties keep the first cluster encountered, so the outcome is a function of
/// the (sorted) candidate order alone.
#[must_use]
pub fn best_cluster_by_average(scored: &[ScoredCandidate]) -> Option<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut scores: AHashMap<&str, Vec<f64>> = AHashMap::new();
    for candidate in scored {
        if let Some(cluster_id) = candidate.cluster_id.as_deref() {
            scores
                .entry(cluster_id)
                .or_insert_with(|| {
                    order.push(cluster_id);
                    Vec::new()
                })
                .push(candidate.similarity_score);
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for cluster_id in order {
        let cluster_scores = &scores[cluster_id];
        #[allow(clippy::cast_precision_loss)]
        let average = cluster_scores.iter().sum::<f64>() / cluster_scores.len() as f64;
        if best.is_none_or(|(_, best_score)| average > best_score) {
            best = Some((cluster_id, average));
        }
    }
    best.map(|(cluster_id, _)| cluster_id.to_string())
}

/// Deterministic merge-winner selection: the lexicographically smallest id.
///
/// Independent of iteration order, which is what lets concurrent workers
/// that observe the same merge set converge without coordination.
#[must_use]
pub fn merge_winner<'a, I>(cluster_ids: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    cluster_ids.into_iter().min().map(str::to_string)
}

/// The deterministic cluster id founded by `article_id`.
#[must_use]
pub fn cluster_id_for(article_id: &str) -> String {
    format!("cluster_{article_id}")
}

/// Extracts up to [`TOP_TERMS_LIMIT`] weighted terms from `text`.
///
/// Simple frequency analysis over lowercase whitespace tokens, skipping
/// single-character tokens; weights are frequencies normalized over the kept
/// terms, rounded to three decimals. Advisory only.
#[must_use]
pub fn extract_top_terms(text: &str, max_terms: usize) -> Vec<TopTerm> {
    let lowered = text.to_lowercase();
    let mut order: Vec<&str> = Vec::new();
    let mut frequencies: AHashMap<&str, u64> = AHashMap::new();
    for word in lowered.split_whitespace() {
        if word.chars().count() <= 1 {
            continue;
        }
        *frequencies.entry(word).or_insert_with(|| {
            order.push(word);
            0
        }) += 1;
    }

    let mut ranked: Vec<(&str, u64)> = order
        .into_iter()
        .map(|word| (word, frequencies[word]))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(max_terms);

    let total: u64 = ranked.iter().map(|(_, count)| count).sum();
    let total = total.max(1);
    ranked
        .into_iter()
        .map(|(word, count)| {
            #[allow(clippy::cast_precision_loss)]
            let weight = (count as f64 / total as f64 * 1000.0).round() / 1000.0;
            TopTerm {
                term: word.to_string(),
                weight,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn shingles(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn jaccard_of_identical_sets_is_one() {
        let a = shingles(&["abcde", "bcdef", "cdefg"]);
        assert!((jaccard(&a, &a) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a = shingles(&["abcde"]);
        let b = shingles(&["zyxwv"]);
        assert!(jaccard(&a, &b).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_with_empty_side_is_zero() {
        let a = shingles(&["abcde"]);
        assert!(jaccard(&a, &[]).abs() < f64::EPSILON);
        assert!(jaccard(&[], &a).abs() < f64::EPSILON);
        assert!(jaccard(&[], &[]).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_ignores_duplicates() {
        let a = shingles(&["abcde", "abcde", "bcdef"]);
        let b = shingles(&["abcde", "bcdef", "bcdef"]);
        assert!((jaccard(&a, &b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_partial_overlap() {
        let a = shingles(&["aa", "bb", "cc"]);
        let b = shingles(&["bb", "cc", "dd"]);
        // 2 shared of 4 distinct.
        assert!((jaccard(&a, &b) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn hamming_distance_counts_differing_bits() {
        assert_eq!(hamming_distance("00", "00").unwrap(), 0);
        assert_eq!(hamming_distance("00", "07").unwrap(), 3);
        assert_eq!(hamming_distance("00", "0f").unwrap(), 4);
        assert_eq!(hamming_distance("ffff", "0000").unwrap(), 16);
    }

    #[test]
    fn duplicate_threshold_is_three_bits_inclusive() {
        assert!(is_exact_duplicate("00", "07").unwrap());
        assert!(!is_exact_duplicate("00", "0f").unwrap());
    }

    #[test]
    fn malformed_fingerprint_is_an_error() {
        assert!(hamming_distance("zz", "00").is_err());
        assert!(hamming_distance("", "00").is_err());
    }

    fn candidate(id: &str, cluster: Option<&str>, shingle_parts: &[&str]) -> JobCandidate {
        JobCandidate {
            article_id: id.to_string(),
            cluster_id: cluster.map(ToString::to_string),
            shingles: shingles(shingle_parts),
            simhash: None,
        }
    }

    #[test]
    fn score_candidates_filters_and_sorts() {
        let own = shingles(&["aa", "bb", "cc", "dd", "ee"]);
        let candidates = vec![
            candidate("far", None, &["zz"]),
            candidate("close", Some("cluster_x"), &["aa", "bb", "cc", "dd", "ee"]),
            candidate("near", None, &["aa", "bb", "cc", "dd", "ee", "ff"]),
        ];
        let scored = score_candidates(&own, &candidates, 0.8);
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].article_id, "close");
        assert_eq!(scored[1].article_id, "near");
        assert!((scored[0].similarity_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn score_candidates_skips_empty_shingles() {
        let own = shingles(&["aa"]);
        let candidates = vec![candidate("empty", None, &[])];
        assert!(score_candidates(&own, &candidates, 0.0).is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let own = shingles(&["aa", "bb", "cc", "dd"]);
        // 4 shared of 5 distinct = 0.8 exactly.
        let candidates = vec![candidate("edge", None, &["aa", "bb", "cc", "dd", "ee"])];
        assert_eq!(score_candidates(&own, &candidates, 0.8).len(), 1);
    }

    #[test]
    fn best_cluster_prefers_highest_average() {
        let scored = vec![
            ScoredCandidate {
                article_id: "a".to_string(),
                cluster_id: Some("cluster_low".to_string()),
                similarity_score: 0.81,
            },
            ScoredCandidate {
                article_id: "b".to_string(),
                cluster_id: Some("cluster_high".to_string()),
                similarity_score: 0.95,
            },
            ScoredCandidate {
                article_id: "c".to_string(),
                cluster_id: Some("cluster_high".to_string()),
                similarity_score: 0.9,
            },
        ];
        assert_eq!(
            best_cluster_by_average(&scored),
            Some("cluster_high".to_string())
        );
    }

    #[test]
    fn best_cluster_ignores_unclustered_candidates() {
        let scored = vec![ScoredCandidate {
            article_id: "a".to_string(),
            cluster_id: None,
            similarity_score: 0.99,
        }];
        assert_eq!(best_cluster_by_average(&scored), None);
        assert_eq!(best_cluster_by_average(&[]), None);
    }

    #[test]
    fn merge_winner_is_lexicographic_minimum() {
        let ids = ["cluster_b", "cluster_a", "cluster_c"];
        assert_eq!(merge_winner(ids), Some("cluster_a".to_string()));

        let empty: [&str; 0] = [];
        assert_eq!(merge_winner(empty), None);
    }

    #[test]
    fn cluster_id_format_is_stable() {
        assert_eq!(cluster_id_for("a1"), "cluster_a1");
    }

    #[test]
    fn top_terms_rank_by_frequency() {
        let terms = extract_top_terms("fire fire fire tai po tai x", TOP_TERMS_LIMIT);
        assert_eq!(terms[0].term, "fire");
        assert_eq!(terms[1].term, "tai");
        // Single-character tokens are skipped.
        assert!(terms.iter().all(|t| t.term != "x"));
        assert!((terms[0].weight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn top_terms_of_empty_text() {
        assert!(extract_top_terms("", TOP_TERMS_LIMIT).is_empty());
    }

    proptest! {
        #[test]
        fn merge_winner_is_order_independent(mut ids in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
            let forward = merge_winner(ids.iter().map(String::as_str));
            ids.reverse();
            let backward = merge_winner(ids.iter().map(String::as_str));
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn jaccard_is_symmetric(
            a in proptest::collection::vec("[a-e]{2}", 0..10),
            b in proptest::collection::vec("[a-e]{2}", 0..10),
        ) {
            prop_assert!((jaccard(&a, &b) - jaccard(&b, &a)).abs() < f64::EPSILON);
        }

        #[test]
        fn jaccard_is_a_proportion(
            a in proptest::collection::vec("[a-e]{2}", 0..10),
            b in proptest::collection::vec("[a-e]{2}", 0..10),
        ) {
            let score = jaccard(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
