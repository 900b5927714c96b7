//! Reciprocal Rank Fusion (RRF): rank-level score combination across
//! independently ranked lists.
//!
//! `score(d) = Σ 1/(k + rank_i(d) + 1)` over every ranked list that contains
//! `d`; a document missing from a list contributes 0 for that list.

/// Configuration for RRF fusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfConfig {
    /// The `k` constant; higher values flatten the influence of rank.
    pub k: u32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { k: 60 }
    }
}

/// Fuses multiple ranked lists of chunk IDs into a single descending-score
/// ranking via Reciprocal Rank Fusion.
///
/// `ranked_lists[i][r]` is the chunk ID at 0-indexed rank `r` in list `i`.
/// The result is sorted by fused score descending; ties are left in
/// first-seen order (callers needing a fully deterministic tie-break should
/// apply one afterward, per `RetrievalCandidate`'s own rule).
#[must_use]
pub fn reciprocal_rank_fusion(
    ranked_lists: &[&[String]],
    config: &RrfConfig,
) -> Vec<(String, f64)> {
    let mut scores: Vec<(String, f64)> = Vec::new();
    let mut index_of: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();

    for list in ranked_lists {
        for (rank, chunk_id) in list.iter().enumerate() {
            let contribution = 1.0 / f64::from(config.k + u32::try_from(rank).unwrap_or(u32::MAX) + 1);
            if let Some(&idx) = index_of.get(chunk_id.as_str()) {
                scores[idx].1 += contribution;
            } else {
                index_of.insert(chunk_id.as_str(), scores.len());
                scores.push((chunk_id.clone(), contribution));
            }
        }
    }

    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scores
}

/// Per-list weighted variant: `list_weights[i]` scales list `i`'s
/// contribution before summation. Missing weights default to `1.0`.
#[must_use]
pub fn weighted_rrf(
    ranked_lists: &[&[String]],
    list_weights: &[f64],
    config: &RrfConfig,
) -> Vec<(String, f64)> {
    let mut scores: Vec<(String, f64)> = Vec::new();
    let mut index_of: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();

    for (i, list) in ranked_lists.iter().enumerate() {
        let weight = list_weights.get(i).copied().unwrap_or(1.0);
        for (rank, chunk_id) in list.iter().enumerate() {
            let contribution =
                weight / f64::from(config.k + u32::try_from(rank).unwrap_or(u32::MAX) + 1);
            if let Some(&idx) = index_of.get(chunk_id.as_str()) {
                scores[idx].1 += contribution;
            } else {
                index_of.insert(chunk_id.as_str(), scores.len());
                scores.push((chunk_id.clone(), contribution));
            }
        }
    }

    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn single_list_preserves_order() {
        let list = ids(&["a", "b", "c"]);
        let fused = reciprocal_rank_fusion(&[&list], &RrfConfig::default());
        assert_eq!(fused[0].0, "a");
        assert_eq!(fused[1].0, "b");
        assert_eq!(fused[2].0, "c");
    }

    #[test]
    fn exact_formula_for_two_lists() {
        let list_a = ids(&["x", "y"]);
        let list_b = ids(&["y", "x"]);
        let config = RrfConfig { k: 60 };
        let fused = reciprocal_rank_fusion(&[&list_a, &list_b], &config);

        // Both x and y appear at rank 0 in one list and rank 1 in the other:
        // score = 1/(60+1) + 1/(60+2), identical for both -> tie.
        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        for (_, score) in &fused {
            assert!((score - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_from_a_list_contributes_zero() {
        let list_a = ids(&["only-in-a"]);
        let list_b = ids(&["only-in-b"]);
        let fused = reciprocal_rank_fusion(&[&list_a, &list_b], &RrfConfig::default());
        assert_eq!(fused.len(), 2);
        for (_, score) in &fused {
            assert!((score - 1.0 / 61.0).abs() < 1e-9);
        }
    }

    #[test]
    fn commutative_over_list_order() {
        let list_a = ids(&["a", "b", "c"]);
        let list_b = ids(&["c", "a", "b"]);
        let config = RrfConfig::default();

        let mut fused_ab = reciprocal_rank_fusion(&[&list_a, &list_b], &config);
        let mut fused_ba = reciprocal_rank_fusion(&[&list_b, &list_a], &config);
        fused_ab.sort_by(|a, b| a.0.cmp(&b.0));
        fused_ba.sort_by(|a, b| a.0.cmp(&b.0));

        for ((id_a, score_a), (id_b, score_b)) in fused_ab.iter().zip(fused_ba.iter()) {
            assert_eq!(id_a, id_b);
            assert!((score_a - score_b).abs() < 1e-12);
        }
    }

    #[test]
    fn weighted_rrf_scales_contribution() {
        let list = ids(&["a"]);
        let config = RrfConfig::default();
        let unweighted = reciprocal_rank_fusion(&[&list], &config);
        let weighted = weighted_rrf(&[&list], &[2.0], &config);
        assert!((weighted[0].1 - 2.0 * unweighted[0].1).abs() < 1e-12);
    }

    #[test]
    fn empty_lists_produce_empty_result() {
        let empty: Vec<String> = Vec::new();
        let fused = reciprocal_rank_fusion(&[&empty], &RrfConfig::default());
        assert!(fused.is_empty());
    }
}
