//! Rank fusion over the union of the two engines' results.
//!
//! Fusion is a pure function of the two (already sorted) hit lists and the
//! configuration: whichever leg finishes first, the output is identical.
//! The final order breaks score ties by lower dense rank, then lower sparse
//! rank, then lexicographic document id, so it is total and deterministic.

use std::collections::HashMap;

use dense::DenseHit;
use sparse::SparseHit;

use crate::config::{FusionStrategy, HybridConfig};

/// RRF constant.
const RRF_C: f64 = 60.0;

/// Query terms that signal a domain-concept query; these shift adaptive
/// fusion toward the dense engine.
const DOMAIN_TRIGGER_TERMS: &[&str] = &["penyakit", "gejala", "diagnosis", "pengobatan", "terapi"];

/// A fused hit with its per-engine provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub doc_id: String,
    pub combined_score: f32,
    pub vector_score: Option<f32>,
    /// 1-based rank within the dense result list.
    pub vector_rank: Option<usize>,
    pub keyword_score: Option<f32>,
    /// 1-based rank within the keyword result list.
    pub keyword_rank: Option<usize>,
    pub matched_tokens: Vec<String>,
}

impl FusedHit {
    /// Which engine(s) produced this hit, for result diagnostics.
    pub fn retrieval_method(&self) -> &'static str {
        match (self.vector_rank.is_some(), self.keyword_rank.is_some()) {
            (true, true) => "hybrid",
            (true, false) => "dense_vector",
            (false, true) => "bm25_keyword",
            (false, false) => "none",
        }
    }
}

/// Fuses the two result lists under `config.fusion` and returns the top
/// `k` hits.
pub fn fuse(
    query: &str,
    vector_hits: &[DenseHit],
    keyword_hits: &[SparseHit],
    config: &HybridConfig,
    k: usize,
) -> Vec<FusedHit> {
    if vector_hits.is_empty() && keyword_hits.is_empty() {
        return Vec::new();
    }

    let mut union: HashMap<&str, FusedHit> = HashMap::new();

    for (rank0, hit) in vector_hits.iter().enumerate() {
        let entry = union.entry(&hit.doc_id).or_insert_with(|| FusedHit {
            doc_id: hit.doc_id.clone(),
            combined_score: 0.0,
            vector_score: None,
            vector_rank: None,
            keyword_score: None,
            keyword_rank: None,
            matched_tokens: Vec::new(),
        });
        entry.vector_score = Some(hit.score);
        entry.vector_rank = Some(rank0 + 1);
    }

    for (rank0, hit) in keyword_hits.iter().enumerate() {
        let entry = union.entry(&hit.doc_id).or_insert_with(|| FusedHit {
            doc_id: hit.doc_id.clone(),
            combined_score: 0.0,
            vector_score: None,
            vector_rank: None,
            keyword_score: None,
            keyword_rank: None,
            matched_tokens: Vec::new(),
        });
        entry.keyword_score = Some(hit.score);
        entry.keyword_rank = Some(rank0 + 1);
        entry.matched_tokens = hit.matched_tokens.clone();
    }

    let mut fused: Vec<FusedHit> = union.into_values().collect();

    match config.fusion {
        FusionStrategy::WeightedSum => {
            weighted_sum(&mut fused, config.vector_weight, config.keyword_weight)
        }
        FusionStrategy::ReciprocalRankFusion => reciprocal_rank_fusion(&mut fused),
        FusionStrategy::Adaptive => {
            let (vw, kw) = adaptive_weights(query, config);
            weighted_sum(&mut fused, vw, kw)
        }
    }

    sort_fused(&mut fused);
    fused.truncate(k);
    fused
}

/// Min-max normalizes each engine's scores over the union (a missing side
/// contributes 0.0 to the score array), then blends with the weights.
fn weighted_sum(hits: &mut [FusedHit], vector_weight: f32, keyword_weight: f32) {
    let vector_norm = min_max(hits.iter().map(|h| h.vector_score.unwrap_or(0.0)));
    let keyword_norm = min_max(hits.iter().map(|h| h.keyword_score.unwrap_or(0.0)));

    for (idx, hit) in hits.iter_mut().enumerate() {
        let v = if hit.vector_rank.is_some() {
            vector_norm[idx]
        } else {
            0.0
        };
        let w = if hit.keyword_rank.is_some() {
            keyword_norm[idx]
        } else {
            0.0
        };
        hit.combined_score = vector_weight * v + keyword_weight * w;
    }
}

/// `1/(C + rank)` per engine; a missing rank contributes nothing.
fn reciprocal_rank_fusion(hits: &mut [FusedHit]) {
    for hit in hits.iter_mut() {
        let v = hit
            .vector_rank
            .map_or(0.0, |rank| 1.0 / (RRF_C + rank as f64));
        let w = hit
            .keyword_rank
            .map_or(0.0, |rank| 1.0 / (RRF_C + rank as f64));
        hit.combined_score = (v + w) as f32;
    }
}

/// Picks the weight pair for an adaptive query. Quoted phrases and short
/// queries lean on exact keyword matching; domain-concept queries lean on
/// the dense engine; everything else keeps the configured defaults.
/// The decision is per-call and never mutates the configuration.
pub(crate) fn adaptive_weights(query: &str, config: &HybridConfig) -> (f32, f32) {
    let lowered = query.to_lowercase();
    let is_short = query.split_whitespace().count() <= 3;
    let has_quoted_phrase = query.contains('"');
    let has_trigger_term = DOMAIN_TRIGGER_TERMS
        .iter()
        .any(|term| lowered.contains(term));

    if has_quoted_phrase || is_short {
        (0.3, 0.7)
    } else if has_trigger_term {
        (0.7, 0.3)
    } else {
        (config.vector_weight, config.keyword_weight)
    }
}

/// Min-max over the collected values. A constant array maps to all zeros,
/// matching the degenerate-range behavior the weighted sum was tuned
/// against.
fn min_max(values: impl Iterator<Item = f32>) -> Vec<f32> {
    let values: Vec<f32> = values.collect();
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max > min {
        values.into_iter().map(|v| (v - min) / (max - min)).collect()
    } else {
        vec![0.0; values.len()]
    }
}

fn sort_fused(hits: &mut [FusedHit]) {
    hits.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.vector_rank
                    .unwrap_or(usize::MAX)
                    .cmp(&b.vector_rank.unwrap_or(usize::MAX))
            })
            .then_with(|| {
                a.keyword_rank
                    .unwrap_or(usize::MAX)
                    .cmp(&b.keyword_rank.unwrap_or(usize::MAX))
            })
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HybridConfig;

    fn dense_hit(doc_id: &str, score: f32) -> DenseHit {
        DenseHit {
            doc_id: doc_id.into(),
            score,
        }
    }

    fn sparse_hit(doc_id: &str, score: f32) -> SparseHit {
        SparseHit {
            doc_id: doc_id.into(),
            score,
            matched_tokens: vec!["darah".into()],
        }
    }

    fn cfg(fusion: FusionStrategy) -> HybridConfig {
        HybridConfig::default().with_fusion(fusion)
    }

    #[test]
    fn empty_legs_fuse_to_empty() {
        let fused = fuse("q", &[], &[], &cfg(FusionStrategy::WeightedSum), 10);
        assert!(fused.is_empty());
    }

    #[test]
    fn weighted_sum_blends_both_engines() {
        let vector = vec![dense_hit("d1", 0.9), dense_hit("d2", 0.5)];
        let keyword = vec![sparse_hit("d2", 4.0), sparse_hit("d3", 1.0)];
        let fused = fuse("q", &vector, &keyword, &cfg(FusionStrategy::WeightedSum), 10);

        assert_eq!(fused.len(), 3);
        // d2 sits in both lists and tops the keyword normalization, so it
        // must beat the keyword-only d3.
        let d2 = fused.iter().find(|h| h.doc_id == "d2").unwrap();
        let d3 = fused.iter().find(|h| h.doc_id == "d3").unwrap();
        assert!(d2.combined_score > d3.combined_score);
        assert_eq!(d2.retrieval_method(), "hybrid");
        assert_eq!(d3.retrieval_method(), "bm25_keyword");
    }

    #[test]
    fn weighted_sum_missing_side_contributes_zero() {
        let vector = vec![dense_hit("only_v", 0.8), dense_hit("weak_v", 0.2)];
        let fused = fuse("q", &vector, &[], &cfg(FusionStrategy::WeightedSum), 10);
        let top = &fused[0];
        assert_eq!(top.doc_id, "only_v");
        // Keyword side absent everywhere: the combined score is the
        // weighted normalized vector score alone.
        assert!((top.combined_score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn rrf_sums_reciprocal_ranks() {
        let vector = vec![dense_hit("a", 0.9), dense_hit("b", 0.8)];
        let keyword = vec![sparse_hit("b", 3.0)];
        let fused = fuse(
            "q",
            &vector,
            &keyword,
            &cfg(FusionStrategy::ReciprocalRankFusion),
            10,
        );

        let a = fused.iter().find(|h| h.doc_id == "a").unwrap();
        let b = fused.iter().find(|h| h.doc_id == "b").unwrap();
        assert!((a.combined_score - (1.0 / 61.0) as f32).abs() < 1e-6);
        assert!((b.combined_score - ((1.0 / 62.0) + (1.0 / 61.0)) as f32).abs() < 1e-6);
        assert_eq!(fused[0].doc_id, "b");
    }

    #[test]
    fn adaptive_short_query_prefers_keywords() {
        let config = cfg(FusionStrategy::Adaptive);
        assert_eq!(adaptive_weights("diabetes", &config), (0.3, 0.7));
        assert_eq!(adaptive_weights("gula darah tinggi", &config), (0.3, 0.7));
    }

    #[test]
    fn adaptive_quoted_phrase_prefers_keywords() {
        let config = cfg(FusionStrategy::Adaptive);
        let q = "bagaimana cara menurunkan \"tekanan darah tinggi\" secara alami";
        assert_eq!(adaptive_weights(q, &config), (0.3, 0.7));
    }

    #[test]
    fn adaptive_trigger_terms_prefer_vectors() {
        let config = cfg(FusionStrategy::Adaptive);
        let q = "apa saja gejala awal serta pengobatan hipertensi kronis";
        assert_eq!(adaptive_weights(q, &config), (0.7, 0.3));
    }

    #[test]
    fn adaptive_defaults_otherwise() {
        let config = cfg(FusionStrategy::Adaptive);
        let q = "bagaimana menjaga pola makan sehat setiap hari";
        assert_eq!(
            adaptive_weights(q, &config),
            (config.vector_weight, config.keyword_weight)
        );
    }

    #[test]
    fn adaptive_weights_do_not_mutate_config() {
        let config = cfg(FusionStrategy::Adaptive);
        let _ = adaptive_weights("diabetes", &config);
        assert!((config.vector_weight - 0.6).abs() < f32::EPSILON);
        assert!((config.keyword_weight - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn ties_break_dense_then_keyword_then_id() {
        // Equal keyword scores min-max to 0.0 for both: a genuine combined
        // tie. Neither has a dense rank, so the keyword rank decides.
        let keyword = vec![sparse_hit("z_first", 2.0), sparse_hit("a_second", 2.0)];
        let fused = fuse("q", &[], &keyword, &cfg(FusionStrategy::WeightedSum), 10);
        assert_eq!(fused[0].doc_id, "z_first");
        assert_eq!(fused[1].doc_id, "a_second");

        // With identical ranks on both sides (two distinct single-leg
        // unions are impossible), the id breaks what remains: construct a
        // pure id tie via two equal dense scores.
        let vector = vec![dense_hit("b_doc", 0.5), dense_hit("a_doc", 0.5)];
        let fused = fuse("q", &vector, &[], &cfg(FusionStrategy::WeightedSum), 10);
        // Equal scores normalize to 0.0; dense rank decides before id.
        assert_eq!(fused[0].doc_id, "b_doc");
    }

    #[test]
    fn truncates_to_k() {
        let vector = vec![
            dense_hit("a", 0.9),
            dense_hit("b", 0.8),
            dense_hit("c", 0.7),
        ];
        let fused = fuse("q", &vector, &[], &cfg(FusionStrategy::WeightedSum), 2);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn fusion_is_pure_in_leg_order() {
        // Same inputs always fuse identically; this is what makes parallel
        // execution observationally equivalent to sequential.
        let vector = vec![dense_hit("a", 0.9), dense_hit("b", 0.3)];
        let keyword = vec![sparse_hit("b", 5.0), sparse_hit("c", 2.0)];
        let config = cfg(FusionStrategy::WeightedSum);
        let once = fuse("q", &vector, &keyword, &config, 10);
        let twice = fuse("q", &vector, &keyword, &config, 10);
        assert_eq!(once, twice);
    }

    #[test]
    fn min_max_constant_array_is_zeroed() {
        assert_eq!(min_max([2.0f32, 2.0].into_iter()), vec![0.0, 0.0]);
        assert_eq!(min_max([0.0f32, 1.0, 2.0].into_iter()), vec![0.0, 0.5, 1.0]);
    }
}
