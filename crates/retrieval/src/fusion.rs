//! Rank fusion strategies
//!
//! Combine multiple named ranked lists of the same chunks into one ranking,
//! independent of where those lists came from. Documents are matched across
//! lists by composite chunk identity, not by store id.

use std::collections::HashMap;

use docqa_core::{Chunk, ChunkIdentity};

/// One entry of a named ranking handed to a fusion strategy.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub chunk: Chunk,
    pub score: f32,
    /// 1-based rank within the method's list.
    pub rank: usize,
    /// Name of the method that produced this entry.
    pub method: String,
}

impl RankedResult {
    /// Wrap an already-ordered list of scored chunks, assigning 1-based
    /// ranks from position.
    pub fn from_ordered(method: &str, chunks: Vec<(Chunk, f32)>) -> Vec<RankedResult> {
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, (chunk, score))| RankedResult {
                chunk,
                score,
                rank: i + 1,
                method: method.to_string(),
            })
            .collect()
    }
}

/// Strategy combining per-method rankings into a single ranking.
pub trait FusionStrategy: Send + Sync {
    /// Fuse named rankings. The output is sorted descending by fused score
    /// with 1-based ranks reassigned; it must not depend on the iteration
    /// order of `rankings`.
    fn fuse(&self, rankings: &HashMap<String, Vec<RankedResult>>) -> Vec<RankedResult>;
}

/// Reciprocal Rank Fusion.
///
/// Each appearance contributes `1/(k + rank)`; contributions sum across
/// methods. Fully rank-based, so methods with incomparable score scales
/// fuse cleanly.
#[derive(Debug, Clone, Copy)]
pub struct ReciprocalRankFusion {
    k: f32,
}

impl ReciprocalRankFusion {
    pub fn new(k: f32) -> Self {
        Self { k }
    }
}

impl Default for ReciprocalRankFusion {
    fn default() -> Self {
        Self::new(docqa_config::constants::retrieval::RRF_K)
    }
}

impl FusionStrategy for ReciprocalRankFusion {
    fn fuse(&self, rankings: &HashMap<String, Vec<RankedResult>>) -> Vec<RankedResult> {
        let mut scores: HashMap<ChunkIdentity, (Chunk, f32)> = HashMap::new();

        for results in rankings.values() {
            for result in results {
                let contribution = 1.0 / (self.k + result.rank as f32);
                scores
                    .entry(result.chunk.identity())
                    .and_modify(|(_, s)| *s += contribution)
                    .or_insert((result.chunk.clone(), contribution));
            }
        }

        finalize(scores, "rrf_fusion")
    }
}

/// Weighted score fusion.
///
/// Per-method raw scores are linearly combined with caller-supplied weights,
/// normalized to sum to 1. A method absent from the weight map contributes
/// nothing.
#[derive(Debug, Clone)]
pub struct WeightedScoreFusion {
    weights: HashMap<String, f32>,
}

impl WeightedScoreFusion {
    pub fn new(method_weights: HashMap<String, f32>) -> Self {
        let total: f32 = method_weights.values().sum();
        let weights = if total > 0.0 {
            method_weights
                .into_iter()
                .map(|(k, v)| (k, v / total))
                .collect()
        } else {
            method_weights
        };
        Self { weights }
    }
}

impl FusionStrategy for WeightedScoreFusion {
    fn fuse(&self, rankings: &HashMap<String, Vec<RankedResult>>) -> Vec<RankedResult> {
        let mut scores: HashMap<ChunkIdentity, (Chunk, f32)> = HashMap::new();

        for (method, results) in rankings {
            let weight = self.weights.get(method).copied().unwrap_or(0.0);

            for result in results {
                let contribution = weight * result.score;
                scores
                    .entry(result.chunk.identity())
                    .and_modify(|(_, s)| *s += contribution)
                    .or_insert((result.chunk.clone(), contribution));
            }
        }

        finalize(scores, "weighted_fusion")
    }
}

/// Sort fused scores descending and assign 1-based ranks. Ties break on
/// chunk id so the output never depends on map iteration order.
fn finalize(scores: HashMap<ChunkIdentity, (Chunk, f32)>, method: &str) -> Vec<RankedResult> {
    let mut fused: Vec<(Chunk, f32)> = scores.into_values().collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));

    fused
        .into_iter()
        .enumerate()
        .map(|(i, (chunk, score))| RankedResult {
            chunk,
            score,
            rank: i + 1,
            method: method.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::ChunkMetadata;

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: format!("contenu du chunk {id}"),
            metadata: ChunkMetadata {
                source_document: "cours.pdf".into(),
                chunk_index: id.parse().unwrap_or(0),
                ..Default::default()
            },
        }
    }

    fn rankings(order: &[(&str, &[&str])]) -> HashMap<String, Vec<RankedResult>> {
        order
            .iter()
            .map(|(method, ids)| {
                let entries = ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| (chunk(id), 1.0 - i as f32 * 0.1))
                    .collect();
                (
                    method.to_string(),
                    RankedResult::from_ordered(method, entries),
                )
            })
            .collect()
    }

    #[test]
    fn rrf_scores_sum_across_methods() {
        let strategy = ReciprocalRankFusion::new(60.0);
        let fused = strategy.fuse(&rankings(&[
            ("dense", &["a", "b"]),
            ("sparse", &["b", "c"]),
        ]));

        let b = fused.iter().find(|r| r.chunk.id == "b").expect("b");
        let expected = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((b.score - expected).abs() < 1e-6);

        // b appears in both lists, so it outranks a and c.
        assert_eq!(fused[0].chunk.id, "b");
        assert_eq!(fused[0].rank, 1);
    }

    #[test]
    fn rrf_is_invariant_to_method_iteration_order() {
        let strategy = ReciprocalRankFusion::default();
        let forward = strategy.fuse(&rankings(&[
            ("dense", &["a", "b", "c"]),
            ("sparse", &["c", "a"]),
        ]));
        let reversed = strategy.fuse(&rankings(&[
            ("sparse", &["c", "a"]),
            ("dense", &["a", "b", "c"]),
        ]));

        let ids = |r: &[RankedResult]| r.iter().map(|x| x.chunk.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&forward), ids(&reversed));
        for (f, r) in forward.iter().zip(reversed.iter()) {
            assert!((f.score - r.score).abs() < 1e-6);
        }
    }

    #[test]
    fn weighted_fusion_normalizes_weights() {
        // 3:1 normalizes to 0.75/0.25.
        let strategy = WeightedScoreFusion::new(HashMap::from([
            ("dense".to_string(), 3.0),
            ("sparse".to_string(), 1.0),
        ]));

        let fused = strategy.fuse(&rankings(&[("dense", &["a"]), ("sparse", &["a"])]));
        assert_eq!(fused.len(), 1);
        // Both entries score 1.0 at rank 1, so fused = 0.75 + 0.25.
        assert!((fused[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn duplicate_ingestions_fuse_as_one_document() {
        // Same content and metadata under different store ids.
        let mut a1 = chunk("7");
        let mut a2 = chunk("7");
        a1.id = "store-id-1".into();
        a2.id = "store-id-2".into();

        let mut rankings = HashMap::new();
        rankings.insert(
            "dense".to_string(),
            RankedResult::from_ordered("dense", vec![(a1, 0.9)]),
        );
        rankings.insert(
            "sparse".to_string(),
            RankedResult::from_ordered("sparse", vec![(a2, 0.8)]),
        );

        let fused = ReciprocalRankFusion::default().fuse(&rankings);
        assert_eq!(fused.len(), 1);
    }
}
