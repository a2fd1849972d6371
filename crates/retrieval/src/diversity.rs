//! MMR-style diversity filtering
//!
//! Greedy selection balancing relevance (position in the incoming ranked
//! list) against structural variety. Deterministic for a fixed input order;
//! no randomness, no external calls.

use docqa_core::Chunk;

use docqa_config::constants::diversity;

use crate::hybrid::SearchResult;

/// Diversity filter over a relevance-ordered candidate list.
#[derive(Debug, Clone, Copy)]
pub struct DiversityFilter {
    /// Relevance/diversity trade-off. 1.0 keeps the incoming order.
    lambda: f32,
}

impl Default for DiversityFilter {
    fn default() -> Self {
        Self {
            lambda: diversity::MMR_LAMBDA,
        }
    }
}

impl DiversityFilter {
    pub fn new(lambda: f32) -> Self {
        Self {
            lambda: lambda.clamp(0.0, 1.0),
        }
    }

    /// Select `k` chunks from relevance-ordered candidates.
    ///
    /// Seeds with the top candidate, then repeatedly picks the remaining
    /// candidate maximizing `lambda * 1/(pos+1) + (1-lambda) * diversity`,
    /// where diversity accumulates against every already-selected chunk.
    pub fn select(&self, candidates: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
        if candidates.len() <= k {
            return candidates;
        }

        let mut remaining = candidates;
        let mut selected = vec![remaining.remove(0)];

        while selected.len() < k && !remaining.is_empty() {
            let mut best_idx = 0;
            let mut best_score = f32::NEG_INFINITY;

            for (i, candidate) in remaining.iter().enumerate() {
                let relevance = 1.0 / (i as f32 + 1.0);
                let div = Self::diversity_score(&candidate.chunk, &selected);
                let combined = self.lambda * relevance + (1.0 - self.lambda) * div;

                if combined > best_score {
                    best_score = combined;
                    best_idx = i;
                }
            }

            selected.push(remaining.remove(best_idx));
        }

        selected
    }

    /// Accumulated structural difference against the selected set.
    fn diversity_score(chunk: &Chunk, selected: &[SearchResult]) -> f32 {
        let mut score = 0.0;

        for other in selected {
            let a = &chunk.metadata;
            let b = &other.chunk.metadata;

            if a.chapter.as_ref().map(|c| &c.number) != b.chapter.as_ref().map(|c| &c.number) {
                score += diversity::CHAPTER_DIVERSITY_BONUS;
            }
            if a.section.as_ref().map(|s| &s.number) != b.section.as_ref().map(|s| &s.number) {
                score += diversity::SECTION_DIVERSITY_BONUS;
            }
            if a.content_length.abs_diff(b.content_length) > diversity::LENGTH_DIVERSITY_THRESHOLD {
                score += diversity::LENGTH_DIVERSITY_BONUS;
            }
        }

        score
    }
}
