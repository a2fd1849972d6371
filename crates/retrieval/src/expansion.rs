//! Adjacent-chunk context expansion
//!
//! Stitches chunks adjacent to the selected ones back into the result set
//! for continuity. Lookups run per source document, in parallel; a failing
//! document lookup only skips that document's neighbors, never its
//! already-selected chunks.

use std::collections::HashSet;
use std::hash::Hasher;
use std::sync::Arc;

use futures::future::join_all;
use twox_hash::XxHash64;

use docqa_core::{Chunk, DenseIndex};
use docqa_config::constants::expansion;

use crate::hybrid::{SearchResult, SearchSource};

/// Context expansion configuration
#[derive(Debug, Clone)]
pub struct ExpanderConfig {
    /// How far (in chunk indices) to look on each side.
    pub window: usize,
    /// Adjacent chunks kept per selected chunk.
    pub max_adjacent_per_chunk: usize,
    /// Hard ceiling on the expanded result set.
    pub max_expanded_results: usize,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            window: expansion::ADJACENCY_WINDOW,
            max_adjacent_per_chunk: expansion::MAX_ADJACENT_PER_CHUNK,
            max_expanded_results: expansion::MAX_EXPANDED_RESULTS,
        }
    }
}

impl From<&docqa_config::ExpansionConfig> for ExpanderConfig {
    fn from(config: &docqa_config::ExpansionConfig) -> Self {
        Self {
            window: config.window,
            max_adjacent_per_chunk: config.max_adjacent_per_chunk,
            max_expanded_results: config.max_expanded_results,
        }
    }
}

/// Expands a selected result set with neighboring chunks.
pub struct ContextExpander {
    config: ExpanderConfig,
    dense_index: Arc<dyn DenseIndex>,
}

impl ContextExpander {
    pub fn new(config: ExpanderConfig, dense_index: Arc<dyn DenseIndex>) -> Self {
        Self {
            config,
            dense_index,
        }
    }

    /// Expand the selected set with adjacent chunks, deduplicate by content
    /// prefix, and truncate to the cap.
    pub async fn expand(&self, selected: Vec<SearchResult>) -> Vec<SearchResult> {
        if selected.is_empty() {
            return selected;
        }

        // Group by source document, preserving first-seen document order.
        let mut doc_order: Vec<String> = Vec::new();
        let mut groups: Vec<Vec<SearchResult>> = Vec::new();
        for result in selected {
            let doc = result.chunk.metadata.source_document.clone();
            match doc_order.iter().position(|d| *d == doc) {
                Some(i) => groups[i].push(result),
                None => {
                    doc_order.push(doc);
                    groups.push(vec![result]);
                }
            }
        }

        let futures = doc_order
            .iter()
            .zip(groups.into_iter())
            .map(|(doc, group)| self.expand_document(doc.clone(), group));

        let mut expanded: Vec<SearchResult> = Vec::new();
        for group in join_all(futures).await {
            expanded.extend(group);
        }

        let deduped = Self::dedup_by_prefix(expanded);
        deduped
            .into_iter()
            .take(self.config.max_expanded_results)
            .collect()
    }

    /// Expand one document's group: originals first, then each original's
    /// neighbors. A lookup failure keeps the originals and skips neighbors.
    async fn expand_document(&self, doc: String, mut group: Vec<SearchResult>) -> Vec<SearchResult> {
        group.sort_by_key(|r| r.chunk.metadata.chunk_index);

        let mut out = Vec::new();

        for result in group {
            let target_index = result.chunk.metadata.chunk_index;
            out.push(result);

            match self.fetch_adjacent(&doc, target_index).await {
                Ok(adjacent) => {
                    out.extend(adjacent.into_iter().map(|chunk| SearchResult {
                        chunk,
                        dense_score: 0.0,
                        sparse_score: 0.0,
                        combined_score: 0.0,
                        weighted_score: 0.0,
                        rank: 0,
                        source: SearchSource::Expanded,
                    }));
                }
                Err(e) => {
                    tracing::warn!(document = %doc, error = %e, "adjacent chunk lookup failed");
                }
            }
        }

        out
    }

    async fn fetch_adjacent(
        &self,
        doc: &str,
        target_index: usize,
    ) -> docqa_core::Result<Vec<Chunk>> {
        let window = self.config.window;
        let lo = target_index.saturating_sub(window);
        let hi = target_index + window;
        let indices: Vec<usize> = (lo..=hi).filter(|&i| i != target_index).collect();

        let mut chunks = self.dense_index.fetch_by_indices(doc, &indices).await?;

        // The store may return more than asked for; re-check adjacency.
        chunks.retain(|c| {
            let i = c.metadata.chunk_index;
            i != target_index && i.abs_diff(target_index) <= window
        });
        chunks.truncate(self.config.max_adjacent_per_chunk);

        Ok(chunks)
    }

    /// Keep the first occurrence of each content prefix. Selected chunks
    /// precede their neighbors, so an original always wins over a
    /// near-duplicate neighbor.
    fn dedup_by_prefix(results: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut seen: HashSet<u64> = HashSet::new();
        let mut unique = Vec::with_capacity(results.len());

        for result in results {
            let hash = prefix_hash(&result.chunk.content);
            if seen.insert(hash) {
                unique.push(result);
            }
        }

        unique
    }
}

/// Hash of the first DEDUP_PREFIX_CHARS characters of a chunk's content.
fn prefix_hash(content: &str) -> u64 {
    let prefix: String = content.chars().take(expansion::DEDUP_PREFIX_CHARS).collect();
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(prefix.as_bytes());
    hasher.finish()
}
