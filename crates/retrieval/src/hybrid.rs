//! Hybrid search coordinator
//!
//! Runs dense (vector) and sparse (BM25) retrieval in parallel and merges
//! the two rankings by composite chunk identity. One branch failing
//! degrades to the other branch alone; the search only errors when no
//! branch can deliver results at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use docqa_config::FusionStrategyKind;
use docqa_core::{Chunk, ChunkIdentity, DenseIndex, MetadataFilter, QueryEmbedder};

use crate::fusion::{FusionStrategy, RankedResult, ReciprocalRankFusion};
use crate::sparse::SparseIndexHandle;
use crate::RetrievalError;

/// How the two branch rankings combine into one score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FusionKind {
    /// `dense_weight · dense + sparse_weight · sparse` over normalized scores.
    Weighted,
    /// Reciprocal Rank Fusion over the two branch rankings.
    ReciprocalRank { k: f32 },
}

/// Hybrid search configuration
#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Weight of the dense score in the combined score.
    pub dense_weight: f32,
    /// Weight of the sparse score in the combined score.
    pub sparse_weight: f32,
    /// Candidates fetched from the dense branch.
    pub dense_k: usize,
    /// Candidates fetched from the sparse branch.
    pub sparse_k: usize,
    /// Per-branch deadline. A branch that overruns it degrades to empty.
    pub branch_timeout: Duration,
    /// Combine strategy for the merged branch scores.
    pub fusion: FusionKind,
}

impl Default for HybridConfig {
    fn default() -> Self {
        use docqa_config::constants::retrieval;
        Self {
            dense_weight: retrieval::DENSE_WEIGHT,
            sparse_weight: retrieval::SPARSE_WEIGHT,
            dense_k: retrieval::DEFAULT_FETCH_K,
            sparse_k: retrieval::DEFAULT_FETCH_K,
            branch_timeout: Duration::from_secs(10),
            fusion: FusionKind::Weighted,
        }
    }
}

impl From<&docqa_config::RetrievalConfig> for HybridConfig {
    fn from(config: &docqa_config::RetrievalConfig) -> Self {
        let fusion = match config.fusion_strategy {
            FusionStrategyKind::WeightedScore => FusionKind::Weighted,
            FusionStrategyKind::Rrf => FusionKind::ReciprocalRank { k: config.rrf_k },
        };
        Self {
            dense_weight: config.dense_weight,
            sparse_weight: config.sparse_weight,
            dense_k: config.fetch_k,
            sparse_k: config.fetch_k,
            fusion,
            ..Default::default()
        }
    }
}

/// Which branch produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSource {
    Dense,
    Sparse,
    Hybrid,
    /// Added by context expansion, not retrieved for the query itself.
    Expanded,
}

/// Merged search result with per-branch and combined scores.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Similarity in [0, 1]; 0.0 when the dense branch did not return it.
    pub dense_score: f32,
    /// Normalized BM25 in (0, 1); 0.0 when the sparse branch did not return it.
    pub sparse_score: f32,
    pub combined_score: f32,
    /// Set by the weighted scoring stage; starts equal to combined_score.
    pub weighted_score: f32,
    /// 1-based rank after the combined-score sort.
    pub rank: usize,
    pub source: SearchSource,
}

/// Coordinates dense and sparse retrieval.
pub struct HybridSearcher {
    config: HybridConfig,
    dense_index: Arc<dyn DenseIndex>,
    embedder: Arc<dyn QueryEmbedder>,
    sparse_handle: Arc<SparseIndexHandle>,
}

impl HybridSearcher {
    pub fn new(
        config: HybridConfig,
        dense_index: Arc<dyn DenseIndex>,
        embedder: Arc<dyn QueryEmbedder>,
        sparse_handle: Arc<SparseIndexHandle>,
    ) -> Self {
        Self {
            config,
            dense_index,
            embedder,
            sparse_handle,
        }
    }

    /// Hybrid search: both branches in parallel, merged by identity,
    /// sorted descending by combined score with 1-based ranks.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> std::result::Result<Vec<SearchResult>, RetrievalError> {
        // A metadata filter narrows the pool after fetch, so callers may
        // request more than the configured branch size.
        let dense_k = self.config.dense_k.max(k);
        let sparse_k = self.config.sparse_k.max(k);
        let sparse_available = self.sparse_handle.current().is_some();

        let deadline = self.config.branch_timeout;
        let dense_future = tokio::time::timeout(deadline, self.search_dense(query, dense_k, filter));
        let sparse_future = tokio::time::timeout(deadline, self.search_sparse(query, sparse_k));

        let (dense_result, sparse_result) = tokio::join!(dense_future, sparse_future);

        let (dense, dense_error) = match dense_result {
            Ok(Ok(hits)) => (hits, None),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "dense search failed, degrading to sparse only");
                (Vec::new(), Some(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(timeout = ?deadline, "dense search timed out");
                (Vec::new(), Some(format!("timed out after {:?}", deadline)))
            }
        };
        let (sparse, sparse_error) = match sparse_result {
            Ok(Ok(hits)) => (hits, None),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "sparse search failed, degrading to dense only");
                (Vec::new(), Some(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(timeout = ?deadline, "sparse search timed out");
                (Vec::new(), Some(format!("timed out after {:?}", deadline)))
            }
        };

        // An empty corpus is a valid empty result, but a failed dense branch
        // with nothing to fall back on means nothing is retrievable at all.
        if let Some(dense_error) = dense_error {
            if let Some(sparse_error) = sparse_error {
                return Err(RetrievalError::Search(format!(
                    "both retrieval branches failed: dense: {dense_error}; sparse: {sparse_error}"
                )));
            }
            if !sparse_available {
                return Err(RetrievalError::Search(format!(
                    "dense search failed with no sparse index to fall back on: {dense_error}"
                )));
            }
        }

        let mut merged = self.merge(dense, sparse);
        merged.truncate(k);
        Ok(merged)
    }

    /// Dense branch: embed the query off the async runtime, then search the
    /// vector index. Distances convert to similarities via `1/(1+d)`.
    pub async fn search_dense(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> std::result::Result<Vec<(Chunk, f32)>, RetrievalError> {
        let embedder = Arc::clone(&self.embedder);
        let query_owned = query.to_string();

        // Embedding is CPU-bound; keep it off the tokio workers.
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&query_owned))
            .await
            .map_err(|e| RetrievalError::Embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let hits = self
            .dense_index
            .search(vector, k, filter)
            .await
            .map_err(RetrievalError::from)?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let similarity = 1.0 / (1.0 + hit.distance.max(0.0));
                (hit.chunk, similarity)
            })
            .collect())
    }

    /// Sparse branch: BM25 over the published index, scores normalized onto
    /// (0, 1) via `s/(s+1)`. An unbuilt index degrades to an empty list.
    pub async fn search_sparse(
        &self,
        query: &str,
        k: usize,
    ) -> std::result::Result<Vec<(Chunk, f32)>, RetrievalError> {
        let Some(index) = self.sparse_handle.current() else {
            tracing::debug!("no sparse index published, dense-only retrieval");
            return Ok(Vec::new());
        };

        let query_owned = query.to_string();
        let results = tokio::task::spawn_blocking(move || index.search(&query_owned, k))
            .await
            .map_err(|e| RetrievalError::Search(format!("Sparse search task failed: {}", e)))??;

        Ok(results
            .into_iter()
            .map(|r| {
                let normalized = r.score / (r.score + 1.0);
                (r.chunk, normalized)
            })
            .collect())
    }

    /// Merge branch results by composite identity. A chunk found by only
    /// one branch keeps 0.0 for the other branch's score. Discovery order
    /// is preserved through the stable sort, so equal combined scores keep
    /// their original relative order.
    fn merge(&self, dense: Vec<(Chunk, f32)>, sparse: Vec<(Chunk, f32)>) -> Vec<SearchResult> {
        let fused_scores = match self.config.fusion {
            FusionKind::Weighted => None,
            FusionKind::ReciprocalRank { k } => Some(Self::rrf_scores(k, &dense, &sparse)),
        };

        let mut by_identity: HashMap<ChunkIdentity, usize> = HashMap::new();
        let mut results: Vec<SearchResult> = Vec::new();

        for (chunk, score) in dense {
            let identity = chunk.identity();
            by_identity.entry(identity).or_insert_with(|| {
                results.push(SearchResult {
                    chunk,
                    dense_score: score,
                    sparse_score: 0.0,
                    combined_score: 0.0,
                    weighted_score: 0.0,
                    rank: 0,
                    source: SearchSource::Dense,
                });
                results.len() - 1
            });
        }

        for (chunk, score) in sparse {
            let identity = chunk.identity();
            match by_identity.get(&identity) {
                Some(&i) => {
                    results[i].sparse_score = score;
                    results[i].source = SearchSource::Hybrid;
                }
                None => {
                    by_identity.insert(identity, results.len());
                    results.push(SearchResult {
                        chunk,
                        dense_score: 0.0,
                        sparse_score: score,
                        combined_score: 0.0,
                        weighted_score: 0.0,
                        rank: 0,
                        source: SearchSource::Sparse,
                    });
                }
            }
        }

        for result in &mut results {
            result.combined_score = match &fused_scores {
                Some(scores) => scores.get(&result.chunk.identity()).copied().unwrap_or(0.0),
                None => {
                    self.config.dense_weight * result.dense_score
                        + self.config.sparse_weight * result.sparse_score
                }
            };
            result.weighted_score = result.combined_score;
        }

        results.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));

        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }

        results
    }

    /// RRF over the two branch rankings, keyed by identity so the weighted
    /// loop above can look fused scores up per merged result.
    fn rrf_scores(
        k: f32,
        dense: &[(Chunk, f32)],
        sparse: &[(Chunk, f32)],
    ) -> HashMap<ChunkIdentity, f32> {
        let mut rankings = HashMap::new();
        rankings.insert(
            "dense".to_string(),
            RankedResult::from_ordered("dense", dense.to_vec()),
        );
        rankings.insert(
            "sparse".to_string(),
            RankedResult::from_ordered("sparse", sparse.to_vec()),
        );

        ReciprocalRankFusion::new(k)
            .fuse(&rankings)
            .into_iter()
            .map(|r| (r.chunk.identity(), r.score))
            .collect()
    }
}
