//! Query-time pipeline orchestration
//!
//! Wires the stages together in query order: context analysis, optional
//! chapter-scoped hybrid search with unfiltered fallback, weighted
//! re-scoring, diversity selection, context expansion and optional
//! reranking. Each optional stage is driven by configuration; the pipeline
//! shape itself is fixed.

use std::collections::HashMap;
use std::sync::Arc;

use docqa_core::{DenseIndex, MetadataFilter, QueryEmbedder};
use docqa_config::constants::retrieval as retrieval_constants;
use docqa_config::Settings;

use crate::diversity::DiversityFilter;
use crate::expansion::{ContextExpander, ExpanderConfig};
use crate::hybrid::{HybridConfig, HybridSearcher, SearchResult, SearchSource};
use crate::query_context::{QueryContext, QueryContextAnalyzer};
use crate::reranker::Reranker;
use crate::scoring::{AppliedBoost, WeightedScorer, WeightingConfig};
use crate::sparse::SparseIndexHandle;
use crate::RetrievalError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub hybrid: HybridConfig,
    /// Results kept after diversity selection.
    pub top_k: usize,
    /// Candidates pulled per branch before selection.
    pub fetch_k: usize,
    /// Fetch inflation when a chapter filter narrows the candidate pool.
    pub chapter_filter_fetch_multiplier: usize,
    pub diversity_enabled: bool,
    pub diversity_lambda: f32,
    pub expansion_enabled: bool,
    pub expansion: ExpanderConfig,
    pub rerank_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        use docqa_config::constants::diversity;
        Self {
            hybrid: HybridConfig::default(),
            top_k: retrieval_constants::DEFAULT_TOP_K,
            fetch_k: retrieval_constants::DEFAULT_FETCH_K,
            chapter_filter_fetch_multiplier: retrieval_constants::CHAPTER_FILTER_FETCH_MULTIPLIER,
            diversity_enabled: true,
            diversity_lambda: diversity::MMR_LAMBDA,
            expansion_enabled: true,
            expansion: ExpanderConfig::default(),
            rerank_enabled: false,
        }
    }
}

impl From<&Settings> for EngineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            hybrid: HybridConfig::from(&settings.retrieval),
            top_k: settings.retrieval.top_k,
            fetch_k: settings.retrieval.fetch_k,
            chapter_filter_fetch_multiplier: retrieval_constants::CHAPTER_FILTER_FETCH_MULTIPLIER,
            diversity_enabled: settings.diversity.enabled,
            diversity_lambda: settings.diversity.lambda,
            expansion_enabled: settings.expansion.enabled,
            expansion: ExpanderConfig::from(&settings.expansion),
            rerank_enabled: settings.reranker.enabled,
        }
    }
}

/// One pipeline result with full score provenance.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: docqa_core::Chunk,
    pub dense_score: f32,
    pub sparse_score: f32,
    pub combined_score: f32,
    pub weighted_score: f32,
    /// 1-based position in the final ordering.
    pub rank: usize,
    pub source: SearchSource,
    /// Boost rules that fired on this chunk, in chain order.
    pub applied_boosts: Vec<AppliedBoost>,
    /// LLM relevance grade, when reranking ran.
    pub relevance_score: Option<f32>,
    /// Blended rerank score, when reranking ran.
    pub final_score: Option<f32>,
    pub reasoning: Option<String>,
}

impl RetrievedChunk {
    fn from_search(result: SearchResult, rank: usize, applied_boosts: Vec<AppliedBoost>) -> Self {
        Self {
            chunk: result.chunk,
            dense_score: result.dense_score,
            sparse_score: result.sparse_score,
            combined_score: result.combined_score,
            weighted_score: result.weighted_score,
            rank,
            source: result.source,
            applied_boosts,
            relevance_score: None,
            final_score: None,
            reasoning: None,
        }
    }
}

/// Everything a caller learns from one retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub chunks: Vec<RetrievedChunk>,
    /// True when a chapter filter matched nothing and the pipeline fell
    /// back to unfiltered search.
    pub used_chapter_fallback: bool,
    pub query_context: QueryContext,
}

/// The full query-time retrieval pipeline.
pub struct RetrievalEngine {
    config: EngineConfig,
    analyzer: QueryContextAnalyzer,
    searcher: HybridSearcher,
    scorer: WeightedScorer,
    expander: ContextExpander,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RetrievalEngine {
    pub fn new(
        config: EngineConfig,
        dense_index: Arc<dyn DenseIndex>,
        embedder: Arc<dyn QueryEmbedder>,
        sparse_handle: Arc<SparseIndexHandle>,
    ) -> Self {
        let searcher = HybridSearcher::new(
            config.hybrid.clone(),
            Arc::clone(&dense_index),
            embedder,
            sparse_handle,
        );
        let expander = ContextExpander::new(config.expansion.clone(), dense_index);

        Self {
            config,
            analyzer: QueryContextAnalyzer::new(),
            searcher,
            scorer: WeightedScorer::default(),
            expander,
            reranker: None,
        }
    }

    pub fn with_scorer(mut self, config: WeightingConfig) -> Self {
        self.scorer = WeightedScorer::new(config);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Run the full pipeline for one query.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalOutcome, RetrievalError> {
        let ctx = self.analyzer.analyze(query);
        tracing::debug!(
            chapter = ?ctx.preferred_chapter,
            section = ?ctx.preferred_section,
            query_type = ?ctx.query_type,
            "query context"
        );

        let (mut results, used_chapter_fallback) = self.search_candidates(query, &ctx).await?;

        self.scorer.rescore(&mut results, &ctx);

        let selected = if self.config.diversity_enabled {
            DiversityFilter::new(self.config.diversity_lambda).select(results, self.config.top_k)
        } else {
            results.truncate(self.config.top_k);
            results
        };

        let expanded = if self.config.expansion_enabled {
            self.expander.expand(selected).await
        } else {
            selected
        };

        let chunks = match (&self.reranker, self.config.rerank_enabled) {
            (Some(reranker), true) => self.rerank(query, &ctx, expanded, reranker.as_ref()).await,
            _ => expanded
                .into_iter()
                .enumerate()
                .map(|(i, r)| {
                    let boosts = self.boosts_for(&r, &ctx);
                    RetrievedChunk::from_search(r, i + 1, boosts)
                })
                .collect(),
        };

        Ok(RetrievalOutcome {
            chunks,
            used_chapter_fallback,
            query_context: ctx,
        })
    }

    /// Hybrid search, chapter-scoped when the query names a chapter. A
    /// filter that matches nothing falls back to unfiltered search.
    async fn search_candidates(
        &self,
        query: &str,
        ctx: &QueryContext,
    ) -> Result<(Vec<SearchResult>, bool), RetrievalError> {
        let Some(chapter) = ctx.preferred_chapter.as_deref() else {
            let results = self.searcher.search(query, self.config.fetch_k, None).await?;
            return Ok((results, false));
        };

        let filter = MetadataFilter::chapter(chapter);
        // Filtering shrinks the pool; fetch more so selection still has
        // enough candidates.
        let inflated = self.config.fetch_k * self.config.chapter_filter_fetch_multiplier;

        let mut results = self.searcher.search(query, inflated, Some(&filter)).await?;
        // The sparse branch cannot filter at query time.
        results.retain(|r| filter.matches(&r.chunk.metadata));

        if results.is_empty() {
            tracing::info!(chapter, "no chunk in the requested chapter, searching everywhere");
            let results = self.searcher.search(query, self.config.fetch_k, None).await?;
            return Ok((results, true));
        }

        results.truncate(self.config.fetch_k);
        Ok((results, false))
    }

    /// Boost provenance for one result. Chunks added by expansion never
    /// went through scoring, so they report no boosts.
    fn boosts_for(&self, result: &SearchResult, ctx: &QueryContext) -> Vec<AppliedBoost> {
        if result.source == SearchSource::Expanded {
            Vec::new()
        } else {
            self.scorer.explain(&result.chunk.metadata, ctx).1
        }
    }

    async fn rerank(
        &self,
        query: &str,
        ctx: &QueryContext,
        results: Vec<SearchResult>,
        reranker: &dyn Reranker,
    ) -> Vec<RetrievedChunk> {
        let mut by_id: HashMap<String, SearchResult> = results
            .iter()
            .map(|r| (r.chunk.id.clone(), r.clone()))
            .collect();

        let top_k = results.len();
        let candidates: Vec<_> = results
            .into_iter()
            .map(|r| (r.chunk.clone(), r.weighted_score))
            .collect();

        reranker
            .rerank(query, candidates, top_k)
            .await
            .into_iter()
            .enumerate()
            .map(|(i, reranked)| {
                let origin = by_id.remove(&reranked.chunk.id);
                let applied_boosts = origin
                    .as_ref()
                    .map(|r| self.boosts_for(r, ctx))
                    .unwrap_or_default();
                let (dense, sparse, combined, weighted, source) = origin
                    .map(|r| {
                        (
                            r.dense_score,
                            r.sparse_score,
                            r.combined_score,
                            r.weighted_score,
                            r.source,
                        )
                    })
                    .unwrap_or((0.0, 0.0, 0.0, 0.0, SearchSource::Hybrid));

                RetrievedChunk {
                    chunk: reranked.chunk,
                    dense_score: dense,
                    sparse_score: sparse,
                    combined_score: combined,
                    weighted_score: weighted,
                    rank: i + 1,
                    source,
                    applied_boosts,
                    relevance_score: Some(reranked.relevance_score),
                    final_score: Some(reranked.final_score),
                    reasoning: Some(reranked.reasoning),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_core::{ChapterInfo, Chunk, ChunkMetadata, DenseHit, Result};

    /// Dense index over an in-memory corpus. Similarity is faked from a
    /// per-chunk base score; the filter behaves like the real store's.
    struct MemoryIndex {
        entries: Vec<(Chunk, f32)>,
    }

    #[async_trait]
    impl DenseIndex for MemoryIndex {
        async fn search(
            &self,
            _vector: Vec<f32>,
            limit: usize,
            filter: Option<&MetadataFilter>,
        ) -> Result<Vec<DenseHit>> {
            let mut hits: Vec<DenseHit> = self
                .entries
                .iter()
                .filter(|(chunk, _)| filter.map_or(true, |f| f.matches(&chunk.metadata)))
                .map(|(chunk, score)| DenseHit {
                    chunk: chunk.clone(),
                    distance: 1.0 - score,
                })
                .collect();
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            hits.truncate(limit);
            Ok(hits)
        }

        async fn fetch_by_indices(&self, doc: &str, indices: &[usize]) -> Result<Vec<Chunk>> {
            Ok(self
                .entries
                .iter()
                .filter(|(c, _)| {
                    c.metadata.source_document == doc
                        && indices.contains(&c.metadata.chunk_index)
                })
                .map(|(c, _)| c.clone())
                .collect())
        }
    }

    struct FixedEmbedder;

    impl QueryEmbedder for FixedEmbedder {
        fn embed(&self, _query: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; 8])
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    fn chunk(id: &str, index: usize, chapter: Option<&str>) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: format!("contenu du chunk {id}"),
            metadata: ChunkMetadata {
                source_document: "cours.pdf".into(),
                chunk_index: index,
                chapter: chapter.map(|n| ChapterInfo {
                    number: n.into(),
                    title: None,
                    raw_number: None,
                }),
                ..Default::default()
            },
        }
    }

    fn engine(entries: Vec<(Chunk, f32)>, config: EngineConfig) -> RetrievalEngine {
        RetrievalEngine::new(
            config,
            Arc::new(MemoryIndex { entries }),
            Arc::new(FixedEmbedder),
            Arc::new(SparseIndexHandle::new()),
        )
    }

    fn plain_config() -> EngineConfig {
        EngineConfig {
            diversity_enabled: false,
            expansion_enabled: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn chapter_query_scopes_results() {
        let entries = vec![
            (chunk("a", 0, Some("2")), 0.9),
            (chunk("b", 1, Some("4")), 0.5),
            (chunk("c", 2, Some("4")), 0.4),
        ];
        let engine = engine(entries, plain_config());

        let outcome = engine.retrieve("chapitre 4 les fonctions").await.unwrap();

        assert!(!outcome.used_chapter_fallback);
        assert_eq!(outcome.query_context.preferred_chapter.as_deref(), Some("4"));
        assert_eq!(outcome.chunks.len(), 2);
        assert!(outcome.chunks.iter().all(|r| {
            r.chunk.metadata.chapter.as_ref().map(|c| c.number.as_str()) == Some("4")
        }));
    }

    #[tokio::test]
    async fn empty_chapter_falls_back_to_unfiltered() {
        let entries = vec![
            (chunk("a", 0, Some("1")), 0.9),
            (chunk("b", 1, Some("2")), 0.5),
        ];
        let engine = engine(entries, plain_config());

        let outcome = engine.retrieve("chapitre 9 les fonctions").await.unwrap();

        assert!(outcome.used_chapter_fallback);
        assert_eq!(outcome.chunks.len(), 2);
    }

    #[tokio::test]
    async fn unstructured_query_never_flags_fallback() {
        let entries = vec![(chunk("a", 0, None), 0.9)];
        let engine = engine(entries, plain_config());

        let outcome = engine.retrieve("les fonctions").await.unwrap();
        assert!(!outcome.used_chapter_fallback);
        assert_eq!(outcome.chunks.len(), 1);
        assert_eq!(outcome.chunks[0].rank, 1);
        assert!(outcome.chunks[0].relevance_score.is_none());
    }

    #[tokio::test]
    async fn top_k_bounds_selection() {
        let entries: Vec<(Chunk, f32)> = (0..30)
            .map(|i| (chunk(&format!("c{i}"), i, None), 0.9 - i as f32 * 0.01))
            .collect();
        let config = EngineConfig {
            top_k: 3,
            expansion_enabled: false,
            ..Default::default()
        };
        let engine = engine(entries, config);

        let outcome = engine.retrieve("les fonctions").await.unwrap();
        assert_eq!(outcome.chunks.len(), 3);
        let ranks: Vec<usize> = outcome.chunks.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }
}
