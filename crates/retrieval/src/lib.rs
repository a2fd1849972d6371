//! Contextual hybrid retrieval and ranking engine
//!
//! Pipeline stages, in query order:
//! - Query context analysis (structural intent, query type)
//! - Hybrid search: dense (Qdrant) + sparse (Tantivy BM25) in parallel,
//!   merged by composite chunk identity
//! - Rank fusion strategies (RRF, weighted score) for arbitrary ranked lists
//! - Metadata-driven weighted re-scoring
//! - MMR-style diversity filtering
//! - Adjacent-chunk context expansion
//! - Optional LLM reranking with a heuristic fallback
//!
//! Structural metadata extraction runs once at ingestion time and tags every
//! chunk with chapter/section information that the query-time stages consume.

pub mod diversity;
pub mod engine;
pub mod expansion;
pub mod fusion;
pub mod hybrid;
pub mod metadata;
pub mod query_context;
pub mod reranker;
pub mod scoring;
pub mod sparse;
pub mod vector;

pub use diversity::DiversityFilter;
pub use engine::{EngineConfig, RetrievalEngine, RetrievalOutcome, RetrievedChunk};
pub use expansion::{ContextExpander, ExpanderConfig};
pub use fusion::{FusionStrategy, RankedResult, ReciprocalRankFusion, WeightedScoreFusion};
pub use hybrid::{FusionKind, HybridConfig, HybridSearcher, SearchResult, SearchSource};
pub use metadata::extractor::StructuralExtractor;
pub use metadata::ingest::{ChunkIngestor, DocumentStats, RawChunk};
pub use query_context::{QueryContext, QueryContextAnalyzer, QueryType};
pub use reranker::{HeuristicReranker, LlmReranker, RerankedResult, Reranker};
pub use scoring::{AppliedBoost, WeightedScorer, WeightingConfig};
pub use sparse::{SparseConfig, SparseIndex, SparseIndexHandle, SparseResult};
pub use vector::{VectorStore, VectorStoreConfig};

use thiserror::Error;

/// Retrieval pipeline errors
///
/// Per-item failures inside a stage (one rerank call, one adjacent-chunk
/// lookup) are handled with documented fallback values and never surface
/// here. These variants cover total failures of a stage.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Rerank error: {0}")]
    Rerank(String),
}

impl From<RetrievalError> for docqa_core::Error {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Connection(m) | RetrievalError::VectorStore(m) => {
                docqa_core::Error::VectorStore(m)
            }
            RetrievalError::Embedding(m) => docqa_core::Error::Embedding(m),
            RetrievalError::Search(m) => docqa_core::Error::Search(m),
            RetrievalError::Index(m) => docqa_core::Error::Index(m),
            RetrievalError::Rerank(m) => docqa_core::Error::Rerank(m),
        }
    }
}

impl From<docqa_core::Error> for RetrievalError {
    fn from(err: docqa_core::Error) -> Self {
        match err {
            docqa_core::Error::VectorStore(m) => RetrievalError::VectorStore(m),
            docqa_core::Error::Embedding(m) => RetrievalError::Embedding(m),
            docqa_core::Error::Search(m) => RetrievalError::Search(m),
            docqa_core::Error::Index(m) => RetrievalError::Index(m),
            docqa_core::Error::Rerank(m) | docqa_core::Error::Llm(m) => RetrievalError::Rerank(m),
            docqa_core::Error::Config(m) => RetrievalError::Search(m),
        }
    }
}
