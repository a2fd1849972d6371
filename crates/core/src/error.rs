//! Error types shared across the workspace

use thiserror::Error;

/// Top-level error for callers of the retrieval engine.
///
/// Per-item failures (one rerank call, one adjacent-chunk lookup) never
/// surface here; they are converted to documented fallback values inside the
/// stage that produced them. Only total failures propagate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Rerank error: {0}")]
    Rerank(String),

    #[error("LLM error: {0}")]
    Llm(String),
}

pub type Result<T> = std::result::Result<T, Error>;
