//! Traits for pluggable external collaborators
//!
//! The retrieval engine talks to its vector store and embedder through these
//! traits so that tests can substitute in-memory fakes and deployments can
//! swap backends without touching the pipeline.

use async_trait::async_trait;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::filter::MetadataFilter;

/// A single dense-search hit: the stored chunk plus its raw distance.
#[derive(Debug, Clone)]
pub struct DenseHit {
    pub chunk: Chunk,
    /// Raw distance as reported by the store; lower is closer. Converted to
    /// a similarity in [0, 1] by the hybrid layer.
    pub distance: f32,
}

/// Dense (vector) index over ingested chunks.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Nearest-neighbour search, optionally constrained by a metadata
    /// pre-filter. Results come back ordered by ascending distance.
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<DenseHit>>;

    /// Fetch chunks from one source document by their chunk indices.
    /// Missing indices are silently absent from the result.
    async fn fetch_by_indices(
        &self,
        source_document: &str,
        indices: &[usize],
    ) -> Result<Vec<Chunk>>;
}

/// Produces the query-side embedding. Embedding is CPU-bound in every
/// backend we use, so the trait is synchronous; callers move it onto a
/// blocking thread.
pub trait QueryEmbedder: Send + Sync {
    fn embed(&self, query: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}
