//! Core types and traits for the docqa retrieval engine
//!
//! This crate provides the foundational types shared across all other crates:
//! - Chunk and structural metadata model (chapters, sections, provenance)
//! - Composite chunk identity for cross-stage deduplication
//! - Metadata filters for scoped retrieval
//! - Traits for pluggable external collaborators (vector index, embedder)
//! - Error types

pub mod chunk;
pub mod error;
pub mod filter;
pub mod traits;

pub use chunk::{
    ChapterInfo, Chunk, ChunkIdentity, ChunkMetadata, DocumentType, SectionInfo,
};
pub use error::{Error, Result};
pub use filter::MetadataFilter;
pub use traits::{DenseHit, DenseIndex, QueryEmbedder};
