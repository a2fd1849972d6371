//! Ingestion-time structural metadata
//!
//! `extractor` parses chapter/section structure out of raw text;
//! `ingest` turns raw document chunks into tagged [`docqa_core::Chunk`]s,
//! including the inheritance pass that back-fills tags on chunks that carry
//! no structure of their own.

pub mod extractor;
pub mod ingest;

pub use extractor::{ElementKind, StructuralElement, StructuralExtractor};
pub use ingest::{ChunkIngestor, DocumentStats, RawChunk};
