//! Sparse lexical search using Tantivy (BM25)
//!
//! The index is rebuilt at ingestion time and published through
//! [`SparseIndexHandle`] with an atomic swap, so concurrent queries never
//! observe a partially-built index.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED, STRING},
    tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument,
};

use docqa_core::{Chunk, ChunkMetadata};

use crate::RetrievalError;

/// Sparse search configuration
#[derive(Debug, Clone)]
pub struct SparseConfig {
    /// Index path (use RAM if None)
    pub index_path: Option<String>,
    /// Writer heap budget in bytes
    pub writer_heap_bytes: usize,
    /// Language for stemming ("fr", "en", or anything else for none)
    pub language: String,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            writer_heap_bytes: 50_000_000,
            language: "fr".to_string(),
        }
    }
}

impl From<&docqa_config::SparseSettings> for SparseConfig {
    fn from(settings: &docqa_config::SparseSettings) -> Self {
        Self {
            index_path: if settings.index_dir.is_empty() {
                None
            } else {
                Some(settings.index_dir.clone())
            },
            writer_heap_bytes: settings.writer_heap_bytes,
            ..Default::default()
        }
    }
}

/// Sparse search result
#[derive(Debug, Clone)]
pub struct SparseResult {
    pub chunk: Chunk,
    /// Raw BM25 score, unnormalized.
    pub score: f32,
}

/// BM25 index over the chunk corpus
pub struct SparseIndex {
    index: Index,
    reader: IndexReader,
    writer: RwLock<Option<IndexWriter>>,
    id_field: Field,
    content_field: Field,
    metadata_field: Field,
}

impl SparseIndex {
    pub fn new(config: SparseConfig) -> Result<Self, RetrievalError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("docqa")
                    .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let content_field = schema_builder.add_text_field("content", text_options);
        // Full metadata as JSON so results round-trip into Chunks.
        let metadata_field = schema_builder.add_text_field("metadata", STORED);

        let schema = schema_builder.build();

        let index = if let Some(ref path) = config.index_path {
            let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                .map_err(|e| RetrievalError::Index(e.to_string()))?;
            Index::open_or_create(dir, schema.clone())
                .map_err(|e| RetrievalError::Index(e.to_string()))?
        } else {
            Index::create_in_ram(schema.clone())
        };

        index.tokenizers().register("docqa", Self::build_tokenizer(&config));

        let reader = index
            .reader()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        let writer = index
            .writer(config.writer_heap_bytes)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        tracing::info!(language = %config.language, "sparse index created");

        Ok(Self {
            index,
            reader,
            writer: RwLock::new(Some(writer)),
            id_field,
            content_field,
            metadata_field,
        })
    }

    fn build_tokenizer(config: &SparseConfig) -> TextAnalyzer {
        let base = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser);

        match config.language.as_str() {
            "fr" => base.filter(Stemmer::new(Language::French)).build(),
            "en" => base.filter(Stemmer::new(Language::English)).build(),
            other => {
                tracing::warn!(
                    "Language '{}' has no stemmer, using simple tokenization",
                    other
                );
                base.build()
            }
        }
    }

    /// Index a batch of chunks and commit.
    pub fn index_chunks(&self, chunks: &[Chunk]) -> Result<(), RetrievalError> {
        let mut writer = self.writer.write();
        let writer = writer
            .as_mut()
            .ok_or_else(|| RetrievalError::Index("Writer not available".to_string()))?;

        for chunk in chunks {
            let metadata_json = serde_json::to_string(&chunk.metadata)
                .map_err(|e| RetrievalError::Index(e.to_string()))?;

            let mut doc = TantivyDocument::default();
            doc.add_text(self.id_field, &chunk.id);
            doc.add_text(self.content_field, &chunk.content);
            doc.add_text(self.metadata_field, &metadata_json);

            writer
                .add_document(doc)
                .map_err(|e| RetrievalError::Index(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        Ok(())
    }

    /// BM25 search over chunk content.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SparseResult>, RetrievalError> {
        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.content_field]);

        let parsed = query_parser
            .parse_query_lenient(query)
            .0;

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(top_k))
            .map_err(|e| RetrievalError::Search(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());

        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| RetrievalError::Search(e.to_string()))?;

            let id = Self::stored_str(&doc, self.id_field);
            let content = Self::stored_str(&doc, self.content_field);
            let metadata: ChunkMetadata = serde_json::from_str(
                &Self::stored_str(&doc, self.metadata_field),
            )
            .unwrap_or_default();

            results.push(SparseResult {
                chunk: Chunk {
                    id,
                    content,
                    metadata,
                },
                score,
            });
        }

        Ok(results)
    }

    fn stored_str(doc: &TantivyDocument, field: Field) -> String {
        doc.get_first(field)
            .and_then(|v| match v {
                OwnedValue::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .unwrap_or("")
            .to_string()
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

/// Read-side handle publishing the current sparse index.
///
/// `rebuild` constructs the new index fully off to the side; `publish`
/// swaps it in atomically. Readers clone the Arc and keep searching the old
/// snapshot until they next call `current`.
#[derive(Default)]
pub struct SparseIndexHandle {
    inner: RwLock<Option<Arc<SparseIndex>>>,
}

impl SparseIndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently published index, if any corpus has been indexed yet.
    pub fn current(&self) -> Option<Arc<SparseIndex>> {
        self.inner.read().clone()
    }

    /// Atomically publish a fully-built index.
    pub fn publish(&self, index: Arc<SparseIndex>) {
        let docs = index.doc_count();
        *self.inner.write() = Some(index);
        tracing::info!(docs, "sparse index published");
    }

    /// Build an index over the full corpus and publish it.
    pub fn rebuild(&self, config: SparseConfig, chunks: &[Chunk]) -> Result<(), RetrievalError> {
        let index = SparseIndex::new(config)?;
        index.index_chunks(chunks)?;
        self.publish(Arc::new(index));
        Ok(())
    }
}
