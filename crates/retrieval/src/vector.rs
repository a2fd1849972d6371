//! Dense vector search using Qdrant
//!
//! Implements [`DenseIndex`] for the pipeline. Chunks are stored with their
//! full metadata as a JSON payload plus flattened key/value fields so that
//! metadata filters can be pushed down to the store.

use std::collections::HashMap;
use std::hash::Hasher;

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
        PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
        VectorParamsBuilder,
    },
    Qdrant,
};
use twox_hash::XxHash64;

use docqa_core::{Chunk, ChunkMetadata, DenseHit, DenseIndex, MetadataFilter, Result};

use crate::RetrievalError;

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Vector dimension
    pub vector_dim: usize,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: docqa_config::constants::endpoints::QDRANT_DEFAULT.to_string(),
            collection: "document_chunks".to_string(),
            vector_dim: 1024,
            api_key: None,
        }
    }
}

impl From<&docqa_config::QdrantSettings> for VectorStoreConfig {
    fn from(settings: &docqa_config::QdrantSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            collection: settings.collection.clone(),
            vector_dim: settings.vector_dim,
            api_key: settings.api_key.clone(),
        }
    }
}

/// Qdrant-backed chunk store
pub struct VectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl VectorStore {
    pub async fn new(config: VectorStoreConfig) -> std::result::Result<Self, RetrievalError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RetrievalError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create collection if not exists
    pub async fn ensure_collection(&self) -> std::result::Result<(), RetrievalError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        }

        Ok(())
    }

    /// Insert chunks with their embeddings.
    pub async fn upsert(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> std::result::Result<(), RetrievalError> {
        if chunks.len() != embeddings.len() {
            return Err(RetrievalError::VectorStore(
                "Chunk and embedding count mismatch".to_string(),
            ));
        }

        let mut points = Vec::with_capacity(chunks.len());
        for (chunk, emb) in chunks.iter().zip(embeddings.iter()) {
            let metadata_json = serde_json::to_string(&chunk.metadata)
                .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;

            let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
            payload.insert("id".to_string(), chunk.id.clone().into());
            payload.insert("content".to_string(), chunk.content.clone().into());
            payload.insert("metadata".to_string(), metadata_json.into());

            // Flattened pairs make every metadata key filterable.
            for (k, v) in chunk.metadata.pairs() {
                payload.insert(k, v.into());
            }

            points.push(PointStruct::new(point_id(&chunk.id), emb.clone(), payload));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;

        Ok(())
    }

    /// Delete all chunks belonging to one source document.
    pub async fn delete_document(
        &self,
        source_document: &str,
    ) -> std::result::Result<(), RetrievalError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.config.collection).points(Filter::must([
                    Condition::matches("source_document", source_document.to_string()),
                ])),
            )
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;

        Ok(())
    }

    fn chunk_from_payload(
        payload: HashMap<String, qdrant_client::qdrant::Value>,
    ) -> Option<Chunk> {
        let mut id = String::new();
        let mut content = String::new();
        let mut metadata = ChunkMetadata::default();

        for (k, v) in payload {
            let Some(Kind::StringValue(s)) = v.kind else {
                continue;
            };
            match k.as_str() {
                "id" => id = s,
                "content" => content = s,
                "metadata" => {
                    metadata = serde_json::from_str(&s).unwrap_or_default();
                }
                _ => {}
            }
        }

        if content.is_empty() && id.is_empty() {
            return None;
        }

        Some(Chunk {
            id,
            content,
            metadata,
        })
    }

    fn filter_to_qdrant(filter: &MetadataFilter) -> Filter {
        Filter::must(
            filter
                .conditions
                .iter()
                .map(|(k, v)| Condition::matches(k.clone(), v.clone())),
        )
    }
}

#[async_trait]
impl DenseIndex for VectorStore {
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<DenseHit>> {
        let mut search_builder =
            SearchPointsBuilder::new(&self.config.collection, vector, limit as u64)
                .with_payload(true);

        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            search_builder = search_builder.filter(Self::filter_to_qdrant(f));
        }

        let results = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| docqa_core::Error::Search(e.to_string()))?;

        let hits = results
            .result
            .into_iter()
            .filter_map(|point| {
                // Cosine similarity back to a distance; the hybrid layer owns
                // the distance-to-score conversion.
                let distance = 1.0 - point.score;
                Self::chunk_from_payload(point.payload)
                    .map(|chunk| DenseHit { chunk, distance })
            })
            .collect();

        Ok(hits)
    }

    async fn fetch_by_indices(
        &self,
        source_document: &str,
        indices: &[usize],
    ) -> Result<Vec<Chunk>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let mut filter = Filter::must([Condition::matches(
            "source_document",
            source_document.to_string(),
        )]);
        filter.should = indices
            .iter()
            .map(|i| Condition::matches("chunk_index", i.to_string()))
            .collect();

        let results = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.config.collection)
                    .filter(filter)
                    .limit(indices.len() as u32)
                    .with_payload(true),
            )
            .await
            .map_err(|e| docqa_core::Error::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|point| Self::chunk_from_payload(point.payload))
            .collect())
    }
}

/// Deterministic numeric point id from the chunk id, so re-ingesting a
/// document overwrites its points instead of duplicating them.
fn point_id(chunk_id: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(chunk_id.as_bytes());
    hasher.finish()
}
