//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{diversity, endpoints, expansion, rerank, retrieval};
use crate::ConfigError;

/// Runtime environment enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Qdrant connection settings
    #[serde(default)]
    pub qdrant: QdrantSettings,

    /// Tantivy sparse index settings
    #[serde(default)]
    pub sparse: SparseSettings,

    /// LLM backend settings (reranking)
    #[serde(default)]
    pub llm: LlmSettings,

    /// Retrieval and fusion configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Weighted re-scoring configuration
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// MMR diversity configuration
    #[serde(default)]
    pub diversity: DiversityConfig,

    /// Adjacent-chunk context expansion configuration
    #[serde(default)]
    pub expansion: ExpansionConfig,

    /// LLM reranker configuration
    #[serde(default)]
    pub reranker: RerankerConfig,
}

/// Qdrant vector store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantSettings {
    #[serde(default = "default_qdrant_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_qdrant_collection")]
    pub collection: String,

    /// API key for cloud deployments
    #[serde(default)]
    pub api_key: Option<String>,

    /// Embedding dimension; must match the embedder in use.
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}
fn default_qdrant_collection() -> String {
    "document_chunks".to_string()
}
fn default_vector_dim() -> usize {
    1024
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            endpoint: default_qdrant_endpoint(),
            collection: default_qdrant_collection(),
            api_key: None,
            vector_dim: default_vector_dim(),
        }
    }
}

/// Tantivy sparse (BM25) index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseSettings {
    /// Index directory. Empty string means an in-memory index.
    #[serde(default)]
    pub index_dir: String,

    /// Writer heap budget in bytes.
    #[serde(default = "default_writer_heap")]
    pub writer_heap_bytes: usize,
}

fn default_writer_heap() -> usize {
    50_000_000
}

impl Default for SparseSettings {
    fn default() -> Self {
        Self {
            index_dir: String::new(),
            writer_heap_bytes: default_writer_heap(),
        }
    }
}

/// LLM backend settings (Ollama-compatible HTTP API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

fn default_ollama_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_llm_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_llm_timeout() -> u64 {
    30
}
fn default_llm_retries() -> u32 {
    2
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_llm_model(),
            timeout_seconds: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

/// Rank fusion strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategyKind {
    /// Reciprocal Rank Fusion, parameterized by `rrf_k`
    Rrf,
    /// Weighted sum of the normalized per-method scores
    #[default]
    WeightedScore,
}

/// Retrieval and fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight of the dense score in the combined hybrid score.
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f32,

    /// Weight of the sparse score in the combined hybrid score.
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f32,

    /// Reciprocal Rank Fusion parameter (higher flattens rank differences)
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Final results returned to the caller
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Candidates fetched from each method before fusion
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,

    #[serde(default)]
    pub fusion_strategy: FusionStrategyKind,
}

fn default_dense_weight() -> f32 {
    retrieval::DENSE_WEIGHT
}
fn default_sparse_weight() -> f32 {
    retrieval::SPARSE_WEIGHT
}
fn default_rrf_k() -> f32 {
    retrieval::RRF_K
}
fn default_top_k() -> usize {
    retrieval::DEFAULT_TOP_K
}
fn default_fetch_k() -> usize {
    retrieval::DEFAULT_FETCH_K
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_weight: default_dense_weight(),
            sparse_weight: default_sparse_weight(),
            rrf_k: default_rrf_k(),
            top_k: default_top_k(),
            fetch_k: default_fetch_k(),
            fusion_strategy: FusionStrategyKind::default(),
        }
    }
}

/// Weighted re-scoring configuration
///
/// The structural boost factors themselves are fixed; this only carries the
/// operator-supplied extras.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScoringConfig {
    /// Extra multiplicative weights keyed by flattened metadata key.
    /// Non-positive values are ignored with a warning at load time.
    #[serde(default)]
    pub custom_weights: BTreeMap<String, f32>,
}

/// MMR diversity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Relevance/diversity trade-off; 1.0 keeps the original order.
    #[serde(default = "default_mmr_lambda")]
    pub lambda: f32,
}

fn default_mmr_lambda() -> f32 {
    diversity::MMR_LAMBDA
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lambda: default_mmr_lambda(),
        }
    }
}

/// Adjacent-chunk context expansion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_adjacency_window")]
    pub window: usize,

    #[serde(default = "default_max_adjacent")]
    pub max_adjacent_per_chunk: usize,

    #[serde(default = "default_max_expanded")]
    pub max_expanded_results: usize,
}

fn default_adjacency_window() -> usize {
    expansion::ADJACENCY_WINDOW
}
fn default_max_adjacent() -> usize {
    expansion::MAX_ADJACENT_PER_CHUNK
}
fn default_max_expanded() -> usize {
    expansion::MAX_EXPANDED_RESULTS
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_adjacency_window(),
            max_adjacent_per_chunk: default_max_adjacent(),
            max_expanded_results: default_max_expanded(),
        }
    }
}

/// LLM reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Reranking is opt-in; the pipeline works without an LLM.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f32,

    #[serde(default = "default_original_weight")]
    pub original_weight: f32,

    /// Concurrent rerank calls in flight.
    #[serde(default = "default_rerank_concurrency")]
    pub concurrency: usize,
}

fn default_relevance_weight() -> f32 {
    rerank::RELEVANCE_WEIGHT
}
fn default_original_weight() -> f32 {
    rerank::ORIGINAL_WEIGHT
}
fn default_rerank_concurrency() -> usize {
    rerank::DEFAULT_CONCURRENCY
}
fn default_true() -> bool {
    true
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            relevance_weight: default_relevance_weight(),
            original_weight: default_original_weight(),
            concurrency: default_rerank_concurrency(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_retrieval()?;
        self.validate_diversity()?;
        self.validate_reranker()?;
        self.validate_scoring();
        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;

        if !(0.0..=1.0).contains(&r.dense_weight) {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.dense_weight".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", r.dense_weight),
            });
        }

        if !(0.0..=1.0).contains(&r.sparse_weight) {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.sparse_weight".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", r.sparse_weight),
            });
        }

        if r.dense_weight + r.sparse_weight <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.dense_weight".to_string(),
                message: "dense_weight and sparse_weight cannot both be zero".to_string(),
            });
        }

        if r.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.rrf_k".to_string(),
                message: format!("Must be positive, got {}", r.rrf_k),
            });
        }

        if r.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.top_k".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if r.top_k > r.fetch_k {
            tracing::warn!(
                "retrieval.top_k ({}) is larger than fetch_k ({}), \
                 results will be limited by retrieval",
                r.top_k,
                r.fetch_k
            );
        }

        Ok(())
    }

    fn validate_diversity(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.diversity.lambda) {
            return Err(ConfigError::InvalidValue {
                field: "diversity.lambda".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", self.diversity.lambda),
            });
        }
        Ok(())
    }

    fn validate_reranker(&self) -> Result<(), ConfigError> {
        let r = &self.reranker;

        if !(0.0..=1.0).contains(&r.relevance_weight) {
            return Err(ConfigError::InvalidValue {
                field: "reranker.relevance_weight".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", r.relevance_weight),
            });
        }

        if !(0.0..=1.0).contains(&r.original_weight) {
            return Err(ConfigError::InvalidValue {
                field: "reranker.original_weight".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", r.original_weight),
            });
        }

        if r.enabled && r.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reranker.concurrency".to_string(),
                message: "Must be at least 1 when reranking is enabled".to_string(),
            });
        }

        Ok(())
    }

    /// Custom weights never fail validation; bad entries are dropped with a
    /// warning so a typo in one weight does not take retrieval down.
    fn validate_scoring(&self) {
        for (key, weight) in &self.scoring.custom_weights {
            if *weight <= 0.0 || !weight.is_finite() {
                tracing::warn!(
                    "scoring.custom_weights[{}] = {} is not a positive finite number, \
                     it will be ignored",
                    key,
                    weight
                );
            }
        }
    }

    /// Custom weights with the invalid entries removed.
    pub fn effective_custom_weights(&self) -> BTreeMap<String, f32> {
        self.scoring
            .custom_weights
            .iter()
            .filter(|(_, w)| **w > 0.0 && w.is_finite())
            .map(|(k, w)| (k.clone(), *w))
            .collect()
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (DOCQA_ prefix)
/// 2. config/{env}.toml (if env specified)
/// 3. config/default.toml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("DOCQA")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
