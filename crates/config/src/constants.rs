//! Centralized constants for retrieval tuning
//!
//! Every magic number in the pipeline lives here so that defaults, config
//! validation, and tests agree on a single source of truth.

/// Hybrid search and fusion parameters.
pub mod retrieval {
    /// Weight of the dense (vector) score in the combined hybrid score.
    pub const DENSE_WEIGHT: f32 = 0.6;

    /// Weight of the sparse (BM25) score in the combined hybrid score.
    pub const SPARSE_WEIGHT: f32 = 0.4;

    /// Reciprocal Rank Fusion constant; higher flattens rank differences.
    pub const RRF_K: f32 = 60.0;

    /// Results returned to the caller after the full pipeline.
    pub const DEFAULT_TOP_K: usize = 5;

    /// Candidates fetched from each retrieval method before fusion.
    pub const DEFAULT_FETCH_K: usize = 20;

    /// Over-fetch multiplier when a chapter filter will be applied after
    /// retrieval.
    pub const CHAPTER_FILTER_FETCH_MULTIPLIER: usize = 2;
}

/// Maximal Marginal Relevance diversity parameters.
pub mod diversity {
    /// Trade-off between original relevance and diversity. 1.0 keeps the
    /// original order, 0.0 maximizes diversity.
    pub const MMR_LAMBDA: f32 = 0.7;

    /// Diversity credit when two chunks come from different chapters.
    pub const CHAPTER_DIVERSITY_BONUS: f32 = 0.3;

    /// Diversity credit when two chunks come from different sections.
    pub const SECTION_DIVERSITY_BONUS: f32 = 0.2;

    /// Diversity credit when content lengths differ by more than
    /// [`LENGTH_DIVERSITY_THRESHOLD`] characters.
    pub const LENGTH_DIVERSITY_BONUS: f32 = 0.1;

    pub const LENGTH_DIVERSITY_THRESHOLD: usize = 100;
}

/// Adjacent-chunk context expansion parameters.
pub mod expansion {
    /// How far (in chunk indices) to look on each side of a result.
    pub const ADJACENCY_WINDOW: usize = 2;

    /// Adjacent chunks kept per retrieved chunk.
    pub const MAX_ADJACENT_PER_CHUNK: usize = 3;

    /// Hard cap on the expanded result set.
    pub const MAX_EXPANDED_RESULTS: usize = 12;

    /// Prefix length used for content-based deduplication.
    pub const DEDUP_PREFIX_CHARS: usize = 100;
}

/// LLM reranking parameters.
pub mod rerank {
    /// Weight of the model's relevance judgment in the final score.
    pub const RELEVANCE_WEIGHT: f32 = 0.7;

    /// Weight of the original retrieval score in the final score.
    pub const ORIGINAL_WEIGHT: f32 = 0.3;

    /// Neutral relevance assigned when a score cannot be parsed or a
    /// per-candidate call fails.
    pub const NEUTRAL_RELEVANCE: f32 = 5.0;

    /// Relevance scores are clamped to [0, MAX_RELEVANCE].
    pub const MAX_RELEVANCE: f32 = 10.0;

    /// Concurrent rerank calls in flight.
    pub const DEFAULT_CONCURRENCY: usize = 4;
}

/// Structural metadata extraction parameters.
pub mod metadata {
    /// Characters of a chunk scanned for structural markers.
    pub const SCAN_CHARS: usize = 2000;

    /// Non-empty lines of a chunk scanned for structural markers.
    pub const SCAN_LINES: usize = 5;

    /// Cleaned titles outside this length range are rejected.
    pub const TITLE_MIN_LEN: usize = 3;
    pub const TITLE_MAX_LEN: usize = 200;

    /// Minimum fraction of alphabetic characters in a valid title.
    pub const TITLE_MIN_ALPHA_RATIO: f32 = 0.3;

    /// Word-overlap threshold for inheriting tags from a nearby element.
    pub const INHERIT_MIN_OVERLAP: usize = 3;

    /// Words of the chunk compared during inheritance matching.
    pub const INHERIT_CHUNK_WORDS: usize = 20;

    /// Words of the structural element compared during inheritance matching.
    pub const INHERIT_ELEMENT_WORDS: usize = 50;
}

/// Default external endpoints.
pub mod endpoints {
    pub const QDRANT_DEFAULT: &str = "http://localhost:6334";
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";
}
