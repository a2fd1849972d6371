//! End-to-end pipeline tests over an in-memory corpus.
//!
//! The dense index is a deterministic stand-in scoring chunks by term
//! overlap with the query; the sparse index is a real Tantivy index held in
//! RAM. No network, no external services.

use std::sync::Arc;

use async_trait::async_trait;

use docqa_core::{
    ChapterInfo, Chunk, ChunkMetadata, DenseHit, DenseIndex, DocumentType, MetadataFilter,
    QueryEmbedder, Result, SectionInfo,
};
use docqa_retrieval::engine::{EngineConfig, RetrievalEngine};
use docqa_retrieval::hybrid::SearchSource;
use docqa_retrieval::reranker::HeuristicReranker;
use docqa_retrieval::sparse::{SparseConfig, SparseIndexHandle};

/// Dense index scoring by shared lowercase terms between query and content.
/// The query text is smuggled through the embedder as fractional code
/// points so search stays deterministic without real vectors.
struct TermOverlapIndex {
    chunks: Vec<Chunk>,
}

fn decode_query(vector: &[f32]) -> String {
    vector
        .iter()
        .filter(|&&v| v > 0.0)
        .map(|&v| char::from_u32(v as u32).unwrap_or(' '))
        .collect()
}

fn overlap(query: &str, content: &str) -> f32 {
    let content = content.to_lowercase();
    let total: usize = query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() > 2 && content.contains(*t))
        .count();
    total as f32 / 4.0
}

#[async_trait]
impl DenseIndex for TermOverlapIndex {
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<DenseHit>> {
        let query = decode_query(&vector);
        let mut hits: Vec<DenseHit> = self
            .chunks
            .iter()
            .filter(|c| filter.map_or(true, |f| f.matches(&c.metadata)))
            .map(|c| DenseHit {
                chunk: c.clone(),
                distance: (1.0 - overlap(&query, &c.content)).max(0.0),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn fetch_by_indices(&self, doc: &str, indices: &[usize]) -> Result<Vec<Chunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                c.metadata.source_document == doc && indices.contains(&c.metadata.chunk_index)
            })
            .cloned()
            .collect())
    }
}

struct CodepointEmbedder;

impl QueryEmbedder for CodepointEmbedder {
    fn embed(&self, query: &str) -> Result<Vec<f32>> {
        let mut vector: Vec<f32> = query.chars().take(64).map(|c| c as u32 as f32).collect();
        vector.resize(64, 0.0);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        64
    }
}

fn course_chunk(index: usize, chapter: &str, chapter_title: &str, content: &str) -> Chunk {
    Chunk {
        id: format!("cours.pdf:{index}"),
        content: content.to_string(),
        metadata: ChunkMetadata {
            source_document: "cours.pdf".into(),
            chunk_index: index,
            document_type: DocumentType::Pdf,
            word_count: content.split_whitespace().count(),
            content_length: content.chars().count(),
            chapter: Some(ChapterInfo {
                number: chapter.into(),
                title: Some(chapter_title.into()),
                raw_number: None,
            }),
            section: None,
            ..Default::default()
        },
    }
}

fn corpus() -> Vec<Chunk> {
    vec![
        course_chunk(0, "1", "Introduction", "Présentation générale du cours de programmation."),
        course_chunk(3, "2", "Les variables", "Une variable stocke une valeur nommée en mémoire."),
        course_chunk(5, "4", "Les fonctions", "Une fonction est un bloc de code réutilisable qui prend des paramètres."),
        course_chunk(6, "4", "Les fonctions", "Les paramètres d'une fonction sont passés par valeur ou par référence."),
        course_chunk(7, "4", "Les fonctions", "Définition: une fonction associe des entrées à une sortie."),
        course_chunk(8, "4", "Les fonctions", "Exemple d'appel de fonction avec plusieurs arguments."),
        course_chunk(9, "4", "Les fonctions", "La valeur de retour d'une fonction peut être ignorée."),
        course_chunk(12, "5", "Les boucles", "Une boucle répète un bloc d'instructions, parfois avec une fonction."),
        course_chunk(20, "6", "Les tableaux", "Un tableau contient des éléments du même type."),
    ]
}

fn build_engine(config: EngineConfig) -> RetrievalEngine {
    let chunks = corpus();
    let handle = Arc::new(SparseIndexHandle::new());
    handle
        .rebuild(SparseConfig::default(), &chunks)
        .expect("in-memory sparse index builds");

    RetrievalEngine::new(
        config,
        Arc::new(TermOverlapIndex { chunks }),
        Arc::new(CodepointEmbedder),
        handle,
    )
}

#[tokio::test]
async fn both_branches_contribute_to_the_ranking() {
    let config = EngineConfig {
        diversity_enabled: false,
        expansion_enabled: false,
        ..Default::default()
    };
    let engine = build_engine(config);

    let outcome = engine.retrieve("qu'est-ce qu'une fonction").await.unwrap();

    assert!(!outcome.chunks.is_empty());
    // The best chunks mention "fonction" and were found by both branches.
    assert!(outcome
        .chunks
        .iter()
        .take(2)
        .all(|c| c.chunk.content.to_lowercase().contains("fonction")));
    assert!(outcome
        .chunks
        .iter()
        .any(|c| c.source == SearchSource::Hybrid));
    // Ranks are 1-based and contiguous.
    for (i, c) in outcome.chunks.iter().enumerate() {
        assert_eq!(c.rank, i + 1);
    }
}

#[tokio::test]
async fn chapter_scoping_and_fallback() {
    let config = EngineConfig {
        diversity_enabled: false,
        expansion_enabled: false,
        ..Default::default()
    };
    let engine = build_engine(config);

    let scoped = engine
        .retrieve("chapitre 4 comment définir une fonction")
        .await
        .unwrap();
    assert!(!scoped.used_chapter_fallback);
    assert!(scoped.chunks.iter().all(|c| {
        c.chunk.metadata.chapter.as_ref().map(|ch| ch.number.as_str()) == Some("4")
    }));

    // Chapter 9 does not exist; the pipeline searches everywhere instead.
    let fallback = engine.retrieve("chapitre 9 les fonctions").await.unwrap();
    assert!(fallback.used_chapter_fallback);
    assert!(!fallback.chunks.is_empty());
}

#[tokio::test]
async fn expansion_pulls_adjacent_chunks_within_window() {
    let config = EngineConfig {
        top_k: 1,
        diversity_enabled: false,
        expansion_enabled: true,
        ..Default::default()
    };
    let engine = build_engine(config);

    // "paramètres" lands chunk 6 on top; its window is indices 4..=8 and
    // the corpus holds 5, 7 and 8 there. Chunk 12 is out of range.
    let outcome = engine
        .retrieve("les paramètres d'une fonction")
        .await
        .unwrap();

    let indices: Vec<usize> = outcome
        .chunks
        .iter()
        .map(|c| c.chunk.metadata.chunk_index)
        .collect();
    assert!(indices.contains(&6));
    assert!(!indices.contains(&12));
    assert!(!indices.contains(&20));
    assert!(indices.iter().all(|&i| (5..=8).contains(&i)));
    assert!(outcome
        .chunks
        .iter()
        .any(|c| c.source == SearchSource::Expanded));
    assert!(outcome.chunks.len() <= 12);
}

#[tokio::test]
async fn diversity_keeps_cardinality_and_seed() {
    let config = EngineConfig {
        top_k: 3,
        diversity_enabled: true,
        expansion_enabled: false,
        ..Default::default()
    };
    let engine = build_engine(config);

    let outcome = engine.retrieve("une fonction avec une boucle").await.unwrap();
    assert_eq!(outcome.chunks.len(), 3);

    let mut ids: Vec<&str> = outcome.chunks.iter().map(|c| c.chunk.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn heuristic_reranker_annotates_results() {
    let config = EngineConfig {
        diversity_enabled: false,
        expansion_enabled: false,
        rerank_enabled: true,
        ..Default::default()
    };
    let engine = build_engine(config).with_reranker(Arc::new(HeuristicReranker));

    let outcome = engine.retrieve("définition d'une fonction").await.unwrap();

    assert!(!outcome.chunks.is_empty());
    for c in &outcome.chunks {
        assert!(c.relevance_score.is_some());
        assert!(c.final_score.is_some());
        assert!(c.reasoning.is_some());
    }
    // Final ordering follows the blended rerank score.
    for pair in outcome.chunks.windows(2) {
        assert!(pair[0].final_score.unwrap() >= pair[1].final_score.unwrap());
    }
}

#[tokio::test]
async fn definition_query_type_is_detected_end_to_end() {
    let config = EngineConfig {
        diversity_enabled: false,
        expansion_enabled: false,
        ..Default::default()
    };
    let engine = build_engine(config);

    let outcome = engine
        .retrieve("qu'est-ce que la fonction")
        .await
        .unwrap();
    assert_eq!(
        outcome.query_context.query_type,
        docqa_retrieval::query_context::QueryType::Definition
    );
}

#[tokio::test]
async fn section_metadata_survives_the_pipeline() {
    // A chunk tagged with a section keeps that tag through merge, scoring
    // and selection.
    let mut chunks = corpus();
    let mut section = SectionInfo::new("4.1", 2);
    section.title = Some("Définition".into());
    chunks[4].metadata.section = Some(section);

    let handle = Arc::new(SparseIndexHandle::new());
    handle
        .rebuild(SparseConfig::default(), &chunks)
        .expect("in-memory sparse index builds");
    let engine = RetrievalEngine::new(
        EngineConfig {
            diversity_enabled: false,
            expansion_enabled: false,
            ..Default::default()
        },
        Arc::new(TermOverlapIndex { chunks }),
        Arc::new(CodepointEmbedder),
        handle,
    );

    let outcome = engine.retrieve("définition d'une fonction").await.unwrap();
    let tagged = outcome
        .chunks
        .iter()
        .find(|c| c.chunk.metadata.chunk_index == 7)
        .expect("tagged chunk retrieved");
    assert_eq!(
        tagged.chunk.metadata.section.as_ref().map(|s| s.number.as_str()),
        Some("4.1")
    );
}
