//! LLM-based relevance reranking
//!
//! Asks a completion backend to grade each candidate's relevance to the
//! query on a 0-10 scale, then blends that grade with the retrieval score.
//! Candidates are graded concurrently with a bounded fan-out. A failed
//! grading never drops the candidate; it falls back to a neutral grade.
//!
//! `HeuristicReranker` is the no-LLM stand-in: pure term matching against
//! titles and content, same output shape.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;

use docqa_core::Chunk;
use docqa_config::constants::rerank;
use docqa_llm::CompletionBackend;

static SCORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"SCORE:\s*(\d+(?:\.\d+)?)").unwrap_or_else(|e| panic!("score regex: {e}"))
});
static REASONING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"REASONING:\s*(.+)").unwrap_or_else(|e| panic!("reasoning regex: {e}"))
});

/// Longest chunk excerpt included in a grading prompt.
const PROMPT_CONTENT_CHARS: usize = 1500;

const FALLBACK_REASONING: &str = "Reranking failed, using original score";
const DEFAULT_REASONING: &str = "No reasoning provided";

/// One reranked candidate.
#[derive(Debug, Clone)]
pub struct RerankedResult {
    pub chunk: Chunk,
    /// Retrieval score in [0, 1] going into the blend.
    pub original_score: f32,
    /// LLM relevance grade in [0, 10].
    pub relevance_score: f32,
    /// Blended score on the 0-10 scale.
    pub final_score: f32,
    pub reasoning: String,
}

/// Reorders scored candidates by graded relevance.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Grade, blend, sort descending by final score, keep `top_k`.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<(Chunk, f32)>,
        top_k: usize,
    ) -> Vec<RerankedResult>;
}

/// Reranker grading candidates through a completion backend.
pub struct LlmReranker {
    backend: Arc<dyn CompletionBackend>,
    relevance_weight: f32,
    original_weight: f32,
    concurrency: usize,
}

impl LlmReranker {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            relevance_weight: rerank::RELEVANCE_WEIGHT,
            original_weight: rerank::ORIGINAL_WEIGHT,
            concurrency: rerank::DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_config(
        backend: Arc<dyn CompletionBackend>,
        config: &docqa_config::RerankerConfig,
    ) -> Self {
        Self {
            backend,
            relevance_weight: config.relevance_weight,
            original_weight: config.original_weight,
            concurrency: config.concurrency.max(1),
        }
    }

    fn build_prompt(&self, query: &str, chunk: &Chunk) -> String {
        let excerpt: String = chunk.content.chars().take(PROMPT_CONTENT_CHARS).collect();
        let chapter = chunk
            .metadata
            .chapter
            .as_ref()
            .and_then(|c| c.title.as_deref())
            .unwrap_or("inconnu");

        format!(
            "Evaluate how relevant this document excerpt is to the question.\n\
             Rate from 0 (irrelevant) to 10 (directly answers it).\n\n\
             Question: {query}\n\n\
             Chapter: {chapter}\n\
             Excerpt: {excerpt}\n\n\
             Format: SCORE: [number] REASONING: [brief explanation]"
        )
    }

    /// Pull the grade and reasoning out of a completion. Missing pieces get
    /// a neutral grade and a stock reasoning; grades clamp onto [0, 10].
    fn parse_response(response: &str) -> (f32, String) {
        let score = SCORE_RE
            .captures(response)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
            .map(|s| s.clamp(0.0, rerank::MAX_RELEVANCE))
            .unwrap_or(rerank::NEUTRAL_RELEVANCE);

        let reasoning = REASONING_RE
            .captures(response)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| DEFAULT_REASONING.to_string());

        (score, reasoning)
    }

    async fn grade(&self, query: &str, chunk: Chunk, original_score: f32) -> RerankedResult {
        let prompt = self.build_prompt(query, &chunk);

        match self.backend.complete(&prompt).await {
            Ok(response) => {
                let (relevance_score, reasoning) = Self::parse_response(&response);
                let final_score = self.relevance_weight * relevance_score
                    + self.original_weight * original_score * 10.0;
                RerankedResult {
                    chunk,
                    original_score,
                    relevance_score,
                    final_score,
                    reasoning,
                }
            }
            Err(e) => {
                tracing::warn!(chunk_id = %chunk.id, error = %e, "relevance grading failed");
                RerankedResult {
                    chunk,
                    original_score,
                    relevance_score: rerank::NEUTRAL_RELEVANCE,
                    final_score: original_score * 10.0,
                    reasoning: FALLBACK_REASONING.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<(Chunk, f32)>,
        top_k: usize,
    ) -> Vec<RerankedResult> {
        let mut results: Vec<RerankedResult> = stream::iter(
            candidates
                .into_iter()
                .map(|(chunk, score)| self.grade(query, chunk, score)),
        )
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        results.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        results.truncate(top_k);
        results
    }
}

/// Term-matching reranker used when no LLM is configured or reachable.
///
/// Each query term scores +2.0 on a section title hit, +1.0 on a chapter
/// title hit and +0.5 on a content hit, on top of a neutral base, capped at
/// 10. The blend leans on the retrieval score more than the LLM blend does.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReranker;

impl HeuristicReranker {
    const HEURISTIC_WEIGHT: f32 = 0.4;
    const ORIGINAL_WEIGHT: f32 = 0.6;

    fn relevance(query: &str, chunk: &Chunk) -> f32 {
        let content = chunk.content.to_lowercase();
        let section_title = chunk
            .metadata
            .section
            .as_ref()
            .and_then(|s| s.title.as_deref())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let chapter_title = chunk
            .metadata
            .chapter
            .as_ref()
            .and_then(|c| c.title.as_deref())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let mut score = rerank::NEUTRAL_RELEVANCE;
        for term in query.to_lowercase().split_whitespace() {
            if term.len() <= 2 {
                continue;
            }
            if section_title.contains(term) {
                score += 2.0;
            }
            if chapter_title.contains(term) {
                score += 1.0;
            }
            if content.contains(term) {
                score += 0.5;
            }
        }

        score.min(rerank::MAX_RELEVANCE)
    }
}

#[async_trait]
impl Reranker for HeuristicReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<(Chunk, f32)>,
        top_k: usize,
    ) -> Vec<RerankedResult> {
        let mut results: Vec<RerankedResult> = candidates
            .into_iter()
            .map(|(chunk, original_score)| {
                let relevance_score = Self::relevance(query, &chunk);
                let final_score = Self::HEURISTIC_WEIGHT * relevance_score
                    + Self::ORIGINAL_WEIGHT * original_score * 10.0;
                RerankedResult {
                    chunk,
                    original_score,
                    relevance_score,
                    final_score,
                    reasoning: "Heuristic term matching".to_string(),
                }
            })
            .collect();

        results.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        results.truncate(top_k);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::{ChapterInfo, ChunkMetadata, SectionInfo};
    use docqa_llm::LlmError;
    use parking_lot::Mutex;

    /// Backend replaying canned responses, erroring on prompts whose
    /// excerpt contains a marker.
    struct ScriptedBackend {
        responses: Mutex<Vec<Result<String, ()>>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<String, ()>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            let mut responses = self.responses.lock();
            match responses.remove(0) {
                Ok(text) => Ok(text),
                Err(()) => Err(LlmError::Network("connection refused".into())),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: format!("contenu du chunk {id} sur les fonctions"),
            metadata: ChunkMetadata {
                source_document: "cours.pdf".into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn parses_score_and_reasoning() {
        let (score, reasoning) =
            LlmReranker::parse_response("SCORE: 8.5 REASONING: Directly defines the concept.");
        assert!((score - 8.5).abs() < 1e-6);
        assert_eq!(reasoning, "Directly defines the concept.");
    }

    #[test]
    fn out_of_range_score_is_clamped() {
        let (score, _) = LlmReranker::parse_response("SCORE: 42 REASONING: Enthusiastic.");
        assert!((score - 10.0).abs() < 1e-6);
    }

    #[test]
    fn malformed_response_gets_neutral_grade() {
        let (score, reasoning) = LlmReranker::parse_response("That excerpt looks fine to me.");
        assert!((score - 5.0).abs() < 1e-6);
        assert_eq!(reasoning, "No reasoning provided");
    }

    #[tokio::test]
    async fn blends_relevance_with_original_score() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            "SCORE: 8 REASONING: Strong match.".to_string()
        )]));
        let reranker = LlmReranker::new(backend);

        let results = reranker
            .rerank("les fonctions", vec![(chunk("a"), 0.6)], 5)
            .await;

        assert_eq!(results.len(), 1);
        // 0.7 * 8 + 0.3 * 0.6 * 10
        assert!((results[0].final_score - 7.4).abs() < 1e-5);
        assert!((results[0].relevance_score - 8.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn failed_candidate_keeps_original_score() {
        // Five candidates, grading fails for the third. Concurrency 1 keeps
        // the response script aligned with the candidate order.
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("SCORE: 9 REASONING: a".to_string()),
            Ok("SCORE: 7 REASONING: b".to_string()),
            Err(()),
            Ok("SCORE: 4 REASONING: d".to_string()),
            Ok("SCORE: 2 REASONING: e".to_string()),
        ]));
        let mut reranker = LlmReranker::new(backend);
        reranker.concurrency = 1;

        let candidates: Vec<(Chunk, f32)> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|id| (chunk(id), 0.5))
            .collect();
        let results = reranker.rerank("question", candidates, 5).await;

        assert_eq!(results.len(), 5);
        let failed = results
            .iter()
            .find(|r| r.chunk.id == "c")
            .expect("failed candidate is kept");
        assert!((failed.relevance_score - 5.0).abs() < 1e-6);
        assert!((failed.final_score - 5.0).abs() < 1e-6);
        assert_eq!(failed.reasoning, "Reranking failed, using original score");
    }

    #[tokio::test]
    async fn top_k_truncates_after_sorting() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("SCORE: 2 REASONING: weak".to_string()),
            Ok("SCORE: 9 REASONING: strong".to_string()),
        ]));
        let mut reranker = LlmReranker::new(backend);
        reranker.concurrency = 1;

        let results = reranker
            .rerank("question", vec![(chunk("a"), 0.5), (chunk("b"), 0.5)], 1)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "b");
    }

    #[tokio::test]
    async fn heuristic_rewards_title_hits() {
        let mut with_titles = chunk("a");
        with_titles.metadata.section = Some(SectionInfo {
            number: "1.2".into(),
            subsection: None,
            title: Some("Définition des fonctions".into()),
            level: 2,
        });
        with_titles.metadata.chapter = Some(ChapterInfo {
            number: "4".into(),
            title: Some("Les fonctions".into()),
            raw_number: None,
        });
        let mut plain = chunk("b");
        plain.content = "texte sans rapport".into();

        let results = HeuristicReranker
            .rerank("fonctions", vec![(plain, 0.5), (with_titles, 0.5)], 5)
            .await;

        assert_eq!(results[0].chunk.id, "a");
        // 5.0 base + 2.0 section + 1.0 chapter + 0.5 content
        assert!((results[0].relevance_score - 8.5).abs() < 1e-5);
        assert!((results[1].relevance_score - 5.0).abs() < 1e-5);
    }
}
