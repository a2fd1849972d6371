//! Metadata-driven weighted re-scoring
//!
//! Multiplies each candidate's base score by a chain of boost factors
//! derived from the chunk's structural metadata and the query context. The
//! boost chain is a typed rule list evaluated in a fixed, documented order,
//! so tests can check exactly which rule fired.
//!
//! This stage only reorders. It never discards a candidate.

use std::collections::BTreeMap;

use docqa_core::{ChunkMetadata, DocumentType};

use crate::hybrid::SearchResult;
use crate::query_context::{QueryContext, QueryType};

/// Tunable boost factors. A factor of 1.0 disables its rule.
#[derive(Debug, Clone)]
pub struct WeightingConfig {
    pub chapter_match_boost: f32,
    pub section_match_boost: f32,
    pub subsection_match_boost: f32,
    pub pdf_boost: f32,
    pub word_doc_boost: f32,
    /// Applied when `chunk_index < 5`.
    pub early_position_boost: f32,
    /// Applied when `5 <= chunk_index < 15`.
    pub mid_position_boost: f32,
    /// Definition queries favor early chunks (`chunk_index < 10`).
    pub definition_boost: f32,
    /// Example queries favor sections titled with "exemple".
    pub example_boost: f32,
    /// Query keywords overlapping the chapter title.
    pub title_overlap_boost: f32,
    /// Extra multiplicative weights keyed by flattened metadata key,
    /// applied for every key present on the chunk.
    pub custom_weights: BTreeMap<String, f32>,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            chapter_match_boost: 1.8,
            section_match_boost: 1.5,
            subsection_match_boost: 1.3,
            pdf_boost: 1.2,
            word_doc_boost: 1.1,
            early_position_boost: 1.15,
            mid_position_boost: 1.05,
            definition_boost: 1.2,
            example_boost: 1.3,
            title_overlap_boost: 1.1,
            custom_weights: BTreeMap::new(),
        }
    }
}

/// One boost that actually fired on a chunk, for provenance display.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedBoost {
    pub rule: String,
    pub factor: f32,
}

/// One rule of the boost chain.
struct BoostRule {
    name: &'static str,
    apply: fn(&ChunkMetadata, &QueryContext, &WeightingConfig) -> f32,
}

/// The fixed boost chain. Order is part of the contract.
const BOOST_RULES: &[BoostRule] = &[
    BoostRule {
        name: "chapter_match",
        apply: |meta, ctx, cfg| {
            match (&ctx.preferred_chapter, &meta.chapter) {
                (Some(preferred), Some(chapter)) if *preferred == chapter.number => {
                    cfg.chapter_match_boost
                }
                _ => 1.0,
            }
        },
    },
    BoostRule {
        name: "section_match",
        apply: |meta, ctx, cfg| {
            let mut factor = 1.0;
            if let (Some(preferred), Some(section)) = (&ctx.preferred_section, &meta.section) {
                if *preferred == section.number {
                    factor *= cfg.section_match_boost;
                }
                if let (Some(pref_sub), Some(sub)) =
                    (&ctx.preferred_subsection, &section.subsection)
                {
                    if pref_sub == sub {
                        factor *= cfg.subsection_match_boost;
                    }
                }
            }
            factor
        },
    },
    BoostRule {
        name: "document_type",
        apply: |meta, _ctx, cfg| match meta.document_type {
            DocumentType::Pdf => cfg.pdf_boost,
            DocumentType::Docx | DocumentType::Doc => cfg.word_doc_boost,
            _ => 1.0,
        },
    },
    BoostRule {
        name: "position",
        apply: |meta, _ctx, cfg| {
            if meta.chunk_index < 5 {
                cfg.early_position_boost
            } else if meta.chunk_index < 15 {
                cfg.mid_position_boost
            } else {
                1.0
            }
        },
    },
    BoostRule {
        name: "query_type",
        apply: |meta, ctx, cfg| match ctx.query_type {
            QueryType::Definition if meta.chunk_index < 10 => cfg.definition_boost,
            QueryType::Example
                if meta
                    .section
                    .as_ref()
                    .and_then(|s| s.title.as_deref())
                    .map(|t| t.to_lowercase().contains("exemple"))
                    .unwrap_or(false) =>
            {
                cfg.example_boost
            }
            _ => 1.0,
        },
    },
    BoostRule {
        name: "chapter_title_overlap",
        apply: |meta, ctx, cfg| {
            let Some(title) = meta.chapter.as_ref().and_then(|c| c.title.as_deref()) else {
                return 1.0;
            };
            let overlaps = title
                .to_lowercase()
                .split_whitespace()
                .any(|word| ctx.keywords.contains(word));
            if overlaps {
                cfg.title_overlap_boost
            } else {
                1.0
            }
        },
    },
];

/// Weighted scoring engine.
#[derive(Debug, Clone, Default)]
pub struct WeightedScorer {
    config: WeightingConfig,
}

impl WeightedScorer {
    pub fn new(config: WeightingConfig) -> Self {
        Self { config }
    }

    /// Multiplier for one chunk against one query context.
    pub fn multiplier(&self, metadata: &ChunkMetadata, ctx: &QueryContext) -> f32 {
        self.explain(metadata, ctx).0
    }

    /// Multiplier plus the list of boosts that fired, in chain order.
    pub fn explain(
        &self,
        metadata: &ChunkMetadata,
        ctx: &QueryContext,
    ) -> (f32, Vec<AppliedBoost>) {
        let mut multiplier = 1.0;
        let mut applied = Vec::new();

        for rule in BOOST_RULES {
            let factor = (rule.apply)(metadata, ctx, &self.config);
            if factor != 1.0 {
                tracing::debug!(rule = rule.name, factor, "boost applied");
                applied.push(AppliedBoost {
                    rule: rule.name.to_string(),
                    factor,
                });
            }
            multiplier *= factor;
        }

        // Custom weights run last, after every structural rule.
        for (key, weight) in &self.config.custom_weights {
            if metadata.get(key).is_some() {
                multiplier *= weight;
                applied.push(AppliedBoost {
                    rule: format!("custom:{key}"),
                    factor: *weight,
                });
            }
        }

        (multiplier, applied)
    }

    pub fn score(&self, base_score: f32, metadata: &ChunkMetadata, ctx: &QueryContext) -> f32 {
        base_score * self.multiplier(metadata, ctx)
    }

    /// Re-score and reorder a candidate list in place. Keeps every
    /// candidate; stable on equal weighted scores.
    pub fn rescore(&self, results: &mut Vec<SearchResult>, ctx: &QueryContext) {
        for result in results.iter_mut() {
            result.weighted_score =
                self.score(result.combined_score, &result.chunk.metadata, ctx);
        }

        results.sort_by(|a, b| b.weighted_score.total_cmp(&a.weighted_score));

        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid::SearchSource;
    use docqa_core::{ChapterInfo, Chunk, SectionInfo};

    fn metadata(chapter: Option<&str>, index: usize) -> ChunkMetadata {
        ChunkMetadata {
            source_document: "cours.pdf".into(),
            chunk_index: index,
            document_type: DocumentType::Txt,
            chapter: chapter.map(|n| ChapterInfo {
                number: n.into(),
                title: None,
                raw_number: None,
            }),
            ..Default::default()
        }
    }

    fn ctx_for_chapter(chapter: &str) -> QueryContext {
        QueryContext {
            preferred_chapter: Some(chapter.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn chapter_match_outscores_mismatch() {
        // Monotonicity: same base score, only the chapter differs.
        let scorer = WeightedScorer::default();
        let ctx = ctx_for_chapter("4");

        let matching = scorer.score(0.5, &metadata(Some("4"), 20), &ctx);
        let other = scorer.score(0.5, &metadata(Some("5"), 20), &ctx);
        let untagged = scorer.score(0.5, &metadata(None, 20), &ctx);

        assert!(matching > other);
        assert!(matching > untagged);
        assert!((other - untagged).abs() < 1e-6);
    }

    #[test]
    fn boost_chain_multiplies_in_order() {
        let scorer = WeightedScorer::default();
        let ctx = ctx_for_chapter("4");
        let mut meta = metadata(Some("4"), 2);
        meta.document_type = DocumentType::Pdf;

        // chapter 1.8 * pdf 1.2 * early position 1.15
        let expected = 1.8 * 1.2 * 1.15;
        assert!((scorer.multiplier(&meta, &ctx) - expected).abs() < 1e-5);
    }

    #[test]
    fn subsection_match_compounds_on_section_match() {
        let scorer = WeightedScorer::default();
        let ctx = QueryContext {
            preferred_section: Some("1.2".into()),
            preferred_subsection: Some("3".into()),
            ..Default::default()
        };

        let mut meta = metadata(None, 20);
        meta.section = Some(SectionInfo {
            number: "1.2".into(),
            subsection: Some("3".into()),
            title: None,
            level: 3,
        });

        assert!((scorer.multiplier(&meta, &ctx) - 1.5 * 1.3).abs() < 1e-5);
    }

    #[test]
    fn definition_query_boosts_early_chunks_only() {
        let scorer = WeightedScorer::default();
        let ctx = QueryContext {
            query_type: QueryType::Definition,
            ..Default::default()
        };

        let early = scorer.multiplier(&metadata(None, 8), &ctx);
        let late = scorer.multiplier(&metadata(None, 30), &ctx);
        assert!((early - 1.05 * 1.2).abs() < 1e-5);
        assert!((late - 1.0).abs() < 1e-5);
    }

    #[test]
    fn example_query_boosts_exemple_sections() {
        let scorer = WeightedScorer::default();
        let ctx = QueryContext {
            query_type: QueryType::Example,
            ..Default::default()
        };

        let mut meta = metadata(None, 20);
        meta.section = Some(SectionInfo {
            number: "2.1".into(),
            subsection: None,
            title: Some("Exemples d'application".into()),
            level: 2,
        });

        assert!((scorer.multiplier(&meta, &ctx) - 1.3).abs() < 1e-5);
    }

    #[test]
    fn title_overlap_boost_uses_query_keywords() {
        let scorer = WeightedScorer::default();
        let ctx = QueryContext {
            keywords: ["les", "fonctions"].iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };

        let mut meta = metadata(Some("4"), 20);
        meta.chapter = Some(ChapterInfo {
            number: "4".into(),
            title: Some("Les fonctions".into()),
            raw_number: None,
        });

        assert!((scorer.multiplier(&meta, &ctx) - 1.1).abs() < 1e-5);
    }

    #[test]
    fn custom_weights_apply_when_key_present() {
        let mut config = WeightingConfig::default();
        config.custom_weights.insert("language".into(), 2.0);
        let scorer = WeightedScorer::new(config);

        let ctx = QueryContext::default();
        let mut meta = metadata(None, 20);
        assert!((scorer.multiplier(&meta, &ctx) - 1.0).abs() < 1e-5);

        meta.custom.insert("language".into(), "fr".into());
        assert!((scorer.multiplier(&meta, &ctx) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn explain_names_fired_rules_in_chain_order() {
        let scorer = WeightedScorer::default();
        let ctx = ctx_for_chapter("4");
        let mut meta = metadata(Some("4"), 2);
        meta.document_type = DocumentType::Pdf;

        let (multiplier, applied) = scorer.explain(&meta, &ctx);
        assert!((multiplier - 1.8 * 1.2 * 1.15).abs() < 1e-5);
        let rules: Vec<&str> = applied.iter().map(|b| b.rule.as_str()).collect();
        assert_eq!(rules, vec!["chapter_match", "document_type", "position"]);
    }

    #[test]
    fn rescore_reorders_without_discarding() {
        let scorer = WeightedScorer::default();
        let ctx = ctx_for_chapter("4");

        let make = |id: &str, chapter: Option<&str>, combined: f32| SearchResult {
            chunk: Chunk {
                id: id.into(),
                content: format!("contenu {id}"),
                metadata: metadata(chapter, 20),
            },
            dense_score: combined,
            sparse_score: 0.0,
            combined_score: combined,
            weighted_score: combined,
            rank: 0,
            source: SearchSource::Dense,
        };

        let mut results = vec![
            make("a", None, 0.6),
            make("b", Some("4"), 0.5),
            make("c", None, 0.4),
        ];
        scorer.rescore(&mut results, &ctx);

        assert_eq!(results.len(), 3);
        // b: 0.5 * 1.8 = 0.9 beats a's 0.6.
        assert_eq!(results[0].chunk.id, "b");
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[2].rank, 3);
    }
}
