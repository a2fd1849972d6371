//! Query context analysis
//!
//! Parses a user question for structural intent: a referenced chapter or
//! section, and a coarse query type. Pure and deterministic; no external
//! calls.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::metadata::extractor::normalize_chapter_number;

static QUERY_CHAPTER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"chapitre\s+(\d+|[ivxlc]+)").expect("static regex"),
        Regex::new(r"chapter\s+(\d+|[ivxlc]+)").expect("static regex"),
        Regex::new(r"\bch\s*(\d+)").expect("static regex"),
        Regex::new(r"\b(\d+)\s*(?:er|ème|eme)\s*chapitre").expect("static regex"),
    ]
});

static QUERY_SECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"section\s+(\d+(?:\.\d+)?)").expect("static regex"),
        Regex::new(r"\b(\d+)\.(\d+)\b").expect("static regex"),
        Regex::new(r"partie\s+(\d+)").expect("static regex"),
    ]
});

const DEFINITION_MARKERS: &[&str] = &["définition", "definition", "qu'est-ce que", "what is"];
const EXAMPLE_MARKERS: &[&str] = &["exemple", "example", "illustrer"];
const PROCEDURAL_MARKERS: &[&str] = &["comment", "how", "procédure", "étapes"];

/// Coarse query intent, detected from keyword buckets in fixed priority
/// order. A question gets exactly one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    Definition,
    Example,
    Procedural,
    #[default]
    None,
}

/// Structural intent of one question. Immutable, scoped to a single query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryContext {
    pub preferred_chapter: Option<String>,
    pub preferred_section: Option<String>,
    pub preferred_subsection: Option<String>,
    pub query_type: QueryType,
    /// Lower-cased tokens of the question, for keyword-overlap boosts.
    pub keywords: HashSet<String>,
}

impl QueryContext {
    pub fn has_structural_preference(&self) -> bool {
        self.preferred_chapter.is_some() || self.preferred_section.is_some()
    }
}

/// Analyzer turning a raw question into a [`QueryContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryContextAnalyzer;

impl QueryContextAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, question: &str) -> QueryContext {
        let lower = question.to_lowercase();

        let mut context = QueryContext {
            keywords: lower.split_whitespace().map(|w| w.to_string()).collect(),
            ..Default::default()
        };

        for pattern in QUERY_CHAPTER_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(&lower) {
                if let Some(m) = caps.get(1) {
                    context.preferred_chapter = Some(normalize_chapter_number(m.as_str()));
                    break;
                }
            }
        }

        for pattern in QUERY_SECTION_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(&lower) {
                let Some(first) = caps.get(1) else { continue };
                context.preferred_section = Some(first.as_str().to_string());
                // Dotted form "1.2" also names a subsection.
                if let Some(second) = caps.get(2) {
                    context.preferred_subsection = Some(second.as_str().to_string());
                }
                break;
            }
        }

        context.query_type = Self::detect_query_type(&lower);
        context
    }

    fn detect_query_type(lower: &str) -> QueryType {
        if DEFINITION_MARKERS.iter().any(|m| lower.contains(m)) {
            QueryType::Definition
        } else if EXAMPLE_MARKERS.iter().any(|m| lower.contains(m)) {
            QueryType::Example
        } else if PROCEDURAL_MARKERS.iter().any(|m| lower.contains(m)) {
            QueryType::Procedural
        } else {
            QueryType::None
        }
    }
}
