//! Structural metadata extraction
//!
//! Parses chapter and section markers out of chunk text using a prioritized
//! pattern table. The table is data, not branching: each entry records its
//! language and category so tests can pin down exactly which pattern fired.
//!
//! Extraction never fails; text without recognizable structure simply yields
//! no tags.

use once_cell::sync::Lazy;
use regex::Regex;

use docqa_core::{ChapterInfo, SectionInfo};
use docqa_config::constants::metadata;

/// One entry in the prioritized pattern table. Capture group 1 is the
/// number token, capture group 2 (when present) the title candidate.
struct PatternEntry {
    language: &'static str,
    regex: Regex,
}

/// Chapter patterns, checked in order; first match wins. French before
/// English before generic, matching the corpora this was tuned on.
static CHAPTER_PATTERNS: Lazy<Vec<PatternEntry>> = Lazy::new(|| {
    vec![
        PatternEntry {
            language: "fr",
            regex: Regex::new(
                r"(?i)(?:chapitre|chap\.?)\s+([ivxlc]+|[0-9]+)(?:\s*[:\-–—]\s*(.+))?",
            )
            .expect("static regex"),
        },
        // Inverted French form: "IVème chapitre"
        PatternEntry {
            language: "fr",
            regex: Regex::new(
                r"(?i)([ivxlc]+|[0-9]+)\s*(?:er|ème|eme)?\s*chapitre(?:\s*[:\-–—]\s*(.+))?",
            )
            .expect("static regex"),
        },
        PatternEntry {
            language: "en",
            regex: Regex::new(r"(?i)chapter\s+([ivxlc]+|[0-9]+)(?:\s*[:\-–—]\s*(.+))?")
                .expect("static regex"),
        },
        PatternEntry {
            language: "en",
            regex: Regex::new(r"(?i)ch\.?\s*([0-9]+)(?:\s*[:\-–—]\s*(.+))?").expect("static regex"),
        },
        // Generic numbered heading: "3. Les structures de données"
        PatternEntry {
            language: "any",
            regex: Regex::new(r"(?m)^([0-9]+)\.\s*(\p{Lu}[^.\n]+)").expect("static regex"),
        },
    ]
});

/// Section patterns; dotted numbering first so "1.2" is not swallowed by
/// the looser "section N" form.
static SECTION_PATTERNS: Lazy<Vec<PatternEntry>> = Lazy::new(|| {
    vec![
        PatternEntry {
            language: "any",
            regex: Regex::new(
                r"(?i)(?:section\s+)?([0-9]+(?:\.[0-9]+)+)(?:\s*[:\-–—]\s*(.+))?",
            )
            .expect("static regex"),
        },
        PatternEntry {
            language: "any",
            regex: Regex::new(r"(?m)^([0-9]+\.[0-9]+(?:\.[0-9]+)*)\s+(\p{Lu}[^.\n]+)")
                .expect("static regex"),
        },
        PatternEntry {
            language: "fr",
            regex: Regex::new(r"(?i)(?:section|partie)\s+([0-9]+|[ivxlc]+)(?:\s*[:\-–—]\s*(.+))?")
                .expect("static regex"),
        },
    ]
});

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));
static TITLE_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\w\s\-–—'"().,]"#).expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,:;]+$").expect("static regex"));

const ROMAN_TO_ARABIC: &[(&str, &str)] = &[
    ("i", "1"),
    ("ii", "2"),
    ("iii", "3"),
    ("iv", "4"),
    ("v", "5"),
    ("vi", "6"),
    ("vii", "7"),
    ("viii", "8"),
    ("ix", "9"),
    ("x", "10"),
    ("xi", "11"),
    ("xii", "12"),
    ("xiii", "13"),
    ("xiv", "14"),
    ("xv", "15"),
    ("xvi", "16"),
    ("xvii", "17"),
    ("xviii", "18"),
    ("xix", "19"),
    ("xx", "20"),
];

/// Kind of a structural element found in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Chapter,
    Section,
}

/// A structural marker found while scanning a full source document. Used by
/// the inheritance pass to donate tags to structure-less chunks.
#[derive(Debug, Clone)]
pub struct StructuralElement {
    pub kind: ElementKind,
    pub number: String,
    pub raw_number: Option<String>,
    pub title: Option<String>,
    /// Byte offset of the match in the document.
    pub start: usize,
    /// The full matched text, kept for inheritance word-overlap matching.
    pub matched_text: String,
}

/// Extracted structural tags for one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedStructure {
    pub chapter: Option<ChapterInfo>,
    pub section: Option<SectionInfo>,
}

/// Chapter/section extractor.
///
/// Stateless; all pattern tables are process-wide statics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralExtractor;

impl StructuralExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract chapter and section tags from a chunk's text.
    ///
    /// Only the head of the chunk is scanned: structure markers sit at chunk
    /// starts, and scanning deep into body text produces false positives.
    pub fn extract(&self, content: &str) -> ExtractedStructure {
        let head = Self::extraction_head(content);
        ExtractedStructure {
            chapter: self.extract_chapter(&head),
            section: self.extract_section(&head),
        }
    }

    fn extract_chapter(&self, head: &str) -> Option<ChapterInfo> {
        for entry in CHAPTER_PATTERNS.iter() {
            if let Some(caps) = entry.regex.captures(head) {
                let raw_number = caps.get(1)?.as_str().trim().to_string();
                let title = caps
                    .get(2)
                    .map(|m| first_line(m.as_str()))
                    .and_then(|t| clean_title(&t));

                tracing::debug!(
                    language = entry.language,
                    raw = %raw_number,
                    "chapter pattern matched"
                );

                return Some(ChapterInfo {
                    number: normalize_chapter_number(&raw_number),
                    title,
                    raw_number: Some(raw_number),
                });
            }
        }
        None
    }

    fn extract_section(&self, head: &str) -> Option<SectionInfo> {
        for entry in SECTION_PATTERNS.iter() {
            if let Some(caps) = entry.regex.captures(head) {
                let number_token = caps.get(1)?.as_str().trim().to_string();
                let title = caps
                    .get(2)
                    .map(|m| first_line(m.as_str()))
                    .and_then(|t| clean_title(&t));

                let parts: Vec<&str> = number_token.split('.').collect();
                let level = parts.len();
                let subsection = if level > 2 {
                    Some(parts[2..].join("."))
                } else {
                    None
                };
                let number = if level >= 2 {
                    parts[..2].join(".")
                } else {
                    number_token.clone()
                };

                return Some(SectionInfo {
                    number,
                    subsection,
                    title,
                    level: (level as u8).clamp(1, 5),
                });
            }
        }
        None
    }

    /// Find every structural marker in a full source document, sorted by
    /// position. Feeds the inheritance pass.
    pub fn find_structural_elements(&self, content: &str) -> Vec<StructuralElement> {
        let mut elements = Vec::new();

        for entry in CHAPTER_PATTERNS.iter() {
            for caps in entry.regex.captures_iter(content) {
                let Some(number_match) = caps.get(1) else {
                    continue;
                };
                let whole = match caps.get(0) {
                    Some(m) => m,
                    None => continue,
                };
                let raw_number = number_match.as_str().trim().to_string();
                elements.push(StructuralElement {
                    kind: ElementKind::Chapter,
                    number: normalize_chapter_number(&raw_number),
                    raw_number: Some(raw_number),
                    title: caps
                        .get(2)
                        .map(|m| first_line(m.as_str()))
                        .and_then(|t| clean_title(&t)),
                    start: whole.start(),
                    matched_text: whole.as_str().to_string(),
                });
            }
        }

        for entry in SECTION_PATTERNS.iter() {
            for caps in entry.regex.captures_iter(content) {
                let Some(number_match) = caps.get(1) else {
                    continue;
                };
                let whole = match caps.get(0) {
                    Some(m) => m,
                    None => continue,
                };
                elements.push(StructuralElement {
                    kind: ElementKind::Section,
                    number: number_match.as_str().trim().to_string(),
                    raw_number: None,
                    title: caps
                        .get(2)
                        .map(|m| first_line(m.as_str()))
                        .and_then(|t| clean_title(&t)),
                    start: whole.start(),
                    matched_text: whole.as_str().to_string(),
                });
            }
        }

        elements.sort_by_key(|e| e.start);
        elements
    }

    /// Inherit tags from the best-matching structural element.
    ///
    /// Compares the chunk's first words against each element's matched text
    /// by set intersection; the best overlap above the minimum donates its
    /// tags. Returns `None` when nothing clears the threshold.
    pub fn inherit_from_elements(
        &self,
        chunk_content: &str,
        elements: &[StructuralElement],
    ) -> Option<ExtractedStructure> {
        if elements.is_empty() {
            return None;
        }

        let chunk_words: std::collections::HashSet<String> = chunk_content
            .to_lowercase()
            .split_whitespace()
            .take(metadata::INHERIT_CHUNK_WORDS)
            .map(|w| w.to_string())
            .collect();

        let mut best: Option<(&StructuralElement, usize)> = None;

        for element in elements {
            let element_words: std::collections::HashSet<String> = element
                .matched_text
                .to_lowercase()
                .split_whitespace()
                .take(metadata::INHERIT_ELEMENT_WORDS)
                .map(|w| w.to_string())
                .collect();

            let overlap = chunk_words.intersection(&element_words).count();
            if overlap >= metadata::INHERIT_MIN_OVERLAP
                && best.map_or(true, |(_, score)| overlap > score)
            {
                best = Some((element, overlap));
            }
        }

        let (element, overlap) = best?;
        tracing::debug!(overlap, kind = ?element.kind, "inheriting structural tags");

        match element.kind {
            ElementKind::Chapter => Some(ExtractedStructure {
                chapter: Some(ChapterInfo {
                    number: element.number.clone(),
                    title: element.title.clone(),
                    raw_number: element.raw_number.clone(),
                }),
                section: None,
            }),
            ElementKind::Section => {
                let parts: Vec<&str> = element.number.split('.').collect();
                Some(ExtractedStructure {
                    chapter: None,
                    section: Some(SectionInfo {
                        number: element.number.clone(),
                        subsection: None,
                        title: element.title.clone(),
                        level: (parts.len() as u8).clamp(1, 5),
                    }),
                })
            }
        }
    }

    /// First SCAN_CHARS characters, reduced to the first SCAN_LINES
    /// non-empty trimmed lines.
    fn extraction_head(content: &str) -> String {
        let truncated: String = content.chars().take(metadata::SCAN_CHARS).collect();
        truncated
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(metadata::SCAN_LINES)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Normalize a chapter number token to arabic digits.
///
/// Roman numerals i..xx map to "1".."20"; otherwise the first digit run is
/// extracted; otherwise the trimmed raw token passes through. Idempotent.
pub fn normalize_chapter_number(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lower = trimmed.to_lowercase();
    if let Some((_, arabic)) = ROMAN_TO_ARABIC.iter().find(|(r, _)| *r == lower) {
        return (*arabic).to_string();
    }

    if let Some(m) = DIGITS.find(trimmed) {
        return m.as_str().to_string();
    }

    trimmed.to_string()
}

/// Clean an extracted title candidate; `None` means noise, not an error.
pub fn clean_title(title: &str) -> Option<String> {
    let cleaned = TITLE_NOISE.replace_all(title, " ");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");
    let cleaned = TRAILING_PUNCT.replace(cleaned.trim(), "");
    let cleaned = cleaned.trim();

    let len = cleaned.chars().count();
    if !(metadata::TITLE_MIN_LEN..=metadata::TITLE_MAX_LEN).contains(&len) {
        return None;
    }

    let alpha = cleaned.chars().filter(|c| c.is_alphabetic()).count();
    if (alpha as f32) / (len as f32) < metadata::TITLE_MIN_ALPHA_RATIO {
        return None;
    }

    Some(cleaned.to_string())
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim().to_string()
}
