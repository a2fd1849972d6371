//! Chunk and structural metadata model
//!
//! A `Chunk` is the unit of retrievable text. Structural tags (chapter,
//! section) are extracted once at ingestion time and are immutable
//! afterwards, except for the `inherited` back-fill applied when tags are
//! propagated from a nearby structural element.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::path::Path;
use twox_hash::XxHash64;

/// Source document format, derived from the file extension at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Docx,
    Doc,
    Txt,
    Md,
    Html,
}

impl DocumentType {
    /// Determine the document type from a file path; unknown extensions are
    /// treated as plain text.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("pdf") => Self::Pdf,
            Some("docx") => Self::Docx,
            Some("doc") => Self::Doc,
            Some("md") => Self::Md,
            Some("html") | Some("htm") => Self::Html,
            _ => Self::Txt,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Html => "html",
        }
    }
}

impl Default for DocumentType {
    fn default() -> Self {
        Self::Txt
    }
}

/// Chapter tags for a chunk.
///
/// `number` is always the normalized arabic form ("4", never "IV");
/// `raw_number` preserves the original token. A title is only ever present
/// alongside a number, which this struct encodes by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub number: String,
    pub title: Option<String>,
    pub raw_number: Option<String>,
}

/// Section tags for a chunk.
///
/// `number` may encode subsection depth as a dotted string ("1.2");
/// `level` counts the dotted components and is clamped to [1, 5].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub number: String,
    pub subsection: Option<String>,
    pub title: Option<String>,
    pub level: u8,
}

impl SectionInfo {
    pub fn new(number: impl Into<String>, level: u8) -> Self {
        Self {
            number: number.into(),
            subsection: None,
            title: None,
            level: level.clamp(1, 5),
        }
    }
}

/// Full metadata carried by a chunk.
///
/// `custom` uses a BTreeMap so that metadata iteration order is stable,
/// which the composite identity hash relies on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source file name (not the full path).
    pub source_document: String,
    /// Position within the source document; unique per document only.
    pub chunk_index: usize,
    pub document_type: DocumentType,
    pub word_count: usize,
    pub content_length: usize,
    pub chapter: Option<ChapterInfo>,
    pub section: Option<SectionInfo>,
    /// True when structural tags were propagated from a nearby element
    /// rather than extracted directly from this chunk.
    pub inherited: bool,
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

impl ChunkMetadata {
    /// Flatten all metadata into sorted `(key, value)` string pairs.
    ///
    /// This is the canonical rendering used for identity hashing and for
    /// post-filter matching, so keys follow the stored payload naming.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        pairs.push(("source_document".into(), self.source_document.clone()));
        pairs.push(("chunk_index".into(), self.chunk_index.to_string()));
        pairs.push(("document_type".into(), self.document_type.as_str().into()));
        if let Some(ref chapter) = self.chapter {
            pairs.push(("chapter_number".into(), chapter.number.clone()));
            if let Some(ref title) = chapter.title {
                pairs.push(("chapter_title".into(), title.clone()));
            }
            if let Some(ref raw) = chapter.raw_number {
                pairs.push(("chapter_raw_number".into(), raw.clone()));
            }
        }
        if let Some(ref section) = self.section {
            pairs.push(("section_number".into(), section.number.clone()));
            if let Some(ref sub) = section.subsection {
                pairs.push(("subsection_number".into(), sub.clone()));
            }
            if let Some(ref title) = section.title {
                pairs.push(("section_title".into(), title.clone()));
            }
            pairs.push(("section_level".into(), section.level.to_string()));
        }
        if self.inherited {
            pairs.push(("inherited_metadata".into(), "true".into()));
        }
        for (k, v) in &self.custom {
            pairs.push((k.clone(), v.clone()));
        }
        pairs.sort();
        pairs
    }

    /// Look up a single metadata value by its flattened key name.
    pub fn get(&self, key: &str) -> Option<String> {
        self.pairs()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// A unit of retrievable text with its structural metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Store-assigned identifier. Not used for deduplication; see
    /// [`ChunkIdentity`].
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn identity(&self) -> ChunkIdentity {
        ChunkIdentity::of(self)
    }
}

/// Composite content+metadata fingerprint.
///
/// Two results are "the same document" iff both halves match; comparing ids
/// alone would let duplicate ingestions of the same text slip through fusion
/// and expansion as distinct documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkIdentity {
    content: u64,
    metadata: u64,
}

impl ChunkIdentity {
    pub fn of(chunk: &Chunk) -> Self {
        let mut content_hasher = XxHash64::with_seed(0);
        content_hasher.write(chunk.content.as_bytes());

        let mut meta_hasher = XxHash64::with_seed(0);
        for (k, v) in chunk.metadata.pairs() {
            meta_hasher.write(k.as_bytes());
            meta_hasher.write(&[0xff]);
            meta_hasher.write(v.as_bytes());
            meta_hasher.write(&[0xfe]);
        }

        Self {
            content: content_hasher.finish(),
            metadata: meta_hasher.finish(),
        }
    }
}
