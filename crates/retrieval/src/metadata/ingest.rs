//! Chunk ingestion
//!
//! Turns the raw text chunks produced by an external document splitter into
//! tagged [`Chunk`]s. Direct extraction runs per chunk; a second pass scans
//! the whole document for structural elements and donates tags to chunks
//! that matched nothing themselves.

use std::path::Path;

use docqa_core::{Chunk, ChunkMetadata, DocumentType};

use super::extractor::StructuralExtractor;

/// A raw chunk handed over by the document splitter.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub content: String,
    /// Position within the source document.
    pub index: usize,
}

/// Per-document ingestion summary, for provenance display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub chunk_count: usize,
    pub word_count: usize,
    /// Distinct chapter numbers seen across the document's chunks.
    pub chapter_count: usize,
    /// Distinct section numbers seen across the document's chunks.
    pub section_count: usize,
    /// Chunks carrying any structural tag, direct or inherited.
    pub tagged_chunks: usize,
    pub inherited_chunks: usize,
}

/// Ingestion-time metadata tagger.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkIngestor {
    extractor: StructuralExtractor,
}

impl ChunkIngestor {
    pub fn new() -> Self {
        Self {
            extractor: StructuralExtractor::new(),
        }
    }

    /// Tag every chunk of one source document.
    ///
    /// `source_path` is only used for the file name and document type; the
    /// file itself is never read here.
    pub fn ingest_document(&self, source_path: &Path, raw_chunks: Vec<RawChunk>) -> Vec<Chunk> {
        let source_document = source_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let document_type = DocumentType::from_path(source_path);

        // Full-document element scan for the inheritance pass.
        let full_text: String = raw_chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let elements = self.extractor.find_structural_elements(&full_text);

        let mut chunks = Vec::with_capacity(raw_chunks.len());

        for raw in raw_chunks {
            let direct = self.extractor.extract(&raw.content);

            let (structure, inherited) =
                if direct.chapter.is_none() && direct.section.is_none() {
                    match self.extractor.inherit_from_elements(&raw.content, &elements) {
                        Some(inherited_tags) => (inherited_tags, true),
                        None => (direct, false),
                    }
                } else {
                    (direct, false)
                };

            let metadata = ChunkMetadata {
                source_document: source_document.clone(),
                chunk_index: raw.index,
                document_type,
                word_count: raw.content.split_whitespace().count(),
                content_length: raw.content.chars().count(),
                chapter: structure.chapter,
                section: structure.section,
                inherited,
                custom: Default::default(),
            };

            chunks.push(Chunk {
                id: format!("{}:{}", source_document, raw.index),
                content: raw.content,
                metadata,
            });
        }

        tracing::info!(
            document = %source_document,
            chunks = chunks.len(),
            tagged = chunks
                .iter()
                .filter(|c| c.metadata.chapter.is_some() || c.metadata.section.is_some())
                .count(),
            "ingested document"
        );

        chunks
    }

    /// Summarize one document's tagged chunks.
    pub fn document_stats(chunks: &[Chunk]) -> DocumentStats {
        let mut chapters = std::collections::BTreeSet::new();
        let mut sections = std::collections::BTreeSet::new();
        let mut stats = DocumentStats {
            chunk_count: chunks.len(),
            ..Default::default()
        };

        for chunk in chunks {
            stats.word_count += chunk.metadata.word_count;
            if let Some(chapter) = &chunk.metadata.chapter {
                chapters.insert(chapter.number.clone());
            }
            if let Some(section) = &chunk.metadata.section {
                sections.insert(section.number.clone());
            }
            if chunk.metadata.chapter.is_some() || chunk.metadata.section.is_some() {
                stats.tagged_chunks += 1;
            }
            if chunk.metadata.inherited {
                stats.inherited_chunks += 1;
            }
        }

        stats.chapter_count = chapters.len();
        stats.section_count = sections.len();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(content: &str, index: usize) -> RawChunk {
        RawChunk {
            content: content.to_string(),
            index,
        }
    }

    #[test]
    fn tags_direct_and_inherited_chunks() {
        let ingestor = ChunkIngestor::new();
        let chunks = ingestor.ingest_document(
            Path::new("docs/cours.pdf"),
            vec![
                raw("Chapitre IV : Les fonctions et procédures\nUne fonction...", 0),
                raw("les fonctions et procédures acceptent des paramètres", 1),
                raw("texte totalement sans rapport aucun", 2),
            ],
        );

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].metadata.source_document, "cours.pdf");
        assert_eq!(chunks[0].metadata.document_type, DocumentType::Pdf);

        let direct = chunks[0].metadata.chapter.as_ref().expect("direct chapter");
        assert_eq!(direct.number, "4");
        assert!(!chunks[0].metadata.inherited);

        // Second chunk shares enough words with the chapter heading.
        let inherited = chunks[1].metadata.chapter.as_ref().expect("inherited");
        assert_eq!(inherited.number, "4");
        assert!(chunks[1].metadata.inherited);

        // Third chunk matches nothing and stays untagged.
        assert!(chunks[2].metadata.chapter.is_none());
        assert!(!chunks[2].metadata.inherited);
    }

    #[test]
    fn derived_stats_are_filled() {
        let ingestor = ChunkIngestor::new();
        let chunks = ingestor.ingest_document(
            Path::new("notes.md"),
            vec![raw("un deux trois", 7)],
        );
        assert_eq!(chunks[0].metadata.word_count, 3);
        assert_eq!(chunks[0].metadata.content_length, 13);
        assert_eq!(chunks[0].metadata.chunk_index, 7);
        assert_eq!(chunks[0].metadata.document_type, DocumentType::Md);
    }

    #[test]
    fn document_stats_count_distinct_structures() {
        let ingestor = ChunkIngestor::new();
        let chunks = ingestor.ingest_document(
            Path::new("cours.pdf"),
            vec![
                raw("Chapitre 1 : Les variables\nUne variable stocke une valeur.", 0),
                raw("Chapitre 2 : Les fonctions\nUne fonction retourne une valeur.", 1),
                raw("texte totalement sans rapport aucun", 2),
            ],
        );

        let stats = ChunkIngestor::document_stats(&chunks);
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.chapter_count, 2);
        assert_eq!(stats.tagged_chunks, 2);
        assert!(stats.word_count > 0);
    }
}
