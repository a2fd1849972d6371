//! Metadata filters for scoped retrieval

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkMetadata;

/// Equality constraints on flattened metadata keys.
///
/// Used both as a pre-filter pushed down to the vector store and as a
/// post-filter applied to results after over-fetching. All listed
/// constraints must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub conditions: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    pub fn chapter(number: impl Into<String>) -> Self {
        Self::new().with("chapter_number", number)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// True when every condition matches the chunk's flattened metadata.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        let pairs = metadata.pairs();
        self.conditions
            .iter()
            .all(|(k, v)| pairs.iter().any(|(pk, pv)| pk == k && pv == v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChapterInfo;

    fn metadata_with_chapter(number: &str) -> ChunkMetadata {
        ChunkMetadata {
            source_document: "cours.pdf".into(),
            chapter: Some(ChapterInfo {
                number: number.into(),
                title: None,
                raw_number: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(MetadataFilter::new().matches(&ChunkMetadata::default()));
    }

    #[test]
    fn chapter_filter_matches_only_that_chapter() {
        let filter = MetadataFilter::chapter("4");
        assert!(filter.matches(&metadata_with_chapter("4")));
        assert!(!filter.matches(&metadata_with_chapter("5")));
        assert!(!filter.matches(&ChunkMetadata::default()));
    }

    #[test]
    fn all_conditions_must_hold() {
        let filter = MetadataFilter::chapter("4").with("source_document", "autre.pdf");
        assert!(!filter.matches(&metadata_with_chapter("4")));
    }
}
