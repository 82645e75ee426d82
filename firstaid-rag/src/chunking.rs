//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`FixedSizeChunker`], a
//! sliding-window splitter over characters with configurable overlap.

use std::iter;

use crate::config::RagConfig;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations must be deterministic: the same document always yields
/// the same chunk sequence.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn split(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size windows of characters with configurable overlap.
///
/// The window advances by `chunk_size - chunk_overlap` characters each step,
/// so consecutive chunks share `chunk_overlap` characters and together cover
/// the whole text. The last chunk may be shorter than `chunk_size`. Each
/// chunk inherits the parent document's metadata plus `chunk_index` and
/// `source` fields.
///
/// # Example
///
/// ```rust,ignore
/// use firstaid_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(500, 20)?;
/// let chunks = chunker.split(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size must be greater than zero".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker from the chunk parameters of a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for FixedSizeChunker {
    fn split(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        let text = &document.text;
        // Byte position of every character boundary, including the end of the text.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(iter::once(text.len())).collect();
        let char_count = boundaries.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut chunk_index = 0;

        loop {
            let end = (start + self.chunk_size).min(char_count);

            let mut metadata = document.metadata.clone();
            metadata.insert("chunk_index".to_string(), chunk_index.to_string());
            metadata.entry("source".to_string()).or_insert_with(|| document.id.clone());

            chunks.push(Chunk {
                id: Chunk::identity(&document.id, start, end),
                text: text[boundaries[start]..boundaries[end]].to_string(),
                document_id: document.id.clone(),
                offset_start: start,
                offset_end: end,
                metadata,
            });

            if end == char_count {
                break;
            }
            chunk_index += 1;
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("doc", text)
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(FixedSizeChunker::new(10, 10), Err(RagError::InvalidConfig(_))));
        assert!(matches!(FixedSizeChunker::new(0, 0), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = FixedSizeChunker::new(10, 2).unwrap();
        assert!(chunker.split(&doc("")).is_empty());
    }

    #[test]
    fn windows_advance_by_size_minus_overlap() {
        let chunker = FixedSizeChunker::new(4, 1).unwrap();
        let chunks = chunker.split(&doc("abcdefghij"));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcd", "defg", "ghij"]);
        assert_eq!((chunks[1].offset_start, chunks[1].offset_end), (3, 7));
    }

    #[test]
    fn last_chunk_may_be_short() {
        let chunker = FixedSizeChunker::new(4, 0).unwrap();
        let chunks = chunker.split(&doc("abcdef"));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "ef");
    }

    #[test]
    fn text_shorter_than_window_is_one_chunk() {
        let chunker = FixedSizeChunker::new(500, 20).unwrap();
        let chunks = chunker.split(&doc("Cool the burn under running water."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.get("source").map(String::as_str), Some("doc"));
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let chunker = FixedSizeChunker::new(3, 1).unwrap();
        let chunks = chunker.split(&doc("brûlure🔥ok"));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 3));
        assert_eq!(chunks[0].text, "brû");
    }
}
