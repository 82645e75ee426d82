//! Data types for documents, chunks, and retrieval results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document (the source file path when loaded from disk).
    pub id: String,
    /// The extracted text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous span of a [`Document`]'s text.
///
/// Offsets count characters (not bytes) and describe the half-open range
/// `[offset_start, offset_end)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Identity derived from `(document_id, offset_start, offset_end)`, see [`Chunk::identity`].
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// First character of the span.
    pub offset_start: usize,
    /// One past the last character of the span.
    pub offset_end: usize,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Compute the stable identity of a chunk span.
    ///
    /// The first 16 bytes of `SHA-256("{document_id}:{start}:{end}")` are
    /// formatted as a UUID so the identity is accepted by every index backend.
    pub fn identity(document_id: &str, offset_start: usize, offset_end: usize) -> String {
        let digest = Sha256::digest(format!("{document_id}:{offset_start}:{offset_end}"));
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes).to_string()
    }

    /// Number of characters covered by this chunk.
    pub fn char_len(&self) -> usize {
        self.offset_end - self.offset_start
    }
}

/// A stored vector together with the chunk it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// The indexed chunk.
    pub chunk: Chunk,
    /// The chunk's embedding.
    pub embedding: Vec<f32>,
}

/// A retrieved [`Chunk`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// Chunks selected as context for one question, ordered by descending score.
///
/// An empty result is a normal outcome meaning "nothing in the knowledge base
/// is relevant enough".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Wrap hits, sorting them by descending score.
    pub fn new(mut hits: Vec<ScoredChunk>) -> Self {
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self { hits }
    }

    /// An empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<ScoredChunk> {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_and_span_sensitive() {
        let a = Chunk::identity("data/burns.pdf", 0, 500);
        assert_eq!(a, Chunk::identity("data/burns.pdf", 0, 500));
        assert_ne!(a, Chunk::identity("data/burns.pdf", 480, 980));
        assert_ne!(a, Chunk::identity("data/cuts.pdf", 0, 500));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn retrieval_result_sorts_descending() {
        let chunk = |id: &str| Chunk {
            id: id.into(),
            text: String::new(),
            document_id: "d".into(),
            offset_start: 0,
            offset_end: 0,
            metadata: HashMap::new(),
        };
        let result = RetrievalResult::new(vec![
            ScoredChunk { chunk: chunk("low"), score: 0.1 },
            ScoredChunk { chunk: chunk("high"), score: 0.9 },
        ]);
        assert_eq!(result.hits()[0].chunk.id, "high");
        assert_eq!(result.len(), 2);
    }
}
