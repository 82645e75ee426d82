//! Vector index trait for storing and searching chunk embeddings.

use async_trait::async_trait;

use crate::document::{IndexEntry, ScoredChunk};
use crate::error::Result;

/// A named collection of [`IndexEntry`] values with similarity search.
///
/// An instance is bound to one collection. It is constructed once at
/// startup and shared (behind an `Arc`) by ingestion and query; every
/// implementation must allow concurrent calls. Scores are cosine similarity
/// for every implementation in this crate.
///
/// Failures to reach the backing store surface as
/// [`RagError::IndexUnavailable`](crate::RagError::IndexUnavailable) and are
/// never retried or replaced by a local fallback.
///
/// # Example
///
/// ```rust,ignore
/// use firstaid_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new("medical-chatbot-1");
/// index.create_if_missing(384).await?;
/// index.upsert(&entries).await?;
/// let hits = index.query(&query_embedding, 4).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The collection name this instance is bound to.
    fn name(&self) -> &str;

    /// Create the collection with the given dimensionality. No-op if it already exists.
    async fn create_if_missing(&self, dimensions: usize) -> Result<()>;

    /// Insert or replace entries, keyed by chunk ID. Last write wins.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Return at most `k` chunks ordered by descending similarity to `vector`.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of stored entries.
    async fn len(&self) -> Result<u64>;

    /// Whether the collection holds no entries.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
