//! Similarity retrieval with a relevance cutoff.

use std::sync::Arc;

use tracing::{debug, error};

use crate::document::RetrievalResult;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Embeds a query, searches the index, and drops candidates below a
/// minimum score.
///
/// An empty [`RetrievalResult`] is returned, not an error, when nothing
/// passes the cutoff.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Retrieve at most `k` chunks scoring at least `min_score`, best first.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidConfig`] if `k == 0`
    /// - [`RagError::EmbeddingServiceError`] if the query cannot be embedded
    /// - [`RagError::IndexUnavailable`] if the index cannot be searched
    pub async fn retrieve(&self, query: &str, k: usize, min_score: f32) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidConfig("k must be greater than zero".into()));
        }

        let query_embedding = self.embedder.embed(query).await.inspect_err(|e| {
            error!(error = %e, "embedding failed during retrieval");
        })?;

        let candidates = self.index.query(&query_embedding, k).await.inspect_err(|e| {
            error!(index = self.index.name(), error = %e, "vector index search failed");
        })?;
        let candidate_count = candidates.len();

        let hits: Vec<_> = candidates.into_iter().filter(|hit| hit.score >= min_score).collect();

        debug!(
            index = self.index.name(),
            candidate_count,
            result_count = hits.len(),
            min_score,
            top_score = hits.first().map(|h| h.score),
            "retrieval completed"
        );

        Ok(RetrievalResult::new(hits))
    }
}
