//! In-memory vector index using cosine similarity.
//!
//! This module provides [`InMemoryVectorIndex`], a vector index backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and small corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{IndexEntry, ScoredChunk};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

const BACKEND: &str = "InMemory";

/// An in-memory vector index using cosine similarity for search.
///
/// Entries are stored by chunk ID. Queries take the read lock only, so they
/// run concurrently with each other and wait at most for one upsert batch.
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    name: String,
    state: RwLock<Option<Collection>>,
}

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    entries: HashMap<String, IndexEntry>,
}

impl InMemoryVectorIndex {
    /// Create a handle for a collection that does not exist yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: RwLock::new(None) }
    }

    fn missing(&self) -> RagError {
        RagError::index(BACKEND, format!("collection '{}' does not exist", self.name))
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_if_missing(&self, dimensions: usize) -> Result<()> {
        let mut state = self.state.write().await;
        match state.as_ref() {
            Some(existing) if existing.dimensions != dimensions => {
                Err(RagError::InvalidConfig(format!(
                    "collection '{}' has {} dimensions, embedder produces {dimensions}",
                    self.name, existing.dimensions
                )))
            }
            Some(_) => Ok(()),
            None => {
                debug!(collection = %self.name, dimensions, "created in-memory collection");
                *state = Some(Collection { dimensions, entries: HashMap::new() });
                Ok(())
            }
        }
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut state = self.state.write().await;
        let collection = state.as_mut().ok_or_else(|| self.missing())?;

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != collection.dimensions) {
            return Err(RagError::InvalidConfig(format!(
                "chunk '{}' has a {}-dimensional embedding, collection '{}' expects {}",
                bad.chunk.id,
                bad.embedding.len(),
                self.name,
                collection.dimensions
            )));
        }

        for entry in entries {
            collection.entries.insert(entry.chunk.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read().await;
        let collection = state.as_ref().ok_or_else(|| self.missing())?;

        if vector.len() != collection.dimensions {
            return Err(RagError::InvalidConfig(format!(
                "query embedding has {} dimensions, collection '{}' expects {}",
                vector.len(),
                self.name,
                collection.dimensions
            )));
        }

        let mut scored: Vec<ScoredChunk> = collection
            .entries
            .values()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&entry.embedding, vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> Result<u64> {
        let state = self.state.read().await;
        let collection = state.as_ref().ok_or_else(|| self.missing())?;
        Ok(collection.entries.len() as u64)
    }
}
