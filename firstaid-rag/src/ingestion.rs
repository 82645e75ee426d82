//! Corpus ingestion: load → chunk → embed → upsert.
//!
//! [`IngestionPipeline::ingest_if_empty`] runs the whole workflow once,
//! when the index holds no vectors. A populated index is left untouched.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::chunking::Chunker;
use crate::document::{Chunk, IndexEntry};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::loader::DocumentLoader;

/// Lifecycle of an [`IngestionPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestionState {
    NotStarted,
    InProgress,
    Complete,
    Failed,
}

impl fmt::Display for IngestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::InProgress => "in progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What an ingestion run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    /// `true` when the index was already populated and nothing was done.
    pub skipped: bool,
    /// Vectors in the index before the run.
    pub existing_vectors: u64,
    /// Documents loaded from the corpus.
    pub documents: usize,
    /// Chunks embedded and upserted.
    pub chunks: usize,
}

/// Orchestrates loading, chunking, embedding, and upserting a corpus.
///
/// Embedding batches run concurrently (up to `concurrency` in flight).
/// Upserts are keyed by chunk identity, so batch completion order does not
/// matter. Ingestion is not transactional: when a batch fails, the run
/// stops, the state becomes [`IngestionState::Failed`], and batches already
/// upserted stay in the index.
pub struct IngestionPipeline {
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    concurrency: usize,
    state: RwLock<IngestionState>,
    run_lock: Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            loader,
            chunker,
            embedder,
            index,
            batch_size: 64,
            concurrency: 4,
            state: RwLock::new(IngestionState::NotStarted),
            run_lock: Mutex::new(()),
        }
    }

    /// Set the number of chunks per embedding request (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the number of batches processed concurrently (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The current lifecycle state.
    pub async fn state(&self) -> IngestionState {
        *self.state.read().await
    }

    async fn set_state(&self, state: IngestionState) {
        *self.state.write().await = state;
    }

    /// Ingest the corpus if the index is empty.
    ///
    /// Concurrent callers are serialized; a caller that waited for a
    /// running ingestion finds the index populated and returns a skipped
    /// report.
    ///
    /// # Errors
    ///
    /// Returns the first error of the run ([`RagError::DocumentLoadError`],
    /// [`RagError::EmbeddingServiceError`], [`RagError::IndexUnavailable`],
    /// [`RagError::InvalidConfig`]) after moving to [`IngestionState::Failed`].
    pub async fn ingest_if_empty(&self) -> Result<IngestionReport> {
        let _guard = self.run_lock.lock().await;

        let existing_vectors = match self.prepare_index().await {
            Ok(count) => count,
            Err(e) => {
                error!(index = self.index.name(), error = %e, "could not inspect vector index");
                self.set_state(IngestionState::Failed).await;
                return Err(e);
            }
        };

        if existing_vectors > 0 {
            info!(
                index = self.index.name(),
                existing_vectors, "index already populated, skipping ingestion"
            );
            self.set_state(IngestionState::Complete).await;
            return Ok(IngestionReport { skipped: true, existing_vectors, ..Default::default() });
        }

        self.set_state(IngestionState::InProgress).await;
        match self.run().await {
            Ok(report) => {
                info!(
                    index = self.index.name(),
                    documents = report.documents,
                    chunks = report.chunks,
                    "ingestion complete"
                );
                self.set_state(IngestionState::Complete).await;
                Ok(report)
            }
            Err(e) => {
                error!(index = self.index.name(), error = %e, "ingestion failed");
                self.set_state(IngestionState::Failed).await;
                Err(e)
            }
        }
    }

    async fn prepare_index(&self) -> Result<u64> {
        self.index.create_if_missing(self.embedder.dimensions()).await?;
        self.index.len().await
    }

    async fn run(&self) -> Result<IngestionReport> {
        let loader = Arc::clone(&self.loader);
        let documents = tokio::task::spawn_blocking(move || loader.load()).await.map_err(|e| {
            RagError::DocumentLoadError {
                path: PathBuf::new(),
                message: format!("document loader task failed: {e}"),
            }
        })??;

        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &documents {
            let split = self.chunker.split(document);
            if split.is_empty() {
                warn!(document.id = %document.id, "document produced no chunks");
            }
            info!(document.id = %document.id, chunk_count = split.len(), "chunked document");
            chunks.extend(split);
        }

        let total = stream::iter(chunks.chunks(self.batch_size))
            .map(|batch| self.embed_and_upsert(batch))
            .buffer_unordered(self.concurrency)
            .try_fold(0usize, |acc, n| async move { Ok(acc + n) })
            .await?;

        Ok(IngestionReport {
            skipped: false,
            existing_vectors: 0,
            documents: documents.len(),
            chunks: total,
        })
    }

    async fn embed_and_upsert(&self, batch: &[Chunk]) -> Result<usize> {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(RagError::EmbeddingServiceError {
                provider: self.embedder.name().to_string(),
                message: format!(
                    "expected {} embeddings, backend returned {}",
                    batch.len(),
                    embeddings.len()
                ),
            });
        }

        let entries: Vec<IndexEntry> = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();

        self.index.upsert(&entries).await?;
        Ok(entries.len())
    }
}
