//! Qdrant vector index backend.
//!
//! Provides [`QdrantIndex`] which implements [`VectorIndex`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//! Only available with the `qdrant` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use firstaid_rag::qdrant::QdrantIndex;
//!
//! let index = QdrantIndex::new("http://localhost:6334", "medical-chatbot-1")?;
//! index.create_if_missing(384).await?;
//! index.upsert(&entries).await?;
//! let hits = index.query(&query_embedding, 4).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::debug;

use crate::document::{Chunk, IndexEntry, ScoredChunk};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// A [`VectorIndex`] backed by a [Qdrant](https://qdrant.tech/) collection.
///
/// The collection uses cosine distance. Chunk text, offsets, and metadata
/// are stored as the point payload; the chunk ID (a UUID) is the point ID.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    /// Create a new Qdrant index handle connecting to the given URL.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client, collection: collection.into() })
    }

    /// Create a new Qdrant index handle from an existing client.
    pub fn from_client(client: Qdrant, collection: impl Into<String>) -> Self {
        Self { client, collection: collection.into() }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::index("qdrant", e.to_string())
    }

    /// Extract a string from a Qdrant payload value.
    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn extract_offset(value: &QdrantValue) -> Option<usize> {
        match &value.kind {
            Some(Kind::IntegerValue(n)) => usize::try_from(*n).ok(),
            Some(Kind::DoubleValue(n)) => Some(*n as usize),
            _ => None,
        }
    }

    fn to_point(entry: &IndexEntry) -> PointStruct {
        let chunk = &entry.chunk;
        let metadata_obj: serde_json::Map<String, serde_json::Value> = chunk
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let payload_json = serde_json::json!({
            "text": chunk.text,
            "document_id": chunk.document_id,
            "offset_start": chunk.offset_start,
            "offset_end": chunk.offset_end,
            "metadata": metadata_obj,
        });
        let payload = Payload::try_from(payload_json).unwrap_or_default();

        PointStruct::new(chunk.id.clone(), entry.embedding.clone(), payload)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn create_if_missing(&self, dimensions: usize) -> Result<()> {
        let exists =
            self.client.collection_exists(&self.collection).await.map_err(Self::map_err)?;
        if exists {
            debug!(collection = %self.collection, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = entries.iter().map(Self::to_point).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = entries.len(), "upserted chunks to qdrant");
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let results = response
            .result
            .into_iter()
            .map(|scored| {
                let id = scored
                    .id
                    .as_ref()
                    .and_then(|pid| match &pid.point_id_options {
                        Some(PointIdOptions::Uuid(s)) => Some(s.clone()),
                        Some(PointIdOptions::Num(n)) => Some(n.to_string()),
                        None => None,
                    })
                    .unwrap_or_default();

                let payload = &scored.payload;
                let text = payload.get("text").and_then(Self::extract_string).unwrap_or_default();
                let document_id =
                    payload.get("document_id").and_then(Self::extract_string).unwrap_or_default();
                let offset_start =
                    payload.get("offset_start").and_then(Self::extract_offset).unwrap_or_default();
                let offset_end =
                    payload.get("offset_end").and_then(Self::extract_offset).unwrap_or_default();

                let metadata: HashMap<String, String> = payload
                    .get("metadata")
                    .and_then(|v| match &v.kind {
                        Some(Kind::StructValue(s)) => Some(
                            s.fields
                                .iter()
                                .filter_map(|(k, v)| {
                                    Self::extract_string(v).map(|s| (k.clone(), s))
                                })
                                .collect(),
                        ),
                        _ => None,
                    })
                    .unwrap_or_default();

                ScoredChunk {
                    chunk: Chunk { id, text, document_id, offset_start, offset_end, metadata },
                    score: scored.score,
                }
            })
            .collect();

        Ok(results)
    }

    async fn len(&self) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(Self::map_err)?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}
