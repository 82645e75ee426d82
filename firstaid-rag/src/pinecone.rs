//! Pinecone vector index backend.
//!
//! Provides [`PineconeIndex`], which implements [`VectorIndex`] over the
//! Pinecone REST API using `reqwest`. Only available with the `pinecone`
//! feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use firstaid_rag::pinecone::PineconeIndex;
//!
//! let index = PineconeIndex::new(api_key, "medical-chatbot-1")?;
//! index.create_if_missing(384).await?;
//! let hits = index.query(&query_embedding, 4).await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::document::{Chunk, IndexEntry, ScoredChunk};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Control-plane base URL.
pub const PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";

const API_VERSION: &str = "2024-07";
const BACKEND: &str = "pinecone";

/// How long `create_if_missing` waits for a new index to start serving.
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(60);
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pinecone rejects upsert requests above 1000 vectors or 2 MB.
const UPSERT_BATCH: usize = 100;

/// Reserved payload keys; every other metadata key is a chunk metadata field.
const KEY_TEXT: &str = "text";
const KEY_DOCUMENT_ID: &str = "document_id";
const KEY_OFFSET_START: &str = "offset_start";
const KEY_OFFSET_END: &str = "offset_end";

/// Where a serverless index is created when it does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerlessSpec {
    pub cloud: String,
    pub region: String,
}

impl Default for ServerlessSpec {
    fn default() -> Self {
        Self { cloud: "aws".into(), region: "us-east-1".into() }
    }
}

/// A [`VectorIndex`] backed by a Pinecone serverless index with cosine metric.
///
/// The data-plane host is resolved from the control plane on first use
/// unless it is supplied with [`with_host`](PineconeIndex::with_host).
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    index_name: String,
    namespace: String,
    spec: ServerlessSpec,
    control_url: String,
    ready_timeout: Duration,
    host: OnceCell<String>,
}

impl PineconeIndex {
    /// Create a handle for the named index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if the API key is empty.
    pub fn new(api_key: impl Into<String>, index_name: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::InvalidConfig("Pinecone API key must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            index_name: index_name.into(),
            namespace: String::new(),
            spec: ServerlessSpec::default(),
            control_url: PINECONE_CONTROL_URL.into(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            host: OnceCell::new(),
        })
    }

    /// Use a known data-plane host (e.g. `medical-chatbot-1-abc123.svc.pinecone.io`).
    pub fn with_host(self, host: impl Into<String>) -> Self {
        let host = normalize_host(&host.into());
        Self { host: OnceCell::new_with(Some(host)), ..self }
    }

    /// Store vectors in a namespace other than the default one.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set where the index is created if missing.
    pub fn with_spec(mut self, spec: ServerlessSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Override the control-plane URL.
    pub fn with_control_url(mut self, url: impl Into<String>) -> Self {
        self.control_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound the wait for a freshly created index to report ready.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn send(&self, builder: reqwest::RequestBuilder, op: &str) -> Result<reqwest::Response> {
        let response = builder.send().await.map_err(|e| {
            error!(backend = BACKEND, op, error = %e, "request failed");
            RagError::index(BACKEND, format!("{op} request failed: {e}"))
        })?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(backend = BACKEND, op, %status, "API error");
            return Err(RagError::index(BACKEND, format!("{op} returned {status}: {body}")));
        }
        Ok(response)
    }

    /// Fetch the index description; `None` if the index does not exist.
    async fn describe(&self) -> Result<Option<IndexDescription>> {
        let url = format!("{}/indexes/{}", self.control_url, self.index_name);
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| RagError::index(BACKEND, format!("describe request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(RagError::index(BACKEND, format!("describe returned {status}")));
        }
        let description = response
            .json::<IndexDescription>()
            .await
            .map_err(|e| RagError::index(BACKEND, format!("failed to parse description: {e}")))?;
        Ok(Some(description))
    }

    /// Poll the control plane until the index reports ready or the timeout passes.
    async fn wait_until_ready(&self) -> Result<IndexDescription> {
        let deadline = tokio::time::Instant::now() + self.ready_timeout;
        loop {
            match self.describe().await? {
                Some(description) if description.is_ready() => return Ok(description),
                Some(description) => {
                    debug!(
                        index = %self.index_name,
                        state = description.state(),
                        "waiting for pinecone index"
                    );
                }
                None => debug!(index = %self.index_name, "pinecone index not visible yet"),
            }
            if tokio::time::Instant::now() >= deadline {
                error!(index = %self.index_name, timeout = ?self.ready_timeout, "index not ready");
                return Err(RagError::index(
                    BACKEND,
                    format!("index '{}' not ready after {:?}", self.index_name, self.ready_timeout),
                ));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn host(&self) -> Result<&str> {
        self.host
            .get_or_try_init(|| async {
                let description = self.describe().await?.ok_or_else(|| {
                    RagError::index(BACKEND, format!("index '{}' does not exist", self.index_name))
                })?;
                Ok::<_, RagError>(normalize_host(&description.host))
            })
            .await
            .map(String::as_str)
    }

    fn to_vector(entry: &IndexEntry) -> UpsertVector<'_> {
        let chunk = &entry.chunk;
        let mut metadata: Map<String, Value> = chunk
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        metadata.insert(KEY_TEXT.into(), Value::String(chunk.text.clone()));
        metadata.insert(KEY_DOCUMENT_ID.into(), Value::String(chunk.document_id.clone()));
        metadata.insert(KEY_OFFSET_START.into(), json!(chunk.offset_start));
        metadata.insert(KEY_OFFSET_END.into(), json!(chunk.offset_end));

        UpsertVector { id: &chunk.id, values: &entry.embedding, metadata }
    }

    fn from_match(m: QueryMatch) -> ScoredChunk {
        let mut metadata = m.metadata.unwrap_or_default();
        let take_string = |map: &mut Map<String, Value>, key: &str| match map.remove(key) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let take_offset = |map: &mut Map<String, Value>, key: &str| {
            map.remove(key).and_then(|v| v.as_f64()).map(|n| n as usize).unwrap_or_default()
        };

        let text = take_string(&mut metadata, KEY_TEXT);
        let document_id = take_string(&mut metadata, KEY_DOCUMENT_ID);
        let offset_start = take_offset(&mut metadata, KEY_OFFSET_START);
        let offset_end = take_offset(&mut metadata, KEY_OFFSET_END);
        let metadata: HashMap<String, String> = metadata
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect();

        ScoredChunk {
            chunk: Chunk { id: m.id, text, document_id, offset_start, offset_end, metadata },
            score: m.score,
        }
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

// ── Pinecone API request/response types ────────────────────────────

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

impl IndexDescription {
    /// Descriptions without a status block (local emulators) count as ready.
    fn is_ready(&self) -> bool {
        self.status.as_ref().is_none_or(|s| s.ready)
    }

    fn state(&self) -> &str {
        self.status.as_ref().and_then(|s| s.state.as_deref()).unwrap_or("Unknown")
    }
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Map<String, Value>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
    #[serde(default)]
    total_vector_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: u64,
}

// ── VectorIndex implementation ─────────────────────────────────────

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.index_name
    }

    async fn create_if_missing(&self, dimensions: usize) -> Result<()> {
        if let Some(existing) = self.describe().await? {
            match existing.dimension {
                Some(existing_dims) if existing_dims != dimensions => {
                    return Err(RagError::InvalidConfig(format!(
                        "pinecone index '{}' has {existing_dims} dimensions, embedder produces {dimensions}",
                        self.index_name
                    )));
                }
                _ => {}
            }
            let existing = if existing.is_ready() {
                existing
            } else {
                info!(index = %self.index_name, state = existing.state(), "waiting for pinecone index");
                self.wait_until_ready().await?
            };
            debug!(index = %self.index_name, "pinecone index already exists, skipping creation");
            let _ = self.host.set(normalize_host(&existing.host));
            return Ok(());
        }

        let body = json!({
            "name": self.index_name,
            "dimension": dimensions,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": self.spec.cloud, "region": self.spec.region } },
        });
        let url = format!("{}/indexes", self.control_url);
        let response =
            self.send(self.request(reqwest::Method::POST, url).json(&body), "create_index").await?;
        let created = response
            .json::<IndexDescription>()
            .await
            .map_err(|e| RagError::index(BACKEND, format!("failed to parse description: {e}")))?;
        info!(index = %self.index_name, dimensions, "created pinecone index");

        let created = if created.is_ready() { created } else { self.wait_until_ready().await? };
        let _ = self.host.set(normalize_host(&created.host));
        info!(index = %self.index_name, "pinecone index ready");
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let url = format!("{}/vectors/upsert", self.host().await?);

        for batch in entries.chunks(UPSERT_BATCH) {
            let body = UpsertRequest {
                vectors: batch.iter().map(Self::to_vector).collect(),
                namespace: &self.namespace,
            };
            self.send(self.request(reqwest::Method::POST, url.clone()).json(&body), "upsert")
                .await?;
        }

        debug!(index = %self.index_name, count = entries.len(), "upserted vectors to pinecone");
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let url = format!("{}/query", self.host().await?);
        let body =
            QueryRequest { vector, top_k: k, include_metadata: true, namespace: &self.namespace };

        let response =
            self.send(self.request(reqwest::Method::POST, url).json(&body), "query").await?;
        let parsed = response
            .json::<QueryResponse>()
            .await
            .map_err(|e| RagError::index(BACKEND, format!("failed to parse query response: {e}")))?;

        let mut hits: Vec<ScoredChunk> = parsed.matches.into_iter().map(Self::from_match).collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn len(&self) -> Result<u64> {
        let url = format!("{}/describe_index_stats", self.host().await?);
        let response = self
            .send(self.request(reqwest::Method::POST, url).json(&json!({})), "describe_index_stats")
            .await?;
        let stats = response
            .json::<StatsResponse>()
            .await
            .map_err(|e| RagError::index(BACKEND, format!("failed to parse stats: {e}")))?;

        if self.namespace.is_empty() {
            return Ok(stats.total_vector_count);
        }
        Ok(stats.namespaces.get(&self.namespace).map(|ns| ns.vector_count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: Chunk::identity("burns.pdf", 0, 12),
                text: "Cool the burn".into(),
                document_id: "burns.pdf".into(),
                offset_start: 0,
                offset_end: 12,
                metadata: HashMap::from([("chunk_index".to_string(), "0".to_string())]),
            },
            embedding: vec![0.1, 0.2],
        }
    }

    #[test]
    fn host_gets_https_scheme() {
        assert_eq!(normalize_host("idx-abc.svc.pinecone.io"), "https://idx-abc.svc.pinecone.io");
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }

    #[test]
    fn vector_metadata_round_trips_through_a_match() {
        let entry = entry();
        let vector = PineconeIndex::to_vector(&entry);
        let hit = PineconeIndex::from_match(QueryMatch {
            id: vector.id.to_string(),
            score: 0.9,
            metadata: Some(vector.metadata.clone()),
        });
        assert_eq!(hit.chunk, entry.chunk);
    }

    #[test]
    fn initializing_index_is_not_ready() {
        let description: IndexDescription = serde_json::from_value(json!({
            "name": "medical-chatbot-1",
            "dimension": 384,
            "metric": "cosine",
            "host": "medical-chatbot-1-abc.svc.pinecone.io",
            "status": { "ready": false, "state": "Initializing" },
        }))
        .unwrap();
        assert!(!description.is_ready());
        assert_eq!(description.state(), "Initializing");
        assert_eq!(description.dimension, Some(384));
    }

    #[test]
    fn ready_status_and_missing_status_are_ready() {
        let ready: IndexDescription = serde_json::from_value(json!({
            "host": "idx.svc.pinecone.io",
            "status": { "ready": true, "state": "Ready" },
        }))
        .unwrap();
        assert!(ready.is_ready());

        let bare: IndexDescription =
            serde_json::from_value(json!({ "host": "localhost:5081" })).unwrap();
        assert!(bare.is_ready());
        assert_eq!(bare.state(), "Unknown");
    }

    #[tokio::test]
    async fn unreachable_control_plane_fails_before_waiting() {
        let index = PineconeIndex::new("key", "kb")
            .unwrap()
            .with_control_url("http://127.0.0.1:9")
            .with_ready_timeout(Duration::from_secs(5));
        let err = index.wait_until_ready().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IndexUnavailable);
    }

    #[test]
    fn query_request_uses_camel_case() {
        let body =
            QueryRequest { vector: &[1.0], top_k: 4, include_metadata: true, namespace: "" };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["topK"], 4);
        assert_eq!(json["includeMetadata"], true);
    }
}
