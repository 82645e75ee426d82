//! Hugging Face Inference API embedding provider.
//!
//! This module is only available when the `huggingface` feature is enabled.
//! The default model, `sentence-transformers/all-MiniLM-L6-v2`, produces
//! 384-dimensional sentence embeddings.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::Embedder;
use crate::error::{RagError, Result};

/// Feature-extraction endpoint of the hosted inference API.
pub const HF_INFERENCE_BASE: &str =
    "https://router.huggingface.co/hf-inference/models";

/// The default sentence-embedding model.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

const DEFAULT_DIMENSIONS: usize = 384;

const PROVIDER: &str = "HuggingFace";

/// An [`Embedder`] backed by the Hugging Face feature-extraction pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use firstaid_rag::huggingface::HuggingFaceEmbedder;
///
/// let embedder = HuggingFaceEmbedder::from_env()?;
/// let vectors = embedder.embed_batch(&["burn", "sprain"]).await?;
/// ```
pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl HuggingFaceEmbedder {
    /// Create a new embedder with the given API token and the default model.
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(RagError::InvalidConfig("Hugging Face API token must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_token,
            base_url: HF_INFERENCE_BASE.into(),
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Create a new embedder using the `HF_API_TOKEN` environment variable.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("HF_API_TOKEN").map_err(|_| {
            RagError::InvalidConfig("HF_API_TOKEN environment variable not set".into())
        })?;
        Self::new(token)
    }

    /// Use a different sentence-transformers model with the given output size.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Point the embedder at a self-hosted text-embeddings-inference server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/pipeline/feature-extraction", self.base_url, self.model)
    }
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [&'a str],
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::embedding(PROVIDER, "empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let body = FeatureExtractionRequest {
            inputs: texts,
            options: RequestOptions { wait_for_model: true },
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::embedding(PROVIDER, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
            error!(provider = PROVIDER, %status, "API error");
            return Err(RagError::embedding(PROVIDER, format!("API returned {status}: {detail}")));
        }

        // Sentence-transformers models return one pooled vector per input.
        response.json::<Vec<Vec<f32>>>().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::embedding(PROVIDER, format!("failed to parse response: {e}"))
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
