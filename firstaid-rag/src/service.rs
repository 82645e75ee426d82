//! The caller-facing facade.

use std::sync::Arc;

use tracing::info;

use crate::chunking::FixedSizeChunker;
use crate::config::RagConfig;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generator::{Answer, ChatMessage, Generator, LanguageModel};
use crate::index::VectorIndex;
use crate::ingestion::{IngestionPipeline, IngestionReport, IngestionState};
use crate::inmemory::InMemoryVectorIndex;
use crate::loader::{DirectoryLoader, DocumentLoader};
use crate::prompt::{PromptAssembler, PromptTemplate};
use crate::query::{QueryOptions, QueryPipeline};
use crate::retriever::Retriever;
use crate::settings::{EmbeddingProvider, IndexBackend, Settings};

/// A knowledge-base question-answering service.
///
/// Both pipelines share one [`VectorIndex`] handle, constructed explicitly
/// and passed in. Callers only ever need [`ingest_if_empty`](Self::ingest_if_empty)
/// and [`answer`](Self::answer).
///
/// # Example
///
/// ```rust,ignore
/// let service = RagService::builder()
///     .loader(Arc::new(DirectoryLoader::new("data")))
///     .embedder(Arc::new(embedder))
///     .index(Arc::new(InMemoryVectorIndex::new("first-aid")))
///     .language_model(Arc::new(model))
///     .build()?;
///
/// service.ingest_if_empty().await?;
/// let answer = service.answer("How do I treat a burn?", &[]).await?;
/// ```
pub struct RagService {
    config: RagConfig,
    index: Arc<dyn VectorIndex>,
    ingestion: IngestionPipeline,
    query: QueryPipeline,
}

impl RagService {
    pub fn builder() -> RagServiceBuilder {
        RagServiceBuilder::default()
    }

    /// Assemble a service from environment-derived [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if a selected backend was not
    /// compiled in (cargo feature disabled) or cannot be constructed.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = embedder_from_settings(settings)?;
        let index = index_from_settings(settings)?;
        let language_model = language_model_from_settings(settings)?;

        info!(
            index = index.name(),
            backend = settings.index.label(),
            embedder = embedder.name(),
            model = language_model.name(),
            data_dir = %settings.data_dir.display(),
            "assembled RAG service"
        );

        Self::builder()
            .config(settings.rag.clone())
            .loader(Arc::new(DirectoryLoader::new(settings.data_dir.clone())))
            .embedder(embedder)
            .index(index)
            .language_model(language_model)
            .build()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Populate the index from the corpus unless it already holds vectors.
    pub async fn ingest_if_empty(&self) -> Result<IngestionReport> {
        self.ingestion.ingest_if_empty().await
    }

    pub async fn ingestion_state(&self) -> IngestionState {
        self.ingestion.state().await
    }

    /// Answer `question` given the prior conversation.
    pub async fn answer(&self, question: &str, history: &[ChatMessage]) -> Result<Answer> {
        self.query.answer(question, history).await
    }
}

/// Builder for [`RagService`].
///
/// `loader`, `embedder`, `index` and `language_model` are required. The
/// config, prompt template and no-context reply fall back to defaults.
#[derive(Default)]
pub struct RagServiceBuilder {
    config: Option<RagConfig>,
    loader: Option<Arc<dyn DocumentLoader>>,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Arc<dyn VectorIndex>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    template: Option<PromptTemplate>,
    no_context_reply: Option<String>,
}

impl RagServiceBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Reply with fixed text, without calling the model, when nothing
    /// relevant is retrieved.
    pub fn no_context_reply(mut self, reply: impl Into<String>) -> Self {
        self.no_context_reply = Some(reply.into());
        self
    }

    /// Build the [`RagService`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if a required field is missing or
    /// the config is inconsistent.
    pub fn build(self) -> Result<RagService> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let loader =
            self.loader.ok_or_else(|| RagError::InvalidConfig("loader is required".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::InvalidConfig("embedder is required".to_string()))?;
        let index =
            self.index.ok_or_else(|| RagError::InvalidConfig("index is required".to_string()))?;
        let language_model = self
            .language_model
            .ok_or_else(|| RagError::InvalidConfig("language_model is required".to_string()))?;

        let chunker = Arc::new(FixedSizeChunker::from_config(&config)?);
        let ingestion =
            IngestionPipeline::new(loader, chunker, Arc::clone(&embedder), Arc::clone(&index))
                .with_batch_size(config.embed_batch_size)
                .with_concurrency(config.ingest_concurrency);

        let mut options = QueryOptions::from_config(&config);
        options.no_context_reply = self.no_context_reply;
        let query = QueryPipeline::new(
            Retriever::new(embedder, Arc::clone(&index)),
            PromptAssembler::new(self.template.unwrap_or_default()),
            Generator::new(language_model),
            options,
        );

        Ok(RagService { config, index, ingestion, query })
    }
}

fn feature_missing(what: &str, feature: &str) -> RagError {
    RagError::InvalidConfig(format!(
        "{what} requires the `{feature}` feature of firstaid-rag, which is not enabled"
    ))
}

fn embedder_from_settings(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let embedding = &settings.embedding;
    match embedding.provider {
        #[cfg(feature = "huggingface")]
        EmbeddingProvider::HuggingFace => {
            let mut embedder = crate::huggingface::HuggingFaceEmbedder::new(&embedding.api_key)?;
            if let Some(model) = &embedding.model {
                embedder = embedder.with_model(model, embedding.dimensions);
            }
            Ok(Arc::new(crate::embedding::RetryingEmbedder::new(embedder)))
        }
        #[cfg(not(feature = "huggingface"))]
        EmbeddingProvider::HuggingFace => {
            Err(feature_missing("the Hugging Face embedder", "huggingface"))
        }
        #[cfg(feature = "openai")]
        EmbeddingProvider::OpenAi => {
            let mut embedder = crate::openai::OpenAiEmbedder::new(&embedding.api_key)?
                .with_dimensions(embedding.dimensions);
            if let Some(model) = &embedding.model {
                embedder = embedder.with_model(model);
            }
            Ok(Arc::new(crate::embedding::RetryingEmbedder::new(embedder)))
        }
        #[cfg(not(feature = "openai"))]
        EmbeddingProvider::OpenAi => Err(feature_missing("the OpenAI embedder", "openai")),
    }
}

fn index_from_settings(settings: &Settings) -> Result<Arc<dyn VectorIndex>> {
    match &settings.index {
        IndexBackend::InMemory => Ok(Arc::new(InMemoryVectorIndex::new(&settings.index_name))),
        #[cfg(feature = "pinecone")]
        IndexBackend::Pinecone { api_key, host, namespace } => {
            let mut index = crate::pinecone::PineconeIndex::new(api_key, &settings.index_name)?;
            if let Some(host) = host {
                index = index.with_host(host);
            }
            if let Some(namespace) = namespace {
                index = index.with_namespace(namespace);
            }
            Ok(Arc::new(index))
        }
        #[cfg(not(feature = "pinecone"))]
        IndexBackend::Pinecone { .. } => Err(feature_missing("the Pinecone index", "pinecone")),
        #[cfg(feature = "qdrant")]
        IndexBackend::Qdrant { url } => {
            Ok(Arc::new(crate::qdrant::QdrantIndex::new(url, &settings.index_name)?))
        }
        #[cfg(not(feature = "qdrant"))]
        IndexBackend::Qdrant { .. } => Err(feature_missing("the Qdrant index", "qdrant")),
    }
}

#[cfg(feature = "openai")]
fn language_model_from_settings(settings: &Settings) -> Result<Arc<dyn LanguageModel>> {
    use crate::chat::{ChatConfig, OpenAiCompatibleChat};

    let llm = &settings.llm;
    let mut config = ChatConfig::openrouter(&llm.api_key);
    if let Some(base_url) = &llm.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(model) = &llm.model {
        config = config.with_model(model);
    }
    Ok(Arc::new(OpenAiCompatibleChat::new(config)?))
}

#[cfg(not(feature = "openai"))]
fn language_model_from_settings(_settings: &Settings) -> Result<Arc<dyn LanguageModel>> {
    Err(feature_missing("the chat model client", "openai"))
}
