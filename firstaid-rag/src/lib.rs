//! # firstaid-rag
//!
//! Retrieval-augmented question answering over a first-aid knowledge base.
//!
//! Documents are split into overlapping passages, embedded, and stored in a
//! vector index. Questions are embedded, matched against the index, filtered
//! by a relevance threshold, and answered by a language model that is told
//! to use only the retrieved passages and to cite them.
//!
//! ## Components
//!
//! | Trait / type | Role |
//! |--------------|------|
//! | [`Chunker`] | split text into passages ([`FixedSizeChunker`]) |
//! | [`DocumentLoader`] | read a corpus ([`DirectoryLoader`]) |
//! | [`Embedder`] | text → vector ([`RetryingEmbedder`] adds backoff) |
//! | [`VectorIndex`] | store and search vectors ([`InMemoryVectorIndex`]) |
//! | [`Retriever`] | query embedding + search + threshold |
//! | [`PromptAssembler`] | grounded or no-context prompt |
//! | [`LanguageModel`] / [`Generator`] | produce the [`Answer`] |
//! | [`IngestionPipeline`] / [`QueryPipeline`] | the two workflows |
//! | [`RagService`] | facade: `ingest_if_empty` and `answer` |
//!
//! ## Features
//!
//! - `openai`: [`OpenAiEmbedder`](openai::OpenAiEmbedder) and the
//!   OpenAI-compatible chat client ([`chat`]), which defaults to DeepSeek via OpenRouter
//! - `huggingface`: [`HuggingFaceEmbedder`](huggingface::HuggingFaceEmbedder)
//! - `pinecone`: [`PineconeIndex`](pinecone::PineconeIndex)
//! - `qdrant`: [`QdrantIndex`](qdrant::QdrantIndex)
//! - `pdf`: PDF text extraction in [`DirectoryLoader`]
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use firstaid_rag::{RagService, Settings};
//!
//! let service = RagService::from_settings(&Settings::from_env()?)?;
//! service.ingest_if_empty().await?;
//! let answer = service.answer("How do I treat a minor burn?", &[]).await?;
//! println!("{}", answer.text);
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod index;
pub mod ingestion;
pub mod inmemory;
pub mod loader;
pub mod prompt;
pub mod query;
pub mod retriever;
pub mod service;
pub mod settings;

#[cfg(feature = "openai")]
pub mod chat;
#[cfg(feature = "huggingface")]
pub mod huggingface;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pinecone")]
pub mod pinecone;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{Chunker, FixedSizeChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, IndexEntry, RetrievalResult, ScoredChunk};
pub use embedding::{Embedder, RetryPolicy, RetryingEmbedder};
pub use error::{ErrorKind, RagError, Result};
pub use generator::{Answer, ChatMessage, Generator, LanguageModel, Role};
pub use index::VectorIndex;
pub use ingestion::{IngestionPipeline, IngestionReport, IngestionState};
pub use inmemory::InMemoryVectorIndex;
pub use loader::{DirectoryLoader, DocumentLoader, FileKind};
pub use prompt::{GenerationRequest, PromptAssembler, PromptTemplate, PromptTemplateConfig};
pub use query::{QueryOptions, QueryPipeline};
pub use retriever::Retriever;
pub use service::{RagService, RagServiceBuilder};
pub use settings::Settings;
