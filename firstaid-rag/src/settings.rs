//! Service-level settings loaded from the environment.
//!
//! Credentials and backend selection come from environment variables (the
//! CLI loads `.env` first). Everything is validated up front so a missing key
//! fails at startup with [`RagError::InvalidConfig`] naming the variable,
//! rather than on the first request.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::RagConfig;
use crate::error::{RagError, Result};

pub const DEFAULT_INDEX_NAME: &str = "medical-chatbot-1";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Which [`VectorIndex`](crate::VectorIndex) backend to use.
#[derive(Clone, PartialEq, Eq)]
pub enum IndexBackend {
    InMemory,
    Pinecone { api_key: String, host: Option<String>, namespace: Option<String> },
    Qdrant { url: String },
}

impl IndexBackend {
    pub fn label(&self) -> &'static str {
        match self {
            Self::InMemory => "memory",
            Self::Pinecone { .. } => "pinecone",
            Self::Qdrant { .. } => "qdrant",
        }
    }
}

/// Hosted embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    HuggingFace,
    OpenAi,
}

impl FromStr for EmbeddingProvider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "openai" => Ok(Self::OpenAi),
            other => Err(RagError::InvalidConfig(format!(
                "FIRSTAID_EMBEDDER must be 'huggingface' or 'openai', got '{other}'"
            ))),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub api_key: String,
    /// Provider default when `None`.
    pub model: Option<String>,
    pub dimensions: usize,
}

#[derive(Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub api_key: String,
    /// OpenRouter when `None`.
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Everything needed to assemble a [`RagService`](crate::RagService).
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub index_name: String,
    pub data_dir: PathBuf,
    pub index: IndexBackend,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub rag: RagConfig,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `OPENROUTER_API_KEY` | chat model key (required) |
    /// | `FIRSTAID_LLM_BASE_URL`, `FIRSTAID_CHAT_MODEL` | chat endpoint / model overrides |
    /// | `FIRSTAID_INDEX_BACKEND` | `pinecone` (default), `qdrant`, `memory` |
    /// | `PINECONE_API_KEY`, `PINECONE_INDEX_HOST`, `PINECONE_NAMESPACE` | Pinecone access |
    /// | `QDRANT_URL` | Qdrant gRPC endpoint |
    /// | `FIRSTAID_EMBEDDER` | `huggingface` or `openai`; inferred from the keys when unset |
    /// | `HF_API_TOKEN`, `OPENAI_API_KEY` | embedding keys |
    /// | `FIRSTAID_EMBEDDING_MODEL`, `FIRSTAID_EMBEDDING_DIMENSIONS` | embedding overrides |
    /// | `FIRSTAID_INDEX_NAME`, `FIRSTAID_DATA_DIR` | index name, corpus directory |
    /// | `FIRSTAID_CHUNK_SIZE`, `FIRSTAID_CHUNK_OVERLAP`, `FIRSTAID_TOP_K`, `FIRSTAID_SIMILARITY_THRESHOLD` | retrieval tuning |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                RagError::InvalidConfig(format!("environment variable {key} is not set"))
            })
        };

        let llm = LlmSettings {
            api_key: require("OPENROUTER_API_KEY")?,
            base_url: get("FIRSTAID_LLM_BASE_URL"),
            model: get("FIRSTAID_CHAT_MODEL"),
        };

        let index = match get("FIRSTAID_INDEX_BACKEND").as_deref().unwrap_or("pinecone") {
            "pinecone" => IndexBackend::Pinecone {
                api_key: require("PINECONE_API_KEY")?,
                host: get("PINECONE_INDEX_HOST"),
                namespace: get("PINECONE_NAMESPACE"),
            },
            "qdrant" => IndexBackend::Qdrant {
                url: get("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            },
            "memory" | "inmemory" => IndexBackend::InMemory,
            other => {
                return Err(RagError::InvalidConfig(format!(
                    "FIRSTAID_INDEX_BACKEND must be 'pinecone', 'qdrant' or 'memory', got '{other}'"
                )));
            }
        };

        let provider = match get("FIRSTAID_EMBEDDER") {
            Some(name) => name.parse()?,
            None if get("HF_API_TOKEN").is_some() => EmbeddingProvider::HuggingFace,
            None if get("OPENAI_API_KEY").is_some() => EmbeddingProvider::OpenAi,
            None => {
                return Err(RagError::InvalidConfig(
                    "set HF_API_TOKEN or OPENAI_API_KEY for embeddings".into(),
                ));
            }
        };
        let api_key = match provider {
            EmbeddingProvider::HuggingFace => require("HF_API_TOKEN")?,
            EmbeddingProvider::OpenAi => require("OPENAI_API_KEY")?,
        };
        let embedding = EmbeddingSettings {
            provider,
            api_key,
            model: get("FIRSTAID_EMBEDDING_MODEL"),
            dimensions: parse_var(&get, "FIRSTAID_EMBEDDING_DIMENSIONS")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
        };

        let defaults = RagConfig::default();
        let rag = RagConfig::builder()
            .chunk_size(parse_var(&get, "FIRSTAID_CHUNK_SIZE")?.unwrap_or(defaults.chunk_size))
            .chunk_overlap(
                parse_var(&get, "FIRSTAID_CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            )
            .top_k(parse_var(&get, "FIRSTAID_TOP_K")?.unwrap_or(defaults.top_k))
            .similarity_threshold(
                parse_var(&get, "FIRSTAID_SIMILARITY_THRESHOLD")?
                    .unwrap_or(defaults.similarity_threshold),
            )
            .build()?;

        Ok(Self {
            index_name: get("FIRSTAID_INDEX_NAME").unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            data_dir: get("FIRSTAID_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            index,
            embedding,
            llm,
            rag,
        })
    }

    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| RagError::InvalidConfig(format!("{key}='{raw}' is invalid: {e}")))
        })
        .transpose()
}

// Keys never reach logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("index_name", &self.index_name)
            .field("data_dir", &self.data_dir)
            .field("index", &self.index.label())
            .field("embedding", &self.embedding.provider)
            .field("embedding_model", &self.embedding.model)
            .field("chat_model", &self.llm.model)
            .field("rag", &self.rag)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("OPENROUTER_API_KEY", "sk-or"),
        ("PINECONE_API_KEY", "pc-key"),
        ("HF_API_TOKEN", "hf-token"),
    ];

    #[test]
    fn defaults_follow_the_reference_deployment() {
        let settings = Settings::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(settings.index_name, DEFAULT_INDEX_NAME);
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.index.label(), "pinecone");
        assert_eq!(settings.embedding.provider, EmbeddingProvider::HuggingFace);
        assert_eq!(settings.embedding.dimensions, 384);
        assert_eq!(settings.rag, RagConfig::default());
    }

    #[test]
    fn missing_llm_key_names_the_variable() {
        let err = Settings::from_lookup(lookup(&[("PINECONE_API_KEY", "k"), ("HF_API_TOKEN", "t")]))
            .unwrap_err();
        assert!(matches!(&err, RagError::InvalidConfig(msg) if msg.contains("OPENROUTER_API_KEY")));
    }

    #[test]
    fn pinecone_requires_its_key() {
        let err = Settings::from_lookup(lookup(&[("OPENROUTER_API_KEY", "k"), ("HF_API_TOKEN", "t")]))
            .unwrap_err();
        assert!(matches!(&err, RagError::InvalidConfig(msg) if msg.contains("PINECONE_API_KEY")));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = Settings::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "   "),
            ("PINECONE_API_KEY", "k"),
            ("HF_API_TOKEN", "t"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }

    #[test]
    fn embedder_is_inferred_from_available_keys() {
        let settings = Settings::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "k"),
            ("FIRSTAID_INDEX_BACKEND", "memory"),
            ("OPENAI_API_KEY", "sk"),
        ]))
        .unwrap();
        assert_eq!(settings.embedding.provider, EmbeddingProvider::OpenAi);
        assert!(matches!(settings.index, IndexBackend::InMemory));
    }

    #[test]
    fn no_embedding_key_is_rejected() {
        let err = Settings::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "k"),
            ("FIRSTAID_INDEX_BACKEND", "memory"),
        ]))
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidConfig);
    }

    #[test]
    fn tuning_overrides_are_validated() {
        let mut vars = BASE.to_vec();
        vars.push(("FIRSTAID_TOP_K", "8"));
        vars.push(("FIRSTAID_SIMILARITY_THRESHOLD", "0.5"));
        let settings = Settings::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(settings.rag.top_k, 8);
        assert_eq!(settings.rag.similarity_threshold, 0.5);

        let mut bad = BASE.to_vec();
        bad.push(("FIRSTAID_TOP_K", "many"));
        assert!(Settings::from_lookup(lookup(&bad)).is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("FIRSTAID_INDEX_BACKEND", "faiss"));
        assert!(Settings::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn debug_output_hides_keys() {
        let settings = Settings::from_lookup(lookup(BASE)).unwrap();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("sk-or"));
        assert!(!rendered.contains("pc-key"));
    }
}
