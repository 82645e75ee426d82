//! Error types for the `firstaid-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in RAG operations.
///
/// Each variant maps to one [`ErrorKind`] so that callers (a CLI, a web UI)
/// can render a distinct message per failure class without matching on
/// message text.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad parameters or missing credentials. Fatal at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The caller passed an unusable argument (e.g. an empty question).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A corpus file or directory could not be read.
    #[error("Failed to load document {}: {message}", path.display())]
    DocumentLoadError {
        /// The file or directory that failed.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The embedding backend failed (network, quota, malformed response).
    #[error("Embedding service error ({provider}): {message}")]
    EmbeddingServiceError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector index could not be reached or rejected the request.
    #[error("Vector index unavailable ({backend}): {message}")]
    IndexUnavailable {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model backend failed (network, auth, rate limit).
    #[error("Generation service error ({provider}): {message}")]
    GenerationServiceError {
        /// The language model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },
}

/// The failure class of a [`RagError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfig,
    InvalidInput,
    DocumentLoad,
    EmbeddingService,
    IndexUnavailable,
    GenerationService,
}

impl ErrorKind {
    /// Whether the failure originated in a network service and may succeed on a later attempt.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::EmbeddingService | Self::IndexUnavailable | Self::GenerationService)
    }
}

impl RagError {
    /// Return the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::DocumentLoadError { .. } => ErrorKind::DocumentLoad,
            Self::EmbeddingServiceError { .. } => ErrorKind::EmbeddingService,
            Self::IndexUnavailable { .. } => ErrorKind::IndexUnavailable,
            Self::GenerationServiceError { .. } => ErrorKind::GenerationService,
        }
    }

    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingServiceError { provider: provider.into(), message: message.into() }
    }

    pub(crate) fn index(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IndexUnavailable { backend: backend.into(), message: message.into() }
    }

    #[cfg(feature = "openai")]
    pub(crate) fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationServiceError { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
