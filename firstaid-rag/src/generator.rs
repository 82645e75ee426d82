//! Language model trait and grounded answer generation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::document::ScoredChunk;
use crate::error::Result;
use crate::prompt::GenerationRequest;

/// The author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A chat-completion backend.
///
/// Implementations make exactly one attempt per call and report failures as
/// [`RagError::GenerationServiceError`](crate::RagError::GenerationServiceError).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// The model identifier, used in logs.
    fn name(&self) -> &str;

    /// Complete the conversation and return the assistant's reply.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// A generated answer and the passages it was conditioned on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// The reply text.
    pub text: String,
    /// The passages given to the model, in citation-marker order.
    pub sources: Vec<ScoredChunk>,
    /// `false` when no relevant context was found and the reply is the
    /// "no information" path.
    pub grounded: bool,
}

impl Answer {
    /// An answer that states no relevant information was found.
    pub fn not_found(text: impl Into<String>) -> Self {
        Self { text: text.into(), sources: Vec::new(), grounded: false }
    }
}

/// Sends assembled requests to a [`LanguageModel`].
///
/// The answer's sources are taken from the request, which already knows
/// which passages were supplied; they are never parsed out of the reply.
#[derive(Clone)]
pub struct Generator {
    model: Arc<dyn LanguageModel>,
}

impl Generator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Generate an answer for the request. One attempt, no retries.
    pub async fn generate(&self, request: GenerationRequest) -> Result<Answer> {
        let grounded = request.is_grounded();
        let text = self.model.complete(&request.messages).await.inspect_err(|e| {
            error!(model = self.model.name(), error = %e, "generation failed");
        })?;

        info!(
            model = self.model.name(),
            grounded,
            source_count = request.sources.len(),
            answer_len = text.len(),
            "generated answer"
        );

        Ok(Answer { text, sources: request.sources, grounded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }

    #[test]
    fn not_found_answer_has_no_sources() {
        let answer = Answer::not_found("nothing");
        assert!(!answer.grounded);
        assert!(answer.sources.is_empty());
    }
}
