//! Question answering: retrieve → assemble → generate.

use tracing::{info, instrument};

use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::generator::{Answer, ChatMessage, Generator};
use crate::prompt::PromptAssembler;
use crate::retriever::Retriever;

/// Per-pipeline query settings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Candidates requested from the index.
    pub top_k: usize,
    /// Minimum similarity for a candidate to be used as context.
    pub min_score: f32,
    /// When set, returned verbatim (without calling the model) if retrieval
    /// finds nothing relevant.
    pub no_context_reply: Option<String>,
}

impl QueryOptions {
    pub fn from_config(config: &RagConfig) -> Self {
        Self { top_k: config.top_k, min_score: config.similarity_threshold, no_context_reply: None }
    }

    pub fn with_no_context_reply(mut self, reply: impl Into<String>) -> Self {
        self.no_context_reply = Some(reply.into());
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

/// Answers questions from the knowledge base.
///
/// Stateless per call; the conversation history is supplied by the caller.
/// Failures keep their kind: an embedding failure is never reported as a
/// generation failure or turned into an answer.
pub struct QueryPipeline {
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: Generator,
    options: QueryOptions,
}

impl QueryPipeline {
    pub fn new(
        retriever: Retriever,
        assembler: PromptAssembler,
        generator: Generator,
        options: QueryOptions,
    ) -> Self {
        Self { retriever, assembler, generator, options }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Answer `question` given the prior conversation.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] for an empty question
    /// - [`RagError::EmbeddingServiceError`], [`RagError::IndexUnavailable`],
    ///   [`RagError::GenerationServiceError`] from the respective stage
    #[instrument(skip_all, fields(question_len = question.len(), history_len = history.len()))]
    pub async fn answer(&self, question: &str, history: &[ChatMessage]) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".into()));
        }

        let retrieval =
            self.retriever.retrieve(question, self.options.top_k, self.options.min_score).await?;

        if retrieval.is_empty() {
            info!("no relevant context found");
            if let Some(reply) = &self.options.no_context_reply {
                return Ok(Answer::not_found(reply.clone()));
            }
        }

        let request = self.assembler.assemble(question, &retrieval, history);
        self.generator.generate(request).await
    }
}
