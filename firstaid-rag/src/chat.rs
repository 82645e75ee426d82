//! OpenAI-compatible chat completion client.
//!
//! Works with any server that implements `POST /chat/completions`
//! (OpenRouter, DeepSeek, OpenAI, vLLM, Ollama). Only available with the
//! `openai` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use firstaid_rag::chat::{ChatConfig, OpenAiCompatibleChat};
//!
//! let model = OpenAiCompatibleChat::new(ChatConfig::openrouter(api_key))?;
//! let reply = model.complete(&messages).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generator::{ChatMessage, LanguageModel};
use crate::openai::ErrorResponse;

/// OpenRouter's OpenAI-compatible API base.
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "deepseek/deepseek-chat";

/// Connection and sampling settings for [`OpenAiCompatibleChat`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Sampling temperature; 0 keeps first-aid answers deterministic and precise.
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    /// Extra headers sent with every request (e.g. OpenRouter's `HTTP-Referer`, `X-Title`).
    pub headers: Vec<(String, String)>,
}

impl ChatConfig {
    /// Configuration for an arbitrary OpenAI-compatible server.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
        }
    }

    /// DeepSeek chat through OpenRouter, with attribution headers.
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new(api_key, OPENROUTER_API_BASE, DEFAULT_CHAT_MODEL)
            .with_header("HTTP-Referer", "http://localhost:8501")
            .with_header("X-Title", "First-Aid Chatbot")
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A [`LanguageModel`] speaking the OpenAI chat-completions protocol over `reqwest`.
pub struct OpenAiCompatibleChat {
    client: reqwest::Client,
    config: ChatConfig,
}

impl OpenAiCompatibleChat {
    /// Build the HTTP client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if the API key is empty or a
    /// header name/value is invalid.
    pub fn new(config: ChatConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(RagError::InvalidConfig("chat API key must not be empty".into()));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RagError::InvalidConfig(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| RagError::InvalidConfig(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }
}

// ── Chat completions request/response types ────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleChat {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let provider = self.config.model.as_str();
        debug!(model = provider, message_count = messages.len(), "sending chat completion");

        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(model = provider, error = %e, "request failed");
                RagError::generation(provider, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(model = provider, %status, "API error");
            return Err(RagError::generation(provider, format!("API returned {status}: {detail}")));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            error!(model = provider, error = %e, "failed to parse response");
            RagError::generation(provider, format!("failed to parse response: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| RagError::generation(provider, "response contained no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openrouter_defaults() {
        let config = ChatConfig::openrouter("sk-or-test");
        assert_eq!(config.base_url, OPENROUTER_API_BASE);
        assert_eq!(config.model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.temperature, 0.0);
        assert!(config.headers.iter().any(|(k, _)| k == "X-Title"));
    }

    #[test]
    fn empty_key_is_rejected() {
        let config = ChatConfig::new("", OPENROUTER_API_BASE, DEFAULT_CHAT_MODEL);
        assert!(matches!(OpenAiCompatibleChat::new(config), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let config = ChatConfig::openrouter("k").with_header("bad header", "v");
        assert!(OpenAiCompatibleChat::new(config).is_err());
    }

    #[test]
    fn request_serializes_messages() {
        let messages = [ChatMessage::system("s"), ChatMessage::user("u")];
        let body = CompletionRequest { model: "m", messages: &messages, temperature: 0.0, max_tokens: None };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("max_tokens").is_none());
    }
}
