//! OpenAI-compatible chat completion client

use crate::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Default HTTP timeout for chat requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// One message of a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system" or "user"
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Build a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    /// Build a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// A chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model name
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Hard cap on generated tokens
    pub max_tokens: u32,
    /// Response format forwarded verbatim (e.g. `{"type": "json_object"}`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

/// Completion output relevant to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    /// Generated text
    pub content: String,
    /// Finish reason from the host ("stop", "length", ...)
    pub finish_reason: Option<String>,
}

impl ChatOutcome {
    /// Whether generation was cut off by the token limit
    pub fn truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Chat completion transport
///
/// Implemented by [`OpenAiChatClient`] for real hosts and by
/// [`crate::mock::MockChatApi`] in tests.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Execute one chat completion
    async fn complete(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError>;
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible `/chat/completions` host
pub struct OpenAiChatClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChatClient {
    /// Create a client for the given base URL (e.g. `http://localhost:9003/v1`)
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_timeout(base_url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with an explicit HTTP timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }
}

#[async_trait]
impl ChatApi for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Communication(format!("chat request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotAvailable(request.model));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(LlmError::Api {
                kind: "chat",
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("chat response parse: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("chat response had no choices".to_string()))?;

        Ok(ChatOutcome {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }
}
