//! Gleaner LLM Transport Layer
//!
//! HTTP clients for the OpenAI-compatible chat host and the embedding host
//! (embeddings + rerank), plus JSON repair for model output. The `ChatApi`
//! and `EmbeddingApi` traits are the seams the worker and pipeline depend on;
//! deterministic mock implementations live in [`mock`] for tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod embedding;
pub mod mock;
pub mod repair;

pub use chat::{ChatApi, ChatMessage, ChatOutcome, ChatRequest, OpenAiChatClient};
pub use embedding::{cosine_similarity, EmbeddingApi, EmbeddingClient, EMBEDDING_DIMENSION};
pub use mock::{MockChatApi, MockEmbeddingApi};
pub use repair::try_repair_json;

use thiserror::Error;

/// Errors from LLM and embedding transports
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network-level failure talking to the host
    #[error("LLM communication error: {0}")]
    Communication(String),

    /// The host rejected the request
    #[error("LLM API error ({kind}, status {status}): {message}")]
    Api {
        /// Coarse error class (e.g. "chat", "embedding", "rerank")
        kind: &'static str,
        /// HTTP status from the host
        status: u16,
        /// Response body or message
        message: String,
    },

    /// The configured model is unknown to the host
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// The host answered with something we could not use
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    /// Model output was not valid JSON and could not be repaired
    #[error("JSON repair failed ({context}): {detail}")]
    JsonRepair {
        /// Which request kind produced the output
        context: String,
        /// Parse error from the final attempt
        detail: String,
    },
}
