//! Gleaner LLM Queue Layer
//!
//! Redis-backed request queue for LLM work. Requests live in a stream read
//! through a consumer group (at-least-once); responses are written to keys
//! with a TTL and announced on a per-request pub/sub channel. Waiters both
//! subscribe and poll, so a missed notification never hangs a caller.
//!
//! The worker consumes the stream, executes chat completions, retries or
//! dead-letters failures, and adapts its own parallelism to the observed
//! timeout rate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod dlq;
pub mod queue;
pub mod worker;

pub use client::QueueLlmClient;
pub use dlq::{DlqService, DlqStats};
pub use queue::{BackpressureStatus, LlmQueue, QueueConfig, QueueHealth};
pub use worker::{LlmWorker, WorkerConfig};

use thiserror::Error;

/// Errors from queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    /// Queue depth reached `max_queue_depth`; the caller must back off
    #[error("queue depth {depth} exceeds max {max_depth}")]
    QueueFull {
        /// Depth observed at submit time
        depth: u64,
        /// Configured maximum
        max_depth: u64,
    },

    /// No response arrived for the request within the caller's timeout
    #[error("request {request_id} timed out after {timeout_secs}s")]
    RequestTimeout {
        /// Correlation id that never resolved
        request_id: String,
        /// The timeout that elapsed
        timeout_secs: u64,
    },

    /// The worker answered with an error or timeout response
    #[error("request {request_id} failed: {error}")]
    RequestFailed {
        /// Correlation id of the failed request
        request_id: String,
        /// Error carried by the response
        error: String,
    },

    /// Redis transport error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failure from the chat or embedding transport
    #[error(transparent)]
    Llm(#[from] gleaner_llm::LlmError),

    /// Malformed message on the wire
    #[error("message decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
