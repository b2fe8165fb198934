//! Queue-mode LLM client
//!
//! Submit-and-wait facade over the queue for callers that want one answer
//! per request: the orchestrator (field groups), the entity extractor, and
//! report smart-merge (completions).

use crate::queue::LlmQueue;
use crate::QueueError;
use gleaner_domain::{LlmRequest, PromptSpec, RequestPayload, ResponseStatus};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Client that resolves LLM requests through the queue
#[derive(Clone)]
pub struct QueueLlmClient {
    queue: LlmQueue,
    /// Lifetime stamped into `timeout_at`, seconds
    request_timeout_secs: i64,
    /// How long callers block on the response
    wait_timeout: Duration,
}

impl QueueLlmClient {
    /// Build a client over an existing queue
    pub fn new(queue: LlmQueue, request_timeout_secs: i64) -> Self {
        Self {
            queue,
            request_timeout_secs,
            wait_timeout: Duration::from_secs(request_timeout_secs.max(0) as u64),
        }
    }

    /// The underlying queue (for backpressure checks)
    pub fn queue(&self) -> &LlmQueue {
        &self.queue
    }

    /// Submit a payload and block until its response resolves
    ///
    /// Error and timeout responses surface as [`QueueError::RequestFailed`];
    /// the caller decides whether that fails a fact, a chunk, or a column.
    pub async fn request(&self, payload: RequestPayload) -> Result<Value, QueueError> {
        let request = LlmRequest::new(payload, self.request_timeout_secs);
        let request_id = self.queue.submit(&request).await?;
        let response = self.queue.wait_for_result(&request_id, self.wait_timeout).await?;

        match response.status {
            ResponseStatus::Success => {
                debug!(request_id = %request_id, "queued request resolved");
                Ok(response.result.unwrap_or(Value::Null))
            }
            ResponseStatus::Error | ResponseStatus::Timeout => Err(QueueError::RequestFailed {
                request_id,
                error: response
                    .error
                    .unwrap_or_else(|| "no error detail".to_string()),
            }),
        }
    }

    /// Convenience for `complete` requests with a JSON object response
    pub async fn complete_json(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<Value, QueueError> {
        self.request(RequestPayload::Complete {
            prompts: PromptSpec {
                system_prompt: Some(system_prompt.into()),
                user_prompt: Some(user_prompt.into()),
                model: None,
            },
            response_format: Some(serde_json::json!({"type": "json_object"})),
            temperature: None,
        })
        .await
    }
}
