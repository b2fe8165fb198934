//! LLM queue wire messages
//!
//! Requests carry stable envelope fields plus a payload union tagged by the
//! request type; responses are keyed by the request id. Both serialise to the
//! JSON shapes the queue stores.

use crate::project::{EntityTypeDecl, FieldGroup};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Prompt fields shared by every request kind
///
/// The preferred path carries fully built prompts; when absent the worker
/// synthesises them from the payload's semantic fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    /// Pre-built system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Pre-built user prompt
    #[serde(default)]
    pub user_prompt: Option<String>,
    /// Model override; the worker's default model when absent
    #[serde(default)]
    pub model: Option<String>,
}

/// Typed request payload, tagged by request type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request_type", content = "payload", rename_all = "snake_case")]
pub enum RequestPayload {
    /// Generic fact extraction over a content chunk
    ExtractFacts {
        /// Prompt fields
        #[serde(flatten)]
        prompts: PromptSpec,
        /// Chunk content
        content: String,
        /// Fact categories of the active profile
        #[serde(default)]
        categories: Vec<String>,
        /// Profile name for provenance
        #[serde(default)]
        profile_name: String,
    },
    /// Schema extraction of one field group from one chunk
    ExtractFieldGroup {
        /// Prompt fields
        #[serde(flatten)]
        prompts: PromptSpec,
        /// Chunk content
        content: String,
        /// The field group being extracted
        field_group: FieldGroup,
        /// Source context (typically the source group / company name)
        #[serde(default)]
        source_context: String,
    },
    /// Entity extraction from an extraction payload
    ExtractEntities {
        /// Prompt fields
        #[serde(flatten)]
        prompts: PromptSpec,
        /// The extraction payload to mine for entities
        extraction_data: Value,
        /// Entity types the project declares
        #[serde(default)]
        entity_types: Vec<EntityTypeDecl>,
    },
    /// Arbitrary completion (report synthesis, smart merge)
    Complete {
        /// Prompt fields
        #[serde(flatten)]
        prompts: PromptSpec,
        /// Response format forwarded verbatim (e.g. `{"type": "json_object"}`)
        #[serde(default)]
        response_format: Option<Value>,
        /// Temperature override
        #[serde(default)]
        temperature: Option<f32>,
    },
}

impl RequestPayload {
    /// Wire name of the request type
    pub fn request_type(&self) -> &'static str {
        match self {
            RequestPayload::ExtractFacts { .. } => "extract_facts",
            RequestPayload::ExtractFieldGroup { .. } => "extract_field_group",
            RequestPayload::ExtractEntities { .. } => "extract_entities",
            RequestPayload::Complete { .. } => "complete",
        }
    }

    /// Prompt fields of whichever variant this is
    pub fn prompts(&self) -> &PromptSpec {
        match self {
            RequestPayload::ExtractFacts { prompts, .. }
            | RequestPayload::ExtractFieldGroup { prompts, .. }
            | RequestPayload::ExtractEntities { prompts, .. }
            | RequestPayload::Complete { prompts, .. } => prompts,
        }
    }
}

/// Request message submitted to the LLM queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Correlation id; responses are delivered under this key
    pub request_id: String,
    /// Typed payload (serialises as `request_type` + `payload`)
    #[serde(flatten)]
    pub payload: RequestPayload,
    /// Priority: 0 = low, 5 = normal, 10 = high
    pub priority: u8,
    /// When the request was created
    pub created_at: DateTime<Utc>,
    /// Past this instant the request is expired and must not be dispatched
    pub timeout_at: DateTime<Utc>,
    /// Times this request has been retried
    #[serde(default)]
    pub retry_count: u32,
}

impl LlmRequest {
    /// Normal priority
    pub const PRIORITY_NORMAL: u8 = 5;

    /// Create a request with a fresh correlation id and the given lifetime
    pub fn new(payload: RequestPayload, timeout_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            request_id: Uuid::new_v4().to_string(),
            payload,
            priority: Self::PRIORITY_NORMAL,
            created_at: now,
            timeout_at: now + Duration::seconds(timeout_secs),
            retry_count: 0,
        }
    }

    /// Whether the request has outlived its deadline
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.timeout_at
    }

    /// Copy of this request with the retry counter incremented
    pub fn with_retry(&self) -> Self {
        let mut next = self.clone();
        next.retry_count += 1;
        next
    }

    /// Serialise to the queue wire form
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("request serialises")
    }

    /// Parse from the queue wire form
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The model produced a usable result
    Success,
    /// The request failed after exhausting retries
    Error,
    /// The request expired before (or while) being processed
    Timeout,
}

/// Response message stored under the request id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Correlation id matching the request
    pub request_id: String,
    /// Outcome
    pub status: ResponseStatus,
    /// Extracted data on success
    #[serde(default)]
    pub result: Option<Value>,
    /// Error message on failure
    #[serde(default)]
    pub error: Option<String>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
    /// When processing completed
    pub completed_at: DateTime<Utc>,
}

impl LlmResponse {
    /// Build a success response
    pub fn success(request_id: impl Into<String>, result: Value, processing_time_ms: u64) -> Self {
        Self {
            request_id: request_id.into(),
            status: ResponseStatus::Success,
            result: Some(result),
            error: None,
            processing_time_ms,
            completed_at: Utc::now(),
        }
    }

    /// Build an error response
    pub fn error(request_id: impl Into<String>, error: impl Into<String>, processing_time_ms: u64) -> Self {
        Self {
            request_id: request_id.into(),
            status: ResponseStatus::Error,
            result: None,
            error: Some(error.into()),
            processing_time_ms,
            completed_at: Utc::now(),
        }
    }

    /// Build a timeout response
    pub fn timeout(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: ResponseStatus::Timeout,
            result: None,
            error: Some(error.into()),
            processing_time_ms: 0,
            completed_at: Utc::now(),
        }
    }

    /// Serialise to the stored wire form
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("response serialises")
    }

    /// Parse from the stored wire form
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_request() -> LlmRequest {
        LlmRequest::new(
            RequestPayload::Complete {
                prompts: PromptSpec {
                    system_prompt: Some("You reconcile values.".to_string()),
                    user_prompt: Some("Pick one.".to_string()),
                    model: None,
                },
                response_format: Some(json!({"type": "json_object"})),
                temperature: None,
            },
            300,
        )
    }

    #[test]
    fn test_request_wire_shape() {
        let request = complete_request();
        let value: Value = serde_json::from_str(&request.to_json()).unwrap();
        assert_eq!(value["request_type"], "complete");
        assert_eq!(value["payload"]["system_prompt"], "You reconcile values.");
        assert!(value["request_id"].is_string());
        assert_eq!(value["retry_count"], 0);
    }

    #[test]
    fn test_request_round_trip() {
        let request = complete_request();
        let parsed = LlmRequest::from_json(&request.to_json()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_unknown_request_type_rejected() {
        let raw = json!({
            "request_id": "r1",
            "request_type": "summarise",
            "payload": {},
            "priority": 5,
            "created_at": "2024-01-15T10:30:00Z",
            "timeout_at": "2024-01-15T10:35:00Z",
        });
        assert!(LlmRequest::from_json(&raw.to_string()).is_err());
    }

    #[test]
    fn test_expiry() {
        let mut request = complete_request();
        assert!(!request.is_expired());
        request.timeout_at = Utc::now() - Duration::seconds(1);
        assert!(request.is_expired());
    }

    #[test]
    fn test_with_retry_increments_only_counter() {
        let request = complete_request();
        let retried = request.with_retry();
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.request_id, request.request_id);
        assert_eq!(retried.timeout_at, request.timeout_at);
    }

    #[test]
    fn test_response_round_trip() {
        let response = LlmResponse::success("r1", json!({"facts": []}), 120);
        let parsed = LlmResponse::from_json(&response.to_json()).unwrap();
        assert_eq!(parsed, response);
        assert_eq!(parsed.status, ResponseStatus::Success);
    }
}
