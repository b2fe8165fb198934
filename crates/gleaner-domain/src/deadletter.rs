//! Dead-letter items
//!
//! Items that exhausted their retries land in a typed dead-letter store for
//! inspection and replay instead of being dropped.

use crate::message::LlmRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which queue an item died in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadLetterKind {
    /// Failed page fetch
    Scrape,
    /// Failed source extraction
    Extraction,
    /// LLM request that failed after max retries
    Llm,
}

impl DeadLetterKind {
    /// Lowercase name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterKind::Scrape => "scrape",
            DeadLetterKind::Extraction => "extraction",
            DeadLetterKind::Llm => "llm",
        }
    }
}

/// A dead-letter entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dlq_type", rename_all = "lowercase")]
pub enum DeadLetter {
    /// A scrape that gave up on a source
    Scrape {
        /// Entry id for replay addressing
        id: Uuid,
        /// The source that failed
        source_id: Uuid,
        /// Owning job, when known
        #[serde(default)]
        job_id: Option<Uuid>,
        /// Error message
        error: String,
        /// When the final attempt failed
        failed_at: DateTime<Utc>,
        /// Retries attempted before giving up
        retry_count: u32,
    },
    /// An extraction that gave up on a source
    Extraction {
        /// Entry id for replay addressing
        id: Uuid,
        /// The source that failed
        source_id: Uuid,
        /// Owning job, when known
        #[serde(default)]
        job_id: Option<Uuid>,
        /// Error message
        error: String,
        /// When the final attempt failed
        failed_at: DateTime<Utc>,
        /// Retries attempted before giving up
        retry_count: u32,
    },
    /// An LLM request that failed after max retries
    Llm {
        /// Entry id for replay addressing
        id: Uuid,
        /// The full failed request, replayable with a reset retry counter
        request: LlmRequest,
        /// Error message from the final attempt
        error: String,
        /// When the final attempt failed
        failed_at: DateTime<Utc>,
        /// Worker that gave up on the request
        worker_id: String,
    },
}

impl DeadLetter {
    /// Entry id
    pub fn id(&self) -> Uuid {
        match self {
            DeadLetter::Scrape { id, .. }
            | DeadLetter::Extraction { id, .. }
            | DeadLetter::Llm { id, .. } => *id,
        }
    }

    /// Which queue this entry belongs to
    pub fn kind(&self) -> DeadLetterKind {
        match self {
            DeadLetter::Scrape { .. } => DeadLetterKind::Scrape,
            DeadLetter::Extraction { .. } => DeadLetterKind::Extraction,
            DeadLetter::Llm { .. } => DeadLetterKind::Llm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{PromptSpec, RequestPayload};

    #[test]
    fn test_llm_dead_letter_round_trip() {
        let request = LlmRequest::new(
            RequestPayload::Complete {
                prompts: PromptSpec::default(),
                response_format: None,
                temperature: None,
            },
            60,
        );
        let entry = DeadLetter::Llm {
            id: Uuid::new_v4(),
            request,
            error: "model unavailable".to_string(),
            failed_at: Utc::now(),
            worker_id: "worker-1".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: DeadLetter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.kind(), DeadLetterKind::Llm);
    }
}
