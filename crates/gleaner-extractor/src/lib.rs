//! Gleaner Extraction Layer
//!
//! Turns source documents into structured payloads: a header-aware markdown
//! chunker, prompt builders, the schema orchestrator that fans each field
//! group out over all chunks and merges the results, the generic fact
//! orchestrator, and the smart classifier that decides which field groups a
//! page deserves.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunking;
pub mod classifier;
pub mod config;
pub mod facts;
pub mod orchestrator;
pub mod prompt;

pub use chunking::{Chunk, MarkdownChunker};
pub use classifier::{ClassificationMethod, ClassifierConfig, SmartClassification, SmartClassifier};
pub use config::ExtractorConfig;
pub use facts::{ExtractedFact, ExtractionProfile, FactExtractionResult, FactExtractor, FactOrchestrator};
pub use orchestrator::{GroupExtractor, GroupResult, SchemaOrchestrator};

use thiserror::Error;

/// Errors from the extraction layer
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// LLM transport or queue failure
    #[error("LLM error: {0}")]
    Llm(String),

    /// One chunk of one group failed after all retries
    #[error("chunk {chunk} of group '{group}' failed after {attempts} attempts: {detail}")]
    ChunkFailed {
        /// Field group being extracted
        group: String,
        /// Chunk index
        chunk: usize,
        /// Attempts made
        attempts: u32,
        /// Final error
        detail: String,
    },

    /// The model returned a payload we could not interpret
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Embedding-cache failure (classification degrades, never blocks)
    #[error("classification cache error: {0}")]
    Cache(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<gleaner_queue::QueueError> for ExtractorError {
    fn from(e: gleaner_queue::QueueError) -> Self {
        ExtractorError::Llm(e.to_string())
    }
}

impl From<gleaner_llm::LlmError> for ExtractorError {
    fn from(e: gleaner_llm::LlmError) -> Self {
        ExtractorError::Llm(e.to_string())
    }
}
