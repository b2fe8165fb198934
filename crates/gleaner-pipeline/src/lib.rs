//! Gleaner Pipeline Layer
//!
//! Composes the extraction flow: classify → orchestrate → deduplicate →
//! persist → embed → link entities, with chunked checkpointing for the
//! schema path and per-fact error isolation for the generic path. Also home
//! to the entity extractor, the extraction job worker, the shutdown manager,
//! and process-local metrics and alerting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alerting;
pub mod entities;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod shutdown;
pub mod worker;

pub use alerting::{AlertFormat, AlertSink};
pub use entities::{normalize_entity_value, CandidateEntity, EntityCandidates, EntityExtractor};
pub use metrics::PipelineMetrics;
pub use pipeline::{BatchPipelineResult, ExtractionPipeline, PipelineConfig, PipelineResult};
pub use schema::{ExtractProjectOptions, ProjectExtractionSummary, SchemaPipeline};
pub use shutdown::ShutdownManager;
pub use worker::ExtractionWorker;

use thiserror::Error;
use uuid::Uuid;

/// Errors from the pipeline layer
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Storage failure
    #[error(transparent)]
    Store(#[from] gleaner_store::StoreError),

    /// Extraction-layer failure
    #[error(transparent)]
    Extractor(#[from] gleaner_extractor::ExtractorError),

    /// Queue failure
    #[error(transparent)]
    Queue(#[from] gleaner_queue::QueueError),

    /// LLM transport failure
    #[error(transparent)]
    Llm(#[from] gleaner_llm::LlmError),

    /// Job payload is missing a required field
    #[error("job payload missing required field '{0}'")]
    MissingPayloadField(&'static str),

    /// Referenced project does not exist
    #[error("project not found: {0}")]
    ProjectNotFound(Uuid),

    /// Referenced job does not exist
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// The project has no usable extraction schema
    #[error("project {0} has no extraction schema")]
    SchemaMissing(Uuid),

    /// The job was cancelled before completion
    #[error("job cancelled")]
    Cancelled,
}
