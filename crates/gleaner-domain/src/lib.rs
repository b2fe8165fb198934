//! Gleaner Domain Layer
//!
//! Core data model for the knowledge-extraction pipeline. This crate defines
//! the entities every other layer operates on and the validation rules that
//! hold between them; infrastructure (Redis, Qdrant, SQLite, browsers) lives
//! in the other crates.
//!
//! ## Key Concepts
//!
//! - **Project**: owns sources and extractions, carries the extraction schema
//! - **FieldGroup / FieldDefinition**: a named bundle of typed fields that
//!   constitutes one schematic extraction over a source
//! - **Source**: a fetched document, grouped under a coarse source group
//! - **Extraction**: one persisted payload for a (source, field group) pair
//! - **Entity**: a normalised cross-document value linked to many extractions
//! - **Job**: a unit of background work with a resumable checkpoint
//! - **LlmRequest / LlmResponse**: the queue wire messages, typed per request
//!   kind rather than as opaque maps

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod deadletter;
pub mod entity;
pub mod error;
pub mod extraction;
pub mod job;
pub mod message;
pub mod project;
pub mod source;
pub mod value;

// Re-exports for convenience
pub use deadletter::{DeadLetter, DeadLetterKind};
pub use entity::{Entity, EntityLink};
pub use error::DomainError;
pub use extraction::Extraction;
pub use job::{Checkpoint, Job, JobKind, JobStatus};
pub use message::{LlmRequest, LlmResponse, PromptSpec, RequestPayload, ResponseStatus};
pub use project::{
    ClassificationConfig, EntityTypeDecl, ExtractionSchema, FieldDefinition, FieldGroup,
    FieldType, Project,
};
pub use source::{Source, SourceKind, SourceStatus};
pub use value::{canonical_json, FieldValue};
