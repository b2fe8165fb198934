//! Gleaner Storage Layer
//!
//! Persistence for the pipeline: a SQLite metadata store holding projects,
//! sources, extractions, entities, and jobs; the `VectorStore` contract with
//! a Qdrant implementation (1024-d cosine points keyed by extraction id); and
//! the vector-similarity deduplicator.
//!
//! The metadata store exposes explicit chunk transactions so a batch of
//! extractions and the checkpoint that records them commit atomically.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dedup;
pub mod meta;
pub mod qdrant;
pub mod vector;

pub use dedup::{DeduplicationResult, Deduplicator, DEFAULT_DEDUP_THRESHOLD};
pub use meta::MetaStore;
pub use qdrant::QdrantStore;
pub use vector::{MemoryVectorStore, SearchHit, VectorFilter, VectorPayload, VectorStore};

use thiserror::Error;

/// Errors from the storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Vector store backend error
    #[error("vector store error: {0}")]
    Vector(String),

    /// Embedding transport failure during dedup
    #[error(transparent)]
    Embedding(#[from] gleaner_llm::LlmError),

    /// Row referenced something that does not exist
    #[error("{what} not found: {id}")]
    NotFound {
        /// Kind of object looked up
        what: &'static str,
        /// Identifier used
        id: String,
    },

    /// A stored row failed to decode
    #[error("corrupt row in {table}: {detail}")]
    Corrupt {
        /// Table the row came from
        table: &'static str,
        /// Decode failure detail
        detail: String,
    },
}
