//! Gleaner Reports Layer
//!
//! Smart merge for table reports aggregated by domain: when several source
//! rows describe the same domain, every mergeable column is reconciled
//! independently, by rule where one candidate survives and by LLM where
//! several disagree.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod merge;

pub use merge::{
    domain_of, ColumnMetadata, ColumnReconciler, DomainRow, MergeCandidate, MergeResult,
    SmartMergeService, SourceRow,
};

use thiserror::Error;

/// Errors from report merging
#[derive(Error, Debug)]
pub enum ReportsError {
    /// The reconciliation request failed
    #[error("column reconciliation failed: {0}")]
    Reconcile(String),

    /// The model's answer did not carry a usable value
    #[error("invalid reconciliation payload: {0}")]
    InvalidPayload(String),
}

impl From<gleaner_queue::QueueError> for ReportsError {
    fn from(e: gleaner_queue::QueueError) -> Self {
        ReportsError::Reconcile(e.to_string())
    }
}
