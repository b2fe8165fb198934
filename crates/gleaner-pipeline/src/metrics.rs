//! Process-local pipeline metrics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters accumulated across pipeline runs
///
/// Exposed for operator summaries and the health surface; the Prometheus
/// text rendering lives with the HTTP layer, not here.
#[derive(Debug, Default, Serialize)]
pub struct PipelineMetrics {
    /// Sources processed to completion
    #[serde(serialize_with = "load")]
    pub sources_processed: AtomicU64,
    /// Sources that failed entirely
    #[serde(serialize_with = "load")]
    pub sources_failed: AtomicU64,
    /// Extraction rows created
    #[serde(serialize_with = "load")]
    pub extractions_created: AtomicU64,
    /// Extractions suppressed as vector-similarity duplicates
    #[serde(serialize_with = "load")]
    pub extractions_deduplicated: AtomicU64,
    /// Entities linked (created or reused)
    #[serde(serialize_with = "load")]
    pub entities_linked: AtomicU64,
    /// Checkpoints written
    #[serde(serialize_with = "load")]
    pub checkpoints_written: AtomicU64,
}

fn load<S: serde::Serializer>(value: &AtomicU64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(value.load(Ordering::Relaxed))
}

impl PipelineMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to a counter
    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// One-line operator summary
    pub fn summary(&self) -> String {
        format!(
            "sources: {} processed, {} failed; extractions: {} created, {} deduplicated; entities: {}; checkpoints: {}",
            self.sources_processed.load(Ordering::Relaxed),
            self.sources_failed.load(Ordering::Relaxed),
            self.extractions_created.load(Ordering::Relaxed),
            self.extractions_deduplicated.load(Ordering::Relaxed),
            self.entities_linked.load(Ordering::Relaxed),
            self.checkpoints_written.load(Ordering::Relaxed),
        )
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.sources_processed.store(0, Ordering::Relaxed);
        self.sources_failed.store(0, Ordering::Relaxed);
        self.extractions_created.store(0, Ordering::Relaxed);
        self.extractions_deduplicated.store(0, Ordering::Relaxed);
        self.entities_linked.store(0, Ordering::Relaxed);
        self.checkpoints_written.store(0, Ordering::Relaxed);
    }
}
