//! Vector-similarity deduplication
//!
//! A new fact or payload is a duplicate when the best-scoring existing point
//! within its (project, source group) scope reaches the threshold. The
//! threshold is inclusive: a score of exactly `threshold` counts.

use crate::vector::{VectorFilter, VectorStore};
use crate::StoreError;
use gleaner_domain::canonical_json;
use gleaner_llm::EmbeddingApi;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Default similarity threshold
pub const DEFAULT_DEDUP_THRESHOLD: f32 = 0.90;

/// Result of a duplicate check
#[derive(Debug, Clone, PartialEq)]
pub struct DeduplicationResult {
    /// Whether the input duplicates an existing extraction
    pub is_duplicate: bool,
    /// The existing extraction it duplicates
    pub similar_extraction_id: Option<Uuid>,
    /// Its similarity score
    pub similarity_score: Option<f32>,
}

impl DeduplicationResult {
    fn unique() -> Self {
        Self { is_duplicate: false, similar_extraction_id: None, similarity_score: None }
    }
}

/// Checks extractions for vector-similarity duplicates
pub struct Deduplicator {
    embedder: Arc<dyn EmbeddingApi>,
    vectors: Arc<dyn VectorStore>,
    threshold: f32,
}

impl Deduplicator {
    /// Create a deduplicator with the default threshold
    pub fn new(embedder: Arc<dyn EmbeddingApi>, vectors: Arc<dyn VectorStore>) -> Self {
        Self::with_threshold(embedder, vectors, DEFAULT_DEDUP_THRESHOLD)
    }

    /// Create a deduplicator with an explicit threshold
    pub fn with_threshold(
        embedder: Arc<dyn EmbeddingApi>,
        vectors: Arc<dyn VectorStore>,
        threshold: f32,
    ) -> Self {
        Self { embedder, vectors, threshold }
    }

    /// Check whether similar text already exists within the scope
    pub async fn check_duplicate(
        &self,
        project_id: Uuid,
        source_group: &str,
        text: &str,
    ) -> Result<DeduplicationResult, StoreError> {
        let embedding = self.embedder.embed(text).await?;
        let hits = self
            .vectors
            .search(
                embedding,
                1,
                &VectorFilter { project_id, source_group: source_group.to_string() },
            )
            .await?;

        match hits.first() {
            Some(best) if best.score >= self.threshold => Ok(DeduplicationResult {
                is_duplicate: true,
                similar_extraction_id: Some(best.extraction_id),
                similarity_score: Some(best.score),
            }),
            _ => Ok(DeduplicationResult::unique()),
        }
    }

    /// Check an extraction payload, deriving its comparable text
    pub async fn check_extraction_data(
        &self,
        project_id: Uuid,
        source_group: &str,
        data: &Value,
    ) -> Result<DeduplicationResult, StoreError> {
        let text = text_from_extraction_data(data);
        self.check_duplicate(project_id, source_group, &text).await
    }
}

/// Comparable text for a payload: the first well-known text field, else a
/// canonical JSON rendering
pub fn text_from_extraction_data(data: &Value) -> String {
    for field in ["fact_text", "text", "content", "summary"] {
        if let Some(text) = data.get(field).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    canonical_json(data)
}
