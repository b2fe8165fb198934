//! Vector store contract
//!
//! The pipeline only needs cosine similarity over 1024-d points keyed by
//! extraction id with a small filterable payload. Upserts are idempotent on
//! the extraction id, so a crashed run can safely re-embed and re-upsert.

use crate::StoreError;
use async_trait::async_trait;
use gleaner_llm::cosine_similarity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Payload stored with every point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    /// Owning project
    pub project_id: Uuid,
    /// Source group scope
    pub source_group: String,
    /// Field-group name or fact category
    pub extraction_type: String,
}

/// Filter applied to searches
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFilter {
    /// Owning project
    pub project_id: Uuid,
    /// Source group scope
    pub source_group: String,
}

/// One search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Point id (the extraction id)
    pub extraction_id: Uuid,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Cosine-similarity point store keyed by extraction id
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite the point for an extraction
    async fn upsert(
        &self,
        extraction_id: Uuid,
        embedding: Vec<f32>,
        payload: VectorPayload,
    ) -> Result<(), StoreError>;

    /// Top-`limit` most similar points within the filter scope
    async fn search(
        &self,
        embedding: Vec<f32>,
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// Remove the point for an extraction; idempotent
    async fn delete(&self, extraction_id: Uuid) -> Result<(), StoreError>;
}

/// Exact-scan in-memory implementation
///
/// Used by tests and small deployments; the semantics match the Qdrant
/// backend (cosine scores, filter on project + source group).
#[derive(Default)]
pub struct MemoryVectorStore {
    points: Mutex<HashMap<Uuid, (Vec<f32>, VectorPayload)>>,
}

impl MemoryVectorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored points
    pub fn len(&self) -> usize {
        self.points.lock().expect("vector lock").len()
    }

    /// Whether the store holds no points
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload of a stored point, for assertions
    pub fn payload(&self, extraction_id: Uuid) -> Option<VectorPayload> {
        self.points
            .lock()
            .expect("vector lock")
            .get(&extraction_id)
            .map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(
        &self,
        extraction_id: Uuid,
        embedding: Vec<f32>,
        payload: VectorPayload,
    ) -> Result<(), StoreError> {
        self.points
            .lock()
            .expect("vector lock")
            .insert(extraction_id, (embedding, payload));
        Ok(())
    }

    async fn search(
        &self,
        embedding: Vec<f32>,
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let points = self.points.lock().expect("vector lock");
        let mut hits: Vec<SearchHit> = points
            .iter()
            .filter(|(_, (_, payload))| {
                payload.project_id == filter.project_id
                    && payload.source_group == filter.source_group
            })
            .map(|(id, (vector, _))| SearchHit {
                extraction_id: *id,
                score: cosine_similarity(&embedding, vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, extraction_id: Uuid) -> Result<(), StoreError> {
        self.points.lock().expect("vector lock").remove(&extraction_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(project_id: Uuid, group: &str) -> VectorPayload {
        VectorPayload {
            project_id,
            source_group: group.to_string(),
            extraction_type: "general".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_id() {
        let store = MemoryVectorStore::new();
        let id = Uuid::new_v4();
        let project = Uuid::new_v4();
        store.upsert(id, vec![1.0, 0.0], payload(project, "G")).await.unwrap();
        store.upsert(id, vec![0.0, 1.0], payload(project, "G")).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_search_respects_filter() {
        let store = MemoryVectorStore::new();
        let project_a = Uuid::new_v4();
        let project_b = Uuid::new_v4();
        store
            .upsert(Uuid::new_v4(), vec![1.0, 0.0], payload(project_a, "G"))
            .await
            .unwrap();
        store
            .upsert(Uuid::new_v4(), vec![1.0, 0.0], payload(project_b, "G"))
            .await
            .unwrap();

        let hits = store
            .search(
                vec![1.0, 0.0],
                10,
                &VectorFilter { project_id: project_a, source_group: "G".to_string() },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.999);
    }

    #[tokio::test]
    async fn test_search_orders_by_score() {
        let store = MemoryVectorStore::new();
        let project = Uuid::new_v4();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        store.upsert(near, vec![1.0, 0.1], payload(project, "G")).await.unwrap();
        store.upsert(far, vec![0.0, 1.0], payload(project, "G")).await.unwrap();

        let hits = store
            .search(
                vec![1.0, 0.0],
                2,
                &VectorFilter { project_id: project, source_group: "G".to_string() },
            )
            .await
            .unwrap();
        assert_eq!(hits[0].extraction_id, near);
        assert_eq!(hits[1].extraction_id, far);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryVectorStore::new();
        let id = Uuid::new_v4();
        store.delete(id).await.unwrap();
        store
            .upsert(id, vec![1.0], payload(Uuid::new_v4(), "G"))
            .await
            .unwrap();
        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();
        assert!(store.is_empty());
    }
}
