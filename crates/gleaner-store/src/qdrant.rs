//! Qdrant-backed vector store

use crate::vector::{SearchHit, VectorFilter, VectorPayload, VectorStore};
use crate::StoreError;
use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::info;
use uuid::Uuid;

/// Collection holding one point per extraction
const COLLECTION: &str = "extractions";

/// Vector dimension (BGE-large-en)
const DIMENSION: u64 = 1024;

/// Qdrant-backed implementation of [`VectorStore`]
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl QdrantStore {
    /// Connect to a Qdrant host
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        Ok(Self { client, collection: COLLECTION.to_string() })
    }

    /// Create the collection if it does not exist (1024-d, cosine)
    pub async fn init_collection(&self) -> Result<(), StoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(DIMENSION, Distance::Cosine)),
            )
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        info!(collection = %self.collection, dimension = DIMENSION, "created vector collection");
        Ok(())
    }

    fn scope_filter(filter: &VectorFilter) -> Filter {
        Filter::must([
            Condition::matches("project_id", filter.project_id.to_string()),
            Condition::matches("source_group", filter.source_group.clone()),
        ])
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(
        &self,
        extraction_id: Uuid,
        embedding: Vec<f32>,
        payload: VectorPayload,
    ) -> Result<(), StoreError> {
        let payload: Payload = serde_json::json!({
            "project_id": payload.project_id.to_string(),
            "source_group": payload.source_group,
            "extraction_type": payload.extraction_type,
        })
        .try_into()
        .map_err(|e| StoreError::Vector(format!("payload conversion: {e}")))?;

        // Point id == extraction id, so retries overwrite instead of duplicating
        let point = PointStruct::new(extraction_id.to_string(), embedding, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]))
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        Ok(())
    }

    async fn search(
        &self,
        embedding: Vec<f32>,
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, embedding, limit as u64)
                    .filter(Self::scope_filter(filter)),
            )
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let Some(PointIdOptions::Uuid(raw)) =
                point.id.and_then(|id| id.point_id_options)
            else {
                continue;
            };
            let extraction_id = Uuid::parse_str(&raw)
                .map_err(|e| StoreError::Vector(format!("non-uuid point id {raw}: {e}")))?;
            hits.push(SearchHit { extraction_id, score: point.score });
        }
        Ok(hits)
    }

    async fn delete(&self, extraction_id: Uuid) -> Result<(), StoreError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection).points(PointsIdsList {
                    ids: vec![extraction_id.to_string().into()],
                }),
            )
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires a Qdrant instance; run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_qdrant_round_trip_integration() {
        let store = QdrantStore::connect("http://localhost:6334").unwrap();
        store.init_collection().await.unwrap();

        let project_id = Uuid::new_v4();
        let extraction_id = Uuid::new_v4();
        let mut vector = vec![0.0f32; DIMENSION as usize];
        vector[0] = 1.0;

        store
            .upsert(
                extraction_id,
                vector.clone(),
                VectorPayload {
                    project_id,
                    source_group: "G".to_string(),
                    extraction_type: "general".to_string(),
                },
            )
            .await
            .unwrap();

        let hits = store
            .search(
                vector,
                1,
                &VectorFilter { project_id, source_group: "G".to_string() },
            )
            .await
            .unwrap();
        assert_eq!(hits[0].extraction_id, extraction_id);
        assert!(hits[0].score > 0.99);

        store.delete(extraction_id).await.unwrap();
    }
}
