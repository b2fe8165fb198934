//! Normalised cross-document entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A normalised value (a plan name, a rate limit, a price) shared by many
/// extractions
///
/// Uniqueness key: (project, source group, entity type, normalised value).
/// Entities are never deleted as part of extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier
    pub id: Uuid,
    /// Owning project
    pub project_id: Uuid,
    /// Source group scope
    pub source_group: String,
    /// One of the project's declared entity types
    pub entity_type: String,
    /// Raw value as extracted
    pub value: String,
    /// Normalised form used for deduplication
    pub normalized_value: String,
    /// Free-form attributes
    #[serde(default)]
    pub attributes: serde_json::Value,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create an entity with a fresh id
    pub fn new(
        project_id: Uuid,
        source_group: impl Into<String>,
        entity_type: impl Into<String>,
        value: impl Into<String>,
        normalized_value: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            source_group: source_group.into(),
            entity_type: entity_type.into(),
            value: value.into(),
            normalized_value: normalized_value.into(),
            attributes: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Many-to-many link between an entity and an extraction, unique on the pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    /// Linked entity
    pub entity_id: Uuid,
    /// Linked extraction
    pub extraction_id: Uuid,
}
