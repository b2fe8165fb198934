//! Extraction records

use crate::error::DomainError;
use crate::project::FieldGroup;
use crate::value::canonical_json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One persisted JSON payload for a (source, field group) pair, or one fact
/// for the generic pipeline
///
/// Extractions are immutable after creation except for the
/// `entities_extracted` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    /// Unique identifier, also the vector-store point id
    pub id: Uuid,
    /// Owning project
    pub project_id: Uuid,
    /// Originating source
    pub source_id: Uuid,
    /// Field-group name (or fact category for the generic pipeline)
    pub extraction_type: String,
    /// Source group copied from the source
    pub source_group: String,
    /// Payload keyed by the group's field names
    pub data: Value,
    /// Confidence in [0, 1] when the LLM produced one
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Extraction profile in effect
    #[serde(default)]
    pub profile_used: Option<String>,
    /// Chunk index for chunk-scoped extractions
    #[serde(default)]
    pub chunk_index: Option<usize>,
    /// Id of the stored embedding point, when vectorised
    #[serde(default)]
    pub embedding_id: Option<String>,
    /// Set once entity extraction has run for this payload
    #[serde(default)]
    pub entities_extracted: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Extraction {
    /// Create an extraction with a fresh id
    pub fn new(
        project_id: Uuid,
        source_id: Uuid,
        extraction_type: impl Into<String>,
        source_group: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            source_id,
            extraction_type: extraction_type.into(),
            source_group: source_group.into(),
            data,
            confidence: None,
            profile_used: None,
            chunk_index: None,
            embedding_id: None,
            entities_extracted: false,
            created_at: Utc::now(),
        }
    }

    /// Builder-style confidence setter, validated on `validate_against`
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Validate the payload against the owning field group
    ///
    /// Payload keys must be a subset of the group's fields (`confidence` is
    /// allowed as a reserved key), every non-null value must coerce through
    /// its declared semantic type, and confidence must be in [0, 1].
    pub fn validate_against(&self, group: &FieldGroup) -> Result<(), DomainError> {
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(DomainError::ConfidenceOutOfRange(c));
            }
        }

        // Entity-list payloads hold a single list under the group's name
        if group.is_entity_list {
            return Ok(());
        }

        if let Value::Object(map) = &self.data {
            for (key, value) in map {
                if key == "confidence" {
                    continue;
                }
                let Some(field) = group.field(key) else {
                    return Err(DomainError::UndeclaredField {
                        field: key.clone(),
                        group: group.name.clone(),
                    });
                };
                if !value.is_null() {
                    crate::value::FieldValue::from_json(field, value)?;
                }
            }
        }
        Ok(())
    }

    /// Canonical text form of the payload used for embedding
    ///
    /// Fact payloads embed their `fact_text`; schema payloads embed a
    /// key-sorted JSON rendering prefixed by the extraction type so distinct
    /// groups with identical values do not collide.
    pub fn embedding_text(&self) -> String {
        if let Some(fact) = self.data.get("fact_text").and_then(Value::as_str) {
            return fact.to_string();
        }
        format!("{}: {}", self.extraction_type, canonical_json(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{FieldDefinition, FieldType};
    use serde_json::json;

    fn group() -> FieldGroup {
        FieldGroup {
            name: "company_info".to_string(),
            description: String::new(),
            prompt_hint: String::new(),
            is_entity_list: false,
            entity_key: None,
            fields: vec![FieldDefinition {
                name: "company_name".to_string(),
                field_type: FieldType::Text,
                description: String::new(),
                required: true,
                default: None,
                enum_values: None,
            }],
        }
    }

    #[test]
    fn test_validate_accepts_declared_fields() {
        let extraction = Extraction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "company_info",
            "Acme",
            json!({"company_name": "Acme Corp"}),
        )
        .with_confidence(0.9);
        assert!(extraction.validate_against(&group()).is_ok());
    }

    #[test]
    fn test_validate_rejects_undeclared_field() {
        let extraction = Extraction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "company_info",
            "Acme",
            json!({"revenue": 10}),
        );
        let err = extraction.validate_against(&group()).unwrap_err();
        assert!(matches!(err, DomainError::UndeclaredField { .. }));
    }

    #[test]
    fn test_validate_rejects_mistyped_value() {
        let extraction = Extraction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "company_info",
            "Acme",
            json!({"company_name": 42}),
        );
        let err = extraction.validate_against(&group()).unwrap_err();
        assert!(matches!(err, DomainError::TypeMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_confidence_out_of_range() {
        let extraction = Extraction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "company_info",
            "Acme",
            json!({}),
        )
        .with_confidence(1.5);
        assert!(matches!(
            extraction.validate_against(&group()),
            Err(DomainError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn test_embedding_text_prefers_fact_text() {
        let extraction = Extraction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "general",
            "Acme",
            json!({"fact_text": "Paris is the capital of France", "category": "general"}),
        );
        assert_eq!(extraction.embedding_text(), "Paris is the capital of France");
    }

    #[test]
    fn test_embedding_text_is_key_order_independent() {
        let a = Extraction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "company_info",
            "Acme",
            json!({"a": 1, "b": 2}),
        );
        let b = Extraction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "company_info",
            "Acme",
            json!({"b": 2, "a": 1}),
        );
        assert_eq!(a.embedding_text(), b.embedding_text());
    }
}
