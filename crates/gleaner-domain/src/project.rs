//! Project and extraction-schema definitions

use crate::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic type of an extraction field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// True/false flag; chunks merge with logical OR
    Boolean,
    /// Whole number; chunks merge by maximum
    Integer,
    /// Floating point; chunks merge by maximum
    Float,
    /// Free text; chunks merge by longest non-empty value
    Text,
    /// One of a declared value set; merged like text
    Enum,
    /// List of scalars or objects; chunks merge by order-preserving union
    List,
}

impl FieldType {
    /// Lowercase name as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Text => "text",
            FieldType::Enum => "enum",
            FieldType::List => "list",
        }
    }
}

/// Definition of a single extraction field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name; a key in the extraction payload
    pub name: String,
    /// Semantic type driving validation and chunk merging
    pub field_type: FieldType,
    /// Human description, also shown to the LLM
    #[serde(default)]
    pub description: String,
    /// Whether the LLM is expected to always produce the field
    #[serde(default)]
    pub required: bool,
    /// Default value applied when the field is missing
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Allowed values for `FieldType::Enum`
    #[serde(default)]
    pub enum_values: Option<Vec<String>>,
}

/// Group of related fields extracted together in one LLM pass
///
/// The group name doubles as the `extraction_type` of every extraction it
/// produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGroup {
    /// Stable identifier, used as `extraction_type`
    pub name: String,
    /// Human description of the group
    #[serde(default)]
    pub description: String,
    /// Guidance injected into the LLM system prompt
    #[serde(default)]
    pub prompt_hint: String,
    /// True for groups whose payload is a list of entities (e.g. products)
    #[serde(default)]
    pub is_entity_list: bool,
    /// Natural key for entity-list deduplication; `product_name` when unset
    #[serde(default)]
    pub entity_key: Option<String>,
    /// Ordered field definitions
    pub fields: Vec<FieldDefinition>,
}

impl FieldGroup {
    /// Look up a field definition by name
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Key used to deduplicate entity-list items across chunks
    pub fn entity_list_key(&self) -> &str {
        self.entity_key.as_deref().unwrap_or("product_name")
    }

    /// Text embedded when classifying pages against this group
    pub fn classification_text(&self) -> String {
        let field_names: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        format!("{}: {}. Fields: {}", self.name, self.description, field_names.join(", "))
    }
}

/// Ordered list of field groups making up a project's schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    /// Schema name (for reporting only)
    pub name: String,
    /// Field groups in extraction order
    pub field_groups: Vec<FieldGroup>,
}

impl ExtractionSchema {
    /// Look up a field group by name
    pub fn group(&self, name: &str) -> Option<&FieldGroup> {
        self.field_groups.iter().find(|g| g.name == name)
    }

    /// Names of all field groups
    pub fn group_names(&self) -> Vec<&str> {
        self.field_groups.iter().map(|g| g.name.as_str()).collect()
    }
}

/// Declaration of an entity type a project wants extracted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeDecl {
    /// Type name (e.g. "plan", "limit", "pricing")
    pub name: String,
    /// What the type means, passed to the LLM
    #[serde(default)]
    pub description: String,
}

/// Per-project classification configuration
///
/// `skip_patterns` resolution: an explicit non-empty list wins; an explicit
/// empty list disables URL skipping; `None` defers to the process-wide
/// defaults policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// URL substrings/regexes that mark a page as not worth extracting
    #[serde(default)]
    pub skip_patterns: Option<Vec<String>>,
}

/// A project: the unit of ownership for sources, extractions, and entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: Uuid,
    /// Unique human name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Schema driving extraction; `None` selects the generic fact pipeline
    #[serde(default)]
    pub extraction_schema: Option<ExtractionSchema>,
    /// Entity types the project wants normalised
    #[serde(default)]
    pub entity_types: Vec<EntityTypeDecl>,
    /// Optional classification configuration
    #[serde(default)]
    pub classification: Option<ClassificationConfig>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a project with a fresh id and current timestamps
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            extraction_schema: None,
            entity_types: Vec::new(),
            classification: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach an extraction schema
    pub fn with_schema(mut self, schema: ExtractionSchema) -> Self {
        self.extraction_schema = Some(schema);
        self
    }

    /// Resolve a field group by extraction type, or a typed error
    pub fn require_group(&self, extraction_type: &str) -> Result<&FieldGroup, DomainError> {
        self.extraction_schema
            .as_ref()
            .and_then(|s| s.group(extraction_type))
            .ok_or_else(|| DomainError::UnknownFieldGroup {
                extraction_type: extraction_type.to_string(),
                project: self.name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> ExtractionSchema {
        ExtractionSchema {
            name: "catalog".to_string(),
            field_groups: vec![FieldGroup {
                name: "company_info".to_string(),
                description: "Company identification".to_string(),
                prompt_hint: String::new(),
                is_entity_list: false,
                entity_key: None,
                fields: vec![FieldDefinition {
                    name: "company_name".to_string(),
                    field_type: FieldType::Text,
                    description: "Official company name".to_string(),
                    required: true,
                    default: None,
                    enum_values: None,
                }],
            }],
        }
    }

    #[test]
    fn test_require_group_known() {
        let project = Project::new("p", "").with_schema(sample_schema());
        assert!(project.require_group("company_info").is_ok());
    }

    #[test]
    fn test_require_group_unknown() {
        let project = Project::new("p", "").with_schema(sample_schema());
        let err = project.require_group("pricing").unwrap_err();
        assert!(matches!(err, DomainError::UnknownFieldGroup { .. }));
    }

    #[test]
    fn test_entity_list_key_default() {
        let group = FieldGroup {
            name: "products".to_string(),
            description: String::new(),
            prompt_hint: String::new(),
            is_entity_list: true,
            entity_key: None,
            fields: vec![],
        };
        assert_eq!(group.entity_list_key(), "product_name");
    }

    #[test]
    fn test_field_type_wire_names() {
        let json = serde_json::to_string(&FieldType::Boolean).unwrap();
        assert_eq!(json, "\"boolean\"");
        let parsed: FieldType = serde_json::from_str("\"enum\"").unwrap();
        assert_eq!(parsed, FieldType::Enum);
    }
}
