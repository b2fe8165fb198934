//! Entity extraction and normalisation
//!
//! Turns extraction payloads into (type, value) entities, normalises the
//! values so the same fact spelled differently lands on one row, and links
//! entities to the extractions they came from.

use crate::PipelineError;
use async_trait::async_trait;
use gleaner_domain::{Entity, EntityTypeDecl, RequestPayload};
use gleaner_extractor::prompt::entity_prompts;
use gleaner_queue::QueueLlmClient;
use gleaner_store::MetaStore;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

fn leading_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+(?:\.\d+)?)").expect("valid regex"))
}

fn unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:/|per)\s*(\w+)").expect("valid regex"))
}

fn amount_per_unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:/|per)\s*(\w+)").expect("valid regex"))
}

/// Normalise an entity value for deduplication
///
/// - `limit`: leading number plus `/`-or-`per` unit, abbreviations expanded,
///   rendered `N_per_unit` ("10,000/min" → "10000_per_minute")
/// - `pricing`: amount converted to microcents so sub-cent prices survive,
///   rendered `{microcents}_microcents_per_{period}`
///   ("$0.001/request" → "1000_microcents_per_request")
/// - anything else: lowercase and trim
pub fn normalize_entity_value(entity_type: &str, value: &str) -> String {
    let normalized = value.to_lowercase().trim().to_string();

    match entity_type {
        "limit" => {
            let stripped = normalized.replace(',', "");
            let Some(number_match) = leading_number_re().captures(&stripped) else {
                return stripped;
            };
            let Some(unit_match) = unit_re().captures(&stripped) else {
                return stripped;
            };

            let mut number = number_match[1].to_string();
            if number.contains('.') {
                // "10.0" and "10" are the same limit
                number = (number.parse::<f64>().unwrap_or(0.0) as i64).to_string();
            }
            let unit = match &unit_match[1] {
                "min" => "minute",
                "hr" => "hour",
                "sec" => "second",
                "mo" => "month",
                other => other,
            };
            format!("{number}_per_{unit}")
        }
        "pricing" => {
            let stripped = normalized.replace(['$', ','], "");
            let Some(captures) = amount_per_unit_re().captures(&stripped) else {
                return stripped;
            };
            let amount: f64 = captures[1].parse().unwrap_or(0.0);
            let period = &captures[2];
            // Microcents (millionths of a dollar) keep $0.001-style prices exact
            let microcents = (amount * 1_000_000.0) as i64;
            format!("{microcents}_microcents_per_{period}")
        }
        _ => normalized,
    }
}

/// One entity candidate before normalisation and storage
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntity {
    /// Declared entity type
    pub entity_type: String,
    /// Value exactly as extracted
    pub value: String,
    /// Free-form attributes
    pub attributes: Value,
}

/// Seam producing entity candidates from an extraction payload
#[async_trait]
pub trait EntityCandidates: Send + Sync {
    /// Mine candidates out of the payload
    async fn candidates(
        &self,
        extraction_data: &Value,
        entity_types: &[EntityTypeDecl],
    ) -> Result<Vec<CandidateEntity>, PipelineError>;
}

#[async_trait]
impl EntityCandidates for QueueLlmClient {
    async fn candidates(
        &self,
        extraction_data: &Value,
        entity_types: &[EntityTypeDecl],
    ) -> Result<Vec<CandidateEntity>, PipelineError> {
        let payload = RequestPayload::ExtractEntities {
            prompts: entity_prompts(entity_types, extraction_data),
            extraction_data: extraction_data.clone(),
            entity_types: entity_types.to_vec(),
        };
        let result = self.request(payload).await?;
        Ok(parse_candidates(&result, entity_types))
    }
}

/// Parse the worker's `{"entities": [...]}` payload, dropping entries whose
/// type the project never declared
fn parse_candidates(result: &Value, entity_types: &[EntityTypeDecl]) -> Vec<CandidateEntity> {
    let Some(list) = result.get("entities").and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|item| {
            let entity_type = item.get("type").and_then(Value::as_str)?;
            let value = item.get("value").and_then(Value::as_str)?;
            if !entity_types.iter().any(|t| t.name == entity_type) {
                return None;
            }
            Some(CandidateEntity {
                entity_type: entity_type.to_string(),
                value: value.to_string(),
                attributes: item.get("attributes").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

/// Queue-free candidate source for deployments without the LLM queue
///
/// Reads string fields whose key matches a declared entity type straight out
/// of the payload; the normalise/store/link contract is unchanged.
pub struct PayloadCandidates;

#[async_trait]
impl EntityCandidates for PayloadCandidates {
    async fn candidates(
        &self,
        extraction_data: &Value,
        entity_types: &[EntityTypeDecl],
    ) -> Result<Vec<CandidateEntity>, PipelineError> {
        let Some(map) = extraction_data.as_object() else {
            return Ok(Vec::new());
        };
        Ok(entity_types
            .iter()
            .filter_map(|decl| {
                map.get(&decl.name)
                    .and_then(Value::as_str)
                    .map(|value| CandidateEntity {
                        entity_type: decl.name.clone(),
                        value: value.to_string(),
                        attributes: Value::Null,
                    })
            })
            .collect())
    }
}

/// Extracts, normalises, stores, and links entities
pub struct EntityExtractor {
    source: Arc<dyn EntityCandidates>,
    store: Arc<MetaStore>,
}

impl EntityExtractor {
    /// Create an extractor over a candidate source and the metadata store
    pub fn new(source: Arc<dyn EntityCandidates>, store: Arc<MetaStore>) -> Self {
        Self { source, store }
    }

    /// Extract entities for one extraction payload and link them
    ///
    /// Returns the linked entities. The caller flips `entities_extracted`
    /// on the extraction after all of its entity calls succeed.
    pub async fn extract(
        &self,
        extraction_id: Uuid,
        extraction_data: &Value,
        project_id: Uuid,
        entity_types: &[EntityTypeDecl],
        source_group: &str,
    ) -> Result<Vec<Entity>, PipelineError> {
        if entity_types.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.source.candidates(extraction_data, entity_types).await?;

        let mut entities = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let normalized = normalize_entity_value(&candidate.entity_type, &candidate.value);
            let (entity, _created) = self.store.get_or_create_entity(
                project_id,
                source_group,
                &candidate.entity_type,
                &candidate.value,
                &normalized,
                &candidate.attributes,
            )?;

            if self.store.link_entity(entity.id, extraction_id)? {
                debug!(
                    entity_id = %entity.id,
                    extraction_id = %extraction_id,
                    "entity linked"
                );
            }
            entities.push(entity);
        }

        Ok(entities)
    }
}
