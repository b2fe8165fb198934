//! Schema extraction orchestrator
//!
//! For one source: chunk once, run every field group over all chunks, merge
//! per-chunk payloads into one result per group. Each group's chunk work
//! runs under its own continuous semaphore, so a finished chunk immediately
//! admits the next one instead of waiting out a batch, and aggregate
//! in-flight requests scale with the number of groups.

use crate::chunking::MarkdownChunker;
use crate::config::ExtractorConfig;
use crate::prompt::field_group_prompts;
use crate::ExtractorError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use gleaner_domain::{canonical_json, FieldGroup, FieldType, RequestPayload};
use gleaner_queue::QueueLlmClient;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

/// Default confidence when a chunk payload carries none
const DEFAULT_CHUNK_CONFIDENCE: f64 = 0.8;

/// Seam for the chunk-level LLM call
///
/// The production implementation submits to the queue; tests substitute a
/// scripted extractor.
#[async_trait]
pub trait GroupExtractor: Send + Sync {
    /// Extract one field group from one chunk of content
    async fn extract_field_group(
        &self,
        content: &str,
        group: &FieldGroup,
        source_context: &str,
    ) -> Result<Value, ExtractorError>;
}

#[async_trait]
impl GroupExtractor for QueueLlmClient {
    async fn extract_field_group(
        &self,
        content: &str,
        group: &FieldGroup,
        source_context: &str,
    ) -> Result<Value, ExtractorError> {
        let payload = RequestPayload::ExtractFieldGroup {
            prompts: field_group_prompts(group, source_context, content),
            content: content.to_string(),
            field_group: group.clone(),
            source_context: source_context.to_string(),
        };
        Ok(self.request(payload).await?)
    }
}

/// Merged result for one field group over one source
#[derive(Debug, Clone)]
pub struct GroupResult {
    /// Field-group name; becomes the extraction type
    pub extraction_type: String,
    /// Source the result came from
    pub source_id: Uuid,
    /// Source group context
    pub source_group: String,
    /// Merged payload
    pub data: Value,
    /// Mean chunk confidence
    pub confidence: f64,
}

/// Orchestrates multi-group extraction across chunks
pub struct SchemaOrchestrator<X: GroupExtractor> {
    extractor: Arc<X>,
    chunker: MarkdownChunker,
    config: ExtractorConfig,
}

impl<X: GroupExtractor + 'static> SchemaOrchestrator<X> {
    /// Create an orchestrator
    pub fn new(extractor: Arc<X>, config: ExtractorConfig) -> Self {
        let chunker = MarkdownChunker::new(config.max_chunk_size, config.chunk_overlap);
        Self { extractor, chunker, config }
    }

    /// Extract every field group from the source content
    ///
    /// Groups run in parallel, and each admits up to `max_concurrent_chunks`
    /// chunk extractions of its own, keeping the model's KV cache fed when
    /// several groups are in flight. A chunk that fails all its retries
    /// contributes nothing to the merge.
    pub async fn extract_all_groups(
        &self,
        source_id: Uuid,
        markdown: &str,
        source_context: &str,
        groups: &[FieldGroup],
    ) -> Vec<GroupResult> {
        let chunks = Arc::new(self.chunker.chunk(markdown));

        info!(
            source_id = %source_id,
            source_group = source_context,
            groups = groups.len(),
            chunks = chunks.len(),
            "schema extraction started"
        );

        let results = futures::future::join_all(groups.iter().map(|group| {
            let chunks = Arc::clone(&chunks);
            async move {
                let chunk_payloads = self
                    .extract_group_chunks(group, &chunks, source_context)
                    .await;

                let mut merged = if chunk_payloads.is_empty() {
                    Value::Object(Map::new())
                } else {
                    merge_chunk_payloads(&chunk_payloads, group)
                };
                let confidence = merged
                    .as_object_mut()
                    .and_then(|m| m.remove("confidence"))
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);

                GroupResult {
                    extraction_type: group.name.clone(),
                    source_id,
                    source_group: source_context.to_string(),
                    data: merged,
                    confidence,
                }
            }
        }))
        .await;

        info!(source_id = %source_id, results = results.len(), "schema extraction completed");
        results
    }

    /// Run one group over all chunks under its own semaphore
    ///
    /// Admission is continuous: as soon as any of this group's chunks
    /// finishes, its permit frees the next one instead of waiting out a
    /// batch. Results come back in chunk order so the merge stays
    /// deterministic.
    async fn extract_group_chunks(
        &self,
        group: &FieldGroup,
        chunks: &[crate::chunking::Chunk],
        source_context: &str,
    ) -> Vec<Value> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_chunks));
        let mut indexed: Vec<(usize, Value)> = stream::iter(chunks.iter())
            .map(|chunk| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return None;
                    };
                    match self.extract_chunk_with_retry(group, chunk, source_context).await {
                        Ok(payload) => Some((chunk.index, payload)),
                        Err(e) => {
                            warn!(
                                group = %group.name,
                                chunk = chunk.index,
                                error = %e,
                                "chunk extraction failed"
                            );
                            None
                        }
                    }
                }
            })
            .buffer_unordered(chunks.len().max(1))
            .filter_map(|r| async move { r })
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, payload)| payload).collect()
    }

    /// One chunk with bounded exponential backoff
    async fn extract_chunk_with_retry(
        &self,
        group: &FieldGroup,
        chunk: &crate::chunking::Chunk,
        source_context: &str,
    ) -> Result<Value, ExtractorError> {
        let mut attempt = 0;
        loop {
            match self
                .extractor
                .extract_field_group(&chunk.content, group, source_context)
                .await
            {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.max_chunk_retries {
                        return Err(ExtractorError::ChunkFailed {
                            group: group.name.clone(),
                            chunk: chunk.index,
                            attempts: attempt,
                            detail: e.to_string(),
                        });
                    }
                    let delay = self.config.backoff_delay(attempt - 1);
                    warn!(
                        group = %group.name,
                        chunk = chunk.index,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "chunk extraction retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Merge per-chunk payloads into one group payload
///
/// Rules per field type: boolean OR; integer/float maximum; text/enum
/// longest non-empty; scalar lists order-preserving first-seen union; object
/// lists deduped by canonical JSON. Entity-list groups union their items by
/// the group's natural key. The returned object carries a `confidence` key.
pub fn merge_chunk_payloads(chunk_results: &[Value], group: &FieldGroup) -> Value {
    if group.is_entity_list {
        return merge_entity_lists(chunk_results, group);
    }

    let mut merged = Map::new();
    for field in &group.fields {
        let values: Vec<&Value> = chunk_results
            .iter()
            .filter_map(|r| r.get(&field.name))
            .filter(|v| !v.is_null())
            .collect();
        if values.is_empty() {
            continue;
        }

        let combined = match field.field_type {
            FieldType::Boolean => Value::Bool(values.iter().any(|v| v.as_bool() == Some(true))),
            FieldType::Integer => {
                let best = values.iter().filter_map(|v| v.as_i64()).max();
                match best {
                    Some(n) => Value::from(n),
                    None => continue,
                }
            }
            FieldType::Float => {
                let best = values
                    .iter()
                    .filter_map(|v| v.as_f64())
                    .fold(f64::NEG_INFINITY, f64::max);
                if best == f64::NEG_INFINITY {
                    continue;
                }
                Value::from(best)
            }
            FieldType::Text | FieldType::Enum => {
                let best = values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .max_by_key(|s| s.len());
                match best {
                    Some(s) => Value::from(s),
                    None => continue,
                }
            }
            FieldType::List => {
                let mut seen = HashSet::new();
                let mut union = Vec::new();
                for value in &values {
                    let items: Vec<Value> = match value {
                        Value::Array(items) => items.clone(),
                        other => vec![(*other).clone()],
                    };
                    for item in items {
                        // Canonical form keys both scalars and objects
                        if seen.insert(canonical_json(&item)) {
                            union.push(item);
                        }
                    }
                }
                Value::Array(union)
            }
        };
        merged.insert(field.name.clone(), combined);
    }

    let confidences: Vec<f64> = chunk_results.iter().map(chunk_confidence).collect();
    let mean = confidences.iter().sum::<f64>() / confidences.len().max(1) as f64;
    merged.insert("confidence".to_string(), Value::from(mean));
    Value::Object(merged)
}

/// Union entity-list items across chunks, keyed by the group's natural key,
/// first occurrence wins
fn merge_entity_lists(chunk_results: &[Value], group: &FieldGroup) -> Value {
    let key_field = group.entity_list_key();
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    let mut contributing = Vec::new();

    for result in chunk_results {
        let list = std::iter::once(result.get(&group.name))
            .chain(["products", "items"].iter().map(|k| result.get(*k)))
            .flatten()
            .find_map(Value::as_array);
        let Some(list) = list else { continue };
        if !list.is_empty() {
            contributing.push(chunk_confidence(result));
        }
        for item in list {
            let key = item
                .get(key_field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| canonical_json(item));
            if !key.is_empty() && seen.insert(key) {
                items.push(item.clone());
            }
        }
    }

    // Confidence averages only chunks that produced items
    let confidence = if contributing.is_empty() {
        0.0
    } else {
        contributing.iter().sum::<f64>() / contributing.len() as f64
    };

    let mut merged = Map::new();
    merged.insert(group.name.clone(), Value::Array(items));
    merged.insert("confidence".to_string(), Value::from(confidence));
    Value::Object(merged)
}

fn chunk_confidence(result: &Value) -> f64 {
    result
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CHUNK_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_domain::FieldDefinition;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn field(name: &str, field_type: FieldType) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            field_type,
            description: String::new(),
            required: false,
            default: None,
            enum_values: None,
        }
    }

    fn capability_group() -> FieldGroup {
        FieldGroup {
            name: "manufacturing".to_string(),
            description: String::new(),
            prompt_hint: String::new(),
            is_entity_list: false,
            entity_key: None,
            fields: vec![
                field("manufactures_gearboxes", FieldType::Boolean),
                field("employee_count", FieldType::Integer),
                field("details", FieldType::Text),
                field("service_types", FieldType::List),
            ],
        }
    }

    fn products_group() -> FieldGroup {
        FieldGroup {
            name: "products".to_string(),
            description: String::new(),
            prompt_hint: String::new(),
            is_entity_list: true,
            entity_key: None,
            fields: vec![field("product_name", FieldType::Text)],
        }
    }

    #[test]
    fn test_boolean_merges_with_or() {
        let merged = merge_chunk_payloads(
            &[
                json!({"manufactures_gearboxes": false, "confidence": 0.8}),
                json!({"manufactures_gearboxes": true, "confidence": 0.6}),
            ],
            &capability_group(),
        );
        assert_eq!(merged["manufactures_gearboxes"], json!(true));
        assert!((merged["confidence"].as_f64().unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_integer_takes_maximum() {
        let merged = merge_chunk_payloads(
            &[json!({"employee_count": 120}), json!({"employee_count": 450})],
            &capability_group(),
        );
        assert_eq!(merged["employee_count"], json!(450));
    }

    #[test]
    fn test_text_takes_longest_non_empty() {
        let merged = merge_chunk_payloads(
            &[
                json!({"details": ""}),
                json!({"details": "in-house gear cutting"}),
                json!({"details": "gears"}),
            ],
            &capability_group(),
        );
        assert_eq!(merged["details"], json!("in-house gear cutting"));
    }

    #[test]
    fn test_scalar_list_union_preserves_first_seen_order() {
        let merged = merge_chunk_payloads(
            &[
                json!({"service_types": ["repair", "maintenance"]}),
                json!({"service_types": ["maintenance", "installation"]}),
            ],
            &capability_group(),
        );
        assert_eq!(
            merged["service_types"],
            json!(["repair", "maintenance", "installation"])
        );
    }

    #[test]
    fn test_object_list_dedupes_by_canonical_json() {
        let merged = merge_chunk_payloads(
            &[
                json!({"service_types": [{"kind": "repair", "onsite": true}]}),
                json!({"service_types": [{"onsite": true, "kind": "repair"}]}),
            ],
            &capability_group(),
        );
        assert_eq!(merged["service_types"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_null_values_are_ignored() {
        let merged = merge_chunk_payloads(
            &[json!({"employee_count": null}), json!({"details": "x"})],
            &capability_group(),
        );
        assert!(merged.get("employee_count").is_none());
    }

    #[test]
    fn test_entity_list_dedupes_by_product_name() {
        let merged = merge_chunk_payloads(
            &[
                json!({"products": [
                    {"product_name": "Alpha", "power": "2kW"},
                    {"product_name": "Beta"}
                ], "confidence": 0.9}),
                json!({"products": [
                    {"product_name": "Alpha", "power": "ignored duplicate"}
                ], "confidence": 0.7}),
            ],
            &products_group(),
        );
        let items = merged["products"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        // First occurrence wins
        assert_eq!(items[0]["power"], json!("2kW"));
        assert!((merged["confidence"].as_f64().unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_entity_list_confidence_ignores_empty_chunks() {
        let merged = merge_chunk_payloads(
            &[
                json!({"products": [], "confidence": 0.2}),
                json!({"products": [{"product_name": "Alpha"}], "confidence": 0.6}),
            ],
            &products_group(),
        );
        assert!((merged["confidence"].as_f64().unwrap() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_entity_list_accepts_group_named_key() {
        let merged = merge_chunk_payloads(
            &[json!({"products": [{"product_name": "Alpha"}]})],
            &products_group(),
        );
        assert_eq!(merged["products"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let inputs = [
            json!({"service_types": ["a", "b"], "details": "xy", "confidence": 0.5}),
            json!({"service_types": ["b", "c"], "details": "xyz", "confidence": 0.9}),
        ];
        let group = capability_group();
        let first = merge_chunk_payloads(&inputs, &group);
        let second = merge_chunk_payloads(&inputs, &group);
        assert_eq!(first, second);
    }

    /// Scripted extractor: returns canned payloads, optionally failing some
    /// chunks permanently
    struct ScriptedExtractor {
        payloads: Vec<Value>,
        fail_chunks: HashSet<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GroupExtractor for ScriptedExtractor {
        async fn extract_field_group(
            &self,
            content: &str,
            _group: &FieldGroup,
            _source_context: &str,
        ) -> Result<Value, ExtractorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Chunk index is recoverable from content markers in these tests
            let index = content
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse::<usize>()
                .unwrap_or(0);
            if self.fail_chunks.contains(&index) {
                return Err(ExtractorError::Llm("injected".to_string()));
            }
            Ok(self.payloads.get(index).cloned().unwrap_or(json!({})))
        }
    }

    fn fast_config() -> ExtractorConfig {
        ExtractorConfig {
            max_chunk_size: 16,
            chunk_overlap: 2,
            max_concurrent_chunks: 4,
            max_chunk_retries: 2,
            retry_backoff_min_secs: 0,
            retry_backoff_max_secs: 0,
        }
    }

    #[tokio::test]
    async fn test_orchestrator_merges_across_chunks() {
        let extractor = Arc::new(ScriptedExtractor {
            payloads: vec![
                json!({"employee_count": 10, "confidence": 0.8}),
                json!({"employee_count": 99, "confidence": 0.6}),
            ],
            fail_chunks: HashSet::new(),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = SchemaOrchestrator::new(extractor, fast_config());

        // Two paragraphs, each its own chunk under the tiny size limit
        let markdown = "chunk 0 text\n\nchunk 1 text";
        let results = orchestrator
            .extract_all_groups(Uuid::new_v4(), markdown, "Acme", &[capability_group()])
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].extraction_type, "manufacturing");
        assert_eq!(results[0].data["employee_count"], json!(99));
        assert!((results[0].confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_chunk_contributes_nothing() {
        let extractor = Arc::new(ScriptedExtractor {
            payloads: vec![
                json!({"employee_count": 10, "confidence": 0.9}),
                json!({"employee_count": 99, "confidence": 0.9}),
            ],
            fail_chunks: [1].into_iter().collect(),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = SchemaOrchestrator::new(extractor.clone(), fast_config());

        let markdown = "chunk 0 text\n\nchunk 1 text";
        let results = orchestrator
            .extract_all_groups(Uuid::new_v4(), markdown, "Acme", &[capability_group()])
            .await;

        assert_eq!(results[0].data["employee_count"], json!(10));
        // Failing chunk was retried max_chunk_retries times
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2 + 1);
    }

    /// Extractor that records global and per-group in-flight peaks
    struct TrackingExtractor {
        current: AtomicUsize,
        peak: AtomicUsize,
        group_current: std::sync::Mutex<std::collections::HashMap<String, usize>>,
        group_peak: std::sync::Mutex<std::collections::HashMap<String, usize>>,
    }

    impl TrackingExtractor {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                group_current: std::sync::Mutex::new(std::collections::HashMap::new()),
                group_peak: std::sync::Mutex::new(std::collections::HashMap::new()),
            }
        }

        fn enter(&self, group: &str) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let mut current = self.group_current.lock().unwrap();
            let count = current.entry(group.to_string()).or_insert(0);
            *count += 1;
            let mut peak = self.group_peak.lock().unwrap();
            let best = peak.entry(group.to_string()).or_insert(0);
            *best = (*best).max(*count);
        }

        fn exit(&self, group: &str) {
            self.current.fetch_sub(1, Ordering::SeqCst);
            let mut current = self.group_current.lock().unwrap();
            if let Some(count) = current.get_mut(group) {
                *count -= 1;
            }
        }
    }

    #[async_trait]
    impl GroupExtractor for TrackingExtractor {
        async fn extract_field_group(
            &self,
            _content: &str,
            group: &FieldGroup,
            _source_context: &str,
        ) -> Result<Value, ExtractorError> {
            self.enter(&group.name);
            // Long enough that chunks from concurrent groups overlap
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.exit(&group.name);
            Ok(json!({"confidence": 0.8}))
        }
    }

    #[tokio::test]
    async fn test_chunk_limit_is_per_group_not_per_source() {
        let extractor = Arc::new(TrackingExtractor::new());
        // One chunk in flight per group at a time
        let config = ExtractorConfig {
            max_concurrent_chunks: 1,
            ..fast_config()
        };
        let orchestrator = SchemaOrchestrator::new(extractor.clone(), config);

        let mut services = capability_group();
        services.name = "services".to_string();
        let groups = [capability_group(), services];

        // Two chunks under the tiny size limit
        let markdown = "chunk 0 text\n\nchunk 1 text";
        orchestrator
            .extract_all_groups(Uuid::new_v4(), markdown, "Acme", &groups)
            .await;

        // Each group respects its own limit...
        let group_peak = extractor.group_peak.lock().unwrap();
        assert!(group_peak.values().all(|peak| *peak <= 1));
        // ...but aggregate concurrency scales with the number of groups
        assert!(
            extractor.peak.load(Ordering::SeqCst) >= 2,
            "groups must not share one chunk budget"
        );
    }

    #[tokio::test]
    async fn test_empty_content_yields_empty_results() {
        let extractor = Arc::new(ScriptedExtractor {
            payloads: vec![],
            fail_chunks: HashSet::new(),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = SchemaOrchestrator::new(extractor.clone(), fast_config());
        let results = orchestrator
            .extract_all_groups(Uuid::new_v4(), "", "Acme", &[capability_group()])
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].confidence, 0.0);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }
}
