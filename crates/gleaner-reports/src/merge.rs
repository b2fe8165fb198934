//! Per-column smart merge

use crate::ReportsError;
use async_trait::async_trait;
use futures::future::join_all;
use gleaner_queue::QueueLlmClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Metadata describing one mergeable report column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnMetadata {
    /// Column name (field name, possibly group-prefixed)
    pub name: String,
    /// Human label shown in the report
    pub label: String,
    /// Semantic field type ("boolean", "integer", "text", ...)
    pub field_type: String,
    /// Field description from the schema
    pub description: String,
    /// Owning field group
    pub field_group: String,
}

/// One candidate value for a column, from one source row
#[derive(Debug, Clone, Serialize)]
pub struct MergeCandidate {
    /// The value; `None`/null candidates never win
    pub value: Option<Value>,
    /// URL the value came from
    pub source_url: String,
    /// Title of that page
    pub source_title: Option<String>,
    /// Per-column confidence, else the row's average
    pub confidence: Option<f64>,
}

/// Reconciled value for one column of one domain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeResult {
    /// The winning value, or null
    pub value: Option<Value>,
    /// Confidence of the reconciliation
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Source URLs the decision relied on
    #[serde(default)]
    pub sources_used: Vec<String>,
    /// Model reasoning, for merge-provenance output
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Seam for the LLM reconciliation call
#[async_trait]
pub trait ColumnReconciler: Send + Sync {
    /// Reconcile several conflicting candidates into one value
    async fn reconcile(
        &self,
        column: &ColumnMetadata,
        candidates: &[MergeCandidate],
    ) -> Result<MergeResult, ReportsError>;
}

#[async_trait]
impl ColumnReconciler for QueueLlmClient {
    async fn reconcile(
        &self,
        column: &ColumnMetadata,
        candidates: &[MergeCandidate],
    ) -> Result<MergeResult, ReportsError> {
        let system = "You reconcile conflicting values extracted from multiple pages of one \
             website into a single best value for a report cell.\n\
             Prefer specific over vague values, recent over stale ones, and values backed by \
             more sources. Respect the declared field type.\n\
             Return ONLY a JSON object: {\"value\": <the reconciled value or null>, \
             \"confidence\": 0.0-1.0, \"sources_used\": [urls you relied on], \
             \"reasoning\": \"one sentence\"}.";
        let user = json!({
            "column": {
                "label": column.label,
                "field_type": column.field_type,
                "description": column.description,
            },
            "candidates": candidates,
        })
        .to_string();

        let result = self.complete_json(system, user).await?;
        serde_json::from_value(result)
            .map_err(|e| ReportsError::InvalidPayload(e.to_string()))
    }
}

/// One source row feeding the domain aggregation
#[derive(Debug, Clone, Default)]
pub struct SourceRow {
    /// Page URL
    pub source_url: String,
    /// Page title
    pub source_title: Option<String>,
    /// Column values for this source
    pub values: HashMap<String, Value>,
    /// Per-column confidences, where the extraction carried one
    pub column_confidences: HashMap<String, f64>,
    /// Row-level average confidence
    pub avg_confidence: Option<f64>,
}

impl SourceRow {
    fn confidence_for(&self, column: &str) -> Option<f64> {
        self.column_confidences
            .get(column)
            .copied()
            .or(self.avg_confidence)
    }
}

/// One merged row per domain
#[derive(Debug, Clone, Serialize)]
pub struct DomainRow {
    /// The domain the row describes
    pub domain: String,
    /// Reconciled column values
    pub values: HashMap<String, Value>,
    /// Mean of the per-column merge confidences
    pub avg_confidence: Option<f64>,
    /// Per-column merge provenance, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_metadata: Option<HashMap<String, MergeResult>>,
}

/// Domain (host) of a URL, empty when unparseable
pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Reconciles multi-source domain rows column by column
pub struct SmartMergeService {
    reconciler: Arc<dyn ColumnReconciler>,
    max_candidates: usize,
    min_confidence: f64,
}

impl SmartMergeService {
    /// Create the service
    pub fn new(reconciler: Arc<dyn ColumnReconciler>, max_candidates: usize, min_confidence: f64) -> Self {
        Self { reconciler, max_candidates, min_confidence }
    }

    /// Merge one column from the given candidates
    ///
    /// Candidates below `min_confidence` are dropped (unknown confidence
    /// passes), the list is capped at `max_candidates`, and the LLM is only
    /// consulted when more than one distinct non-null candidate survives.
    pub async fn merge_column(
        &self,
        column: &ColumnMetadata,
        candidates: Vec<MergeCandidate>,
    ) -> Result<MergeResult, ReportsError> {
        let mut filtered: Vec<MergeCandidate> = candidates
            .into_iter()
            .filter(|c| c.confidence.map(|conf| conf >= self.min_confidence).unwrap_or(true))
            .collect();
        filtered.truncate(self.max_candidates);

        let non_null: Vec<&MergeCandidate> = filtered
            .iter()
            .filter(|c| c.value.as_ref().is_some_and(|v| !v.is_null()))
            .collect();

        match non_null.len() {
            0 => Ok(MergeResult::default()),
            1 => {
                let only = non_null[0];
                Ok(MergeResult {
                    value: only.value.clone(),
                    confidence: only.confidence,
                    sources_used: vec![only.source_url.clone()],
                    reasoning: None,
                })
            }
            _ => {
                debug!(column = %column.name, candidates = non_null.len(), "reconciling column");
                self.reconciler.reconcile(column, &filtered).await
            }
        }
    }

    /// Merge every column of one domain's source rows
    ///
    /// A single-source domain needs no reconciliation. Columns merge
    /// concurrently; a failed column yields null without failing the domain.
    pub async fn merge_domain(
        &self,
        domain: &str,
        rows: &[SourceRow],
        columns: &[ColumnMetadata],
        include_metadata: bool,
    ) -> DomainRow {
        if rows.len() == 1 {
            let row = &rows[0];
            return DomainRow {
                domain: domain.to_string(),
                values: row.values.clone(),
                avg_confidence: row.avg_confidence,
                merge_metadata: None,
            };
        }

        let merges = join_all(columns.iter().map(|column| async move {
            let candidates: Vec<MergeCandidate> = rows
                .iter()
                .map(|row| MergeCandidate {
                    value: row.values.get(&column.name).cloned(),
                    source_url: row.source_url.clone(),
                    source_title: row.source_title.clone(),
                    confidence: row.confidence_for(&column.name),
                })
                .collect();
            (column.name.clone(), self.merge_column(column, candidates).await)
        }))
        .await;

        let mut values = HashMap::new();
        let mut metadata = HashMap::new();
        let mut confidences = Vec::new();
        for (name, outcome) in merges {
            match outcome {
                Ok(result) => {
                    values.insert(name.clone(), result.value.clone().unwrap_or(Value::Null));
                    if let Some(confidence) = result.confidence {
                        confidences.push(confidence);
                    }
                    if include_metadata {
                        metadata.insert(name, result);
                    }
                }
                Err(e) => {
                    warn!(domain, column = %name, error = %e, "column merge failed");
                    values.insert(name, Value::Null);
                }
            }
        }

        DomainRow {
            domain: domain.to_string(),
            values,
            avg_confidence: (!confidences.is_empty())
                .then(|| confidences.iter().sum::<f64>() / confidences.len() as f64),
            merge_metadata: include_metadata.then_some(metadata),
        }
    }
}
