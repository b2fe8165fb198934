//! Schema extraction pipeline with checkpointing
//!
//! Processes a project's sources in chunks. Within a chunk sources run
//! concurrently; when the chunk completes, the ids of successful sources are
//! appended to the processed list, the checkpoint callback runs, and the
//! metadata store commits the chunk transaction, so extractions and
//! checkpoint land atomically. Failed sources stay out of the checkpoint and
//! are retried on resume.

use crate::entities::EntityExtractor;
use crate::metrics::PipelineMetrics;
use crate::PipelineError;
use futures::stream::{self, StreamExt};
use gleaner_domain::{Extraction, FieldGroup, Project, Source, SourceStatus};
use gleaner_extractor::orchestrator::{GroupExtractor, SchemaOrchestrator};
use gleaner_extractor::SmartClassifier;
use gleaner_llm::EmbeddingApi;
use gleaner_queue::DlqService;
use gleaner_store::{Deduplicator, MetaStore, VectorPayload, VectorStore};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Invoked after each committed chunk with (processed ids, total
/// extractions, total entities)
pub type CheckpointCallback = Box<dyn Fn(&[Uuid], u64, u64) + Send + Sync>;

/// Polled at chunk boundaries; returning true stops the run
pub type CancelCheck = Box<dyn Fn() -> bool + Send + Sync>;

/// Schema pipeline tuning knobs
#[derive(Debug, Clone)]
pub struct SchemaPipelineConfig {
    /// Sources per checkpoint chunk
    pub checkpoint_chunk_size: usize,
    /// Sources processed concurrently within a chunk
    pub max_concurrent_sources: usize,
}

impl Default for SchemaPipelineConfig {
    fn default() -> Self {
        Self { checkpoint_chunk_size: 20, max_concurrent_sources: 10 }
    }
}

/// Options for one project extraction run
#[derive(Default)]
pub struct ExtractProjectOptions {
    /// Restrict to these source groups
    pub source_groups: Option<Vec<String>>,
    /// Sources already processed by an earlier run; skipped entirely
    pub resume_from: Option<HashSet<Uuid>>,
    /// Checkpoint hook, typically writing into the job payload
    pub checkpoint_callback: Option<CheckpointCallback>,
    /// Cancellation probe, typically reading the job status
    pub cancel_check: Option<CancelCheck>,
}

/// Summary of one project extraction run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectExtractionSummary {
    /// Project the run belonged to
    pub project_id: Uuid,
    /// Sources that completed
    pub sources_processed: u64,
    /// Sources that failed (retried on resume)
    pub sources_failed: u64,
    /// Sources skipped via `resume_from`
    pub sources_skipped: u64,
    /// Extractions persisted
    pub extractions_created: u64,
    /// Duplicates suppressed
    pub extractions_deduplicated: u64,
    /// Entities linked
    pub entities_created: u64,
    /// Field groups in the schema
    pub field_groups: u64,
    /// True when a cancel check stopped the run early
    pub cancelled: bool,
}

/// Per-source counters
#[derive(Debug, Clone, Copy, Default)]
struct SourceCounts {
    extractions: u64,
    deduplicated: u64,
    entities: u64,
}

/// The schema extraction pipeline
pub struct SchemaPipeline<X: GroupExtractor + 'static> {
    orchestrator: Arc<SchemaOrchestrator<X>>,
    deduplicator: Arc<Deduplicator>,
    entity_extractor: Arc<EntityExtractor>,
    classifier: Option<Arc<SmartClassifier>>,
    store: Arc<MetaStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingApi>,
    dlq: Option<DlqService>,
    metrics: Arc<PipelineMetrics>,
    config: SchemaPipelineConfig,
}

impl<X: GroupExtractor + 'static> SchemaPipeline<X> {
    /// Assemble the pipeline from its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orchestrator: Arc<SchemaOrchestrator<X>>,
        deduplicator: Arc<Deduplicator>,
        entity_extractor: Arc<EntityExtractor>,
        classifier: Option<Arc<SmartClassifier>>,
        store: Arc<MetaStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingApi>,
        dlq: Option<DlqService>,
        metrics: Arc<PipelineMetrics>,
        config: SchemaPipelineConfig,
    ) -> Self {
        Self {
            orchestrator,
            deduplicator,
            entity_extractor,
            classifier,
            store,
            vectors,
            embedder,
            dlq,
            metrics,
            config,
        }
    }

    /// Extract all field groups from one source and persist the survivors
    async fn extract_source(
        &self,
        source: &Source,
        project: &Project,
        groups: &[FieldGroup],
    ) -> Result<SourceCounts, PipelineError> {
        let mut counts = SourceCounts::default();
        let content = source.content.as_deref().unwrap_or_default();

        // Classification narrows the group set before any LLM work
        let selected: Vec<FieldGroup> = match &self.classifier {
            Some(classifier) => {
                let decision = classifier
                    .classify(
                        &source.uri,
                        source.title.as_deref().unwrap_or_default(),
                        content,
                        groups,
                        project.classification.as_ref(),
                    )
                    .await?;
                if decision.skip_extraction {
                    info!(source_id = %source.id, reason = %decision.reasoning, "source skipped");
                    self.store.update_source_status(source.id, SourceStatus::Extracted)?;
                    return Ok(counts);
                }
                if decision.relevant_groups.is_empty() {
                    groups.to_vec()
                } else {
                    groups
                        .iter()
                        .filter(|g| decision.relevant_groups.contains(&g.name))
                        .cloned()
                        .collect()
                }
            }
            None => groups.to_vec(),
        };

        let results = self
            .orchestrator
            .extract_all_groups(source.id, content, &source.source_group, &selected)
            .await;

        for result in results {
            // A group that found nothing produces no row
            let empty = result
                .data
                .as_object()
                .map(|m| m.is_empty())
                .unwrap_or(true);
            if empty {
                continue;
            }

            let group = project.require_group(&result.extraction_type).map_err(|e| {
                PipelineError::Extractor(gleaner_extractor::ExtractorError::InvalidPayload(
                    e.to_string(),
                ))
            })?;

            let mut extraction = Extraction::new(
                project.id,
                source.id,
                result.extraction_type.clone(),
                source.source_group.clone(),
                result.data,
            )
            .with_confidence(result.confidence.clamp(0.0, 1.0));
            extraction.profile_used = Some("schema".to_string());

            if let Err(e) = extraction.validate_against(group) {
                warn!(
                    source_id = %source.id,
                    group = %group.name,
                    error = %e,
                    "dropping invalid group payload"
                );
                continue;
            }

            let text = extraction.embedding_text();
            let dedup = self
                .deduplicator
                .check_duplicate(project.id, &source.source_group, &text)
                .await?;
            if dedup.is_duplicate {
                counts.deduplicated += 1;
                continue;
            }

            extraction.embedding_id = Some(extraction.id.to_string());
            self.store.insert_extraction(&extraction)?;
            counts.extractions += 1;

            let embedding = self.embedder.embed(&text).await?;
            self.vectors
                .upsert(
                    extraction.id,
                    embedding,
                    VectorPayload {
                        project_id: project.id,
                        source_group: source.source_group.clone(),
                        extraction_type: extraction.extraction_type.clone(),
                    },
                )
                .await?;

            let entities = self
                .entity_extractor
                .extract(
                    extraction.id,
                    &extraction.data,
                    project.id,
                    &project.entity_types,
                    &source.source_group,
                )
                .await?;
            if !entities.is_empty() {
                self.store.set_entities_extracted(extraction.id)?;
            }
            counts.entities += entities.len() as u64;
        }

        self.store.update_source_status(source.id, SourceStatus::Extracted)?;
        Ok(counts)
    }

    /// Extract a whole project with chunked checkpointing
    pub async fn extract_project(
        &self,
        project_id: Uuid,
        options: ExtractProjectOptions,
    ) -> Result<ProjectExtractionSummary, PipelineError> {
        let project = self
            .store
            .get_project(project_id)?
            .ok_or(PipelineError::ProjectNotFound(project_id))?;
        let schema = project
            .extraction_schema
            .clone()
            .ok_or(PipelineError::SchemaMissing(project_id))?;
        if schema.field_groups.is_empty() {
            return Err(PipelineError::SchemaMissing(project_id));
        }

        let mut sources = self
            .store
            .extractable_sources(project_id, options.source_groups.as_deref())?;

        let mut summary = ProjectExtractionSummary {
            project_id,
            field_groups: schema.field_groups.len() as u64,
            ..ProjectExtractionSummary::default()
        };

        if let Some(resume) = &options.resume_from {
            let before = sources.len();
            sources.retain(|s| !resume.contains(&s.id));
            summary.sources_skipped = (before - sources.len()) as u64;
        }

        info!(
            project_id = %project_id,
            sources = sources.len(),
            skipped = summary.sources_skipped,
            "project extraction started"
        );

        let mut processed_ids: Vec<Uuid> = Vec::new();

        for chunk in sources.chunks(self.config.checkpoint_chunk_size) {
            // New work is never started after cancellation
            if options.cancel_check.as_ref().is_some_and(|check| check()) {
                summary.cancelled = true;
                info!(project_id = %project_id, "extraction cancelled at chunk boundary");
                break;
            }

            self.store.begin_chunk()?;
            let chunk_result = self
                .process_chunk(chunk, &project, &schema.field_groups, &mut summary, &mut processed_ids)
                .await;

            match chunk_result {
                Ok(()) => {
                    if let Some(callback) = &options.checkpoint_callback {
                        callback(&processed_ids, summary.extractions_created, summary.entities_created);
                    }
                    // Checkpoint and extractions commit together
                    self.store.commit_chunk()?;
                    self.metrics.add(&self.metrics.checkpoints_written, 1);
                }
                Err(e) => {
                    let _ = self.store.rollback_chunk();
                    return Err(e);
                }
            }
        }

        self.metrics.add(&self.metrics.sources_processed, summary.sources_processed);
        self.metrics.add(&self.metrics.sources_failed, summary.sources_failed);
        self.metrics.add(&self.metrics.extractions_created, summary.extractions_created);
        self.metrics
            .add(&self.metrics.extractions_deduplicated, summary.extractions_deduplicated);
        self.metrics.add(&self.metrics.entities_linked, summary.entities_created);

        info!(
            project_id = %project_id,
            processed = summary.sources_processed,
            failed = summary.sources_failed,
            extractions = summary.extractions_created,
            "project extraction finished"
        );
        Ok(summary)
    }

    /// Run one chunk of sources concurrently and fold the outcomes
    async fn process_chunk(
        &self,
        chunk: &[Source],
        project: &Project,
        groups: &[FieldGroup],
        summary: &mut ProjectExtractionSummary,
        processed_ids: &mut Vec<Uuid>,
    ) -> Result<(), PipelineError> {
        let outcomes: Vec<(Uuid, Result<SourceCounts, PipelineError>)> =
            stream::iter(chunk.iter())
                .map(|source| async move {
                    (source.id, self.extract_source(source, project, groups).await)
                })
                .buffer_unordered(self.config.max_concurrent_sources)
                .collect()
                .await;

        for (source_id, outcome) in outcomes {
            match outcome {
                Ok(counts) => {
                    // Only successful sources enter the checkpoint
                    processed_ids.push(source_id);
                    summary.sources_processed += 1;
                    summary.extractions_created += counts.extractions;
                    summary.extractions_deduplicated += counts.deduplicated;
                    summary.entities_created += counts.entities;
                }
                Err(e) => {
                    warn!(source_id = %source_id, error = %e, "source extraction failed");
                    summary.sources_failed += 1;
                    if let Some(dlq) = &self.dlq {
                        if let Err(push_err) =
                            dlq.push_extraction(source_id, e.to_string(), None, 0).await
                        {
                            warn!(error = %push_err, "extraction DLQ push failed");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
