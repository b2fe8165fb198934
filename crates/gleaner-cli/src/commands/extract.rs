//! `gleaner extract` — run an extraction job over a project

use crate::bootstrap::Runtime;
use anyhow::{bail, Result};
use gleaner_domain::{Job, JobKind, JobStatus};
use gleaner_extractor::facts::FactOrchestrator;
use gleaner_extractor::orchestrator::SchemaOrchestrator;
use gleaner_pipeline::pipeline::{ExtractionPipeline, PipelineConfig};
use gleaner_pipeline::schema::{SchemaPipeline, SchemaPipelineConfig};
use gleaner_pipeline::worker::ExtractionWorker;
use gleaner_queue::QueueLlmClient;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Create (or resume) and process one extraction job
pub async fn run(
    runtime: Runtime,
    project_id: Uuid,
    source_ids: Vec<Uuid>,
    job_id: Option<Uuid>,
) -> Result<()> {
    let extractor_config = runtime.extractor_config();

    let schema_pipeline = Arc::new(SchemaPipeline::new(
        Arc::new(SchemaOrchestrator::new(
            Arc::new(runtime.llm.clone()),
            extractor_config.clone(),
        )),
        runtime.deduplicator.clone(),
        runtime.entity_extractor.clone(),
        runtime.classifier.clone(),
        runtime.store.clone(),
        runtime.vectors.clone(),
        runtime.embedder.clone(),
        Some(runtime.dlq.clone()),
        runtime.metrics.clone(),
        SchemaPipelineConfig {
            checkpoint_chunk_size: runtime.settings.extraction_checkpoint_chunk_size,
            max_concurrent_sources: runtime.settings.extraction_max_concurrent_sources,
        },
    ));

    let fact_pipeline = Arc::new(ExtractionPipeline::new(
        FactOrchestrator::new(runtime.llm.clone(), &extractor_config),
        runtime.deduplicator.clone(),
        runtime.entity_extractor.clone(),
        runtime.store.clone(),
        runtime.vectors.clone(),
        runtime.embedder.clone(),
        runtime.metrics.clone(),
        PipelineConfig {
            max_concurrent_sources: runtime.settings.extraction_max_concurrent_sources,
        },
    ));

    let worker: ExtractionWorker<QueueLlmClient, QueueLlmClient> =
        ExtractionWorker::new(runtime.store.clone(), schema_pipeline, fact_pipeline);

    let job_id = match job_id {
        // Resume an existing job (its checkpoint drives the skip set)
        Some(existing) => existing,
        None => {
            let mut payload = json!({ "project_id": project_id.to_string() });
            if !source_ids.is_empty() {
                payload["source_ids"] = json!(source_ids
                    .iter()
                    .map(Uuid::to_string)
                    .collect::<Vec<_>>());
            }
            let job = Job::new(JobKind::Extract, Some(project_id), payload);
            runtime.store.insert_job(&job)?;
            info!(job_id = %job.id, "extraction job created");
            job.id
        }
    };

    let finished = worker.process_job(job_id).await?;
    println!("{}", serde_json::to_string_pretty(&finished.result)?);
    info!(metrics = %runtime.metrics.summary(), "run metrics");

    if finished.status == JobStatus::Failed {
        bail!(
            "job {} failed: {}",
            finished.id,
            finished.error.unwrap_or_else(|| "unknown".to_string())
        );
    }
    Ok(())
}
