//! Extraction job worker
//!
//! Drives a Job row through queued → running → terminal. The project's
//! schema decides the path: schema extraction with checkpoint/resume when a
//! schema exists, the generic fact pipeline otherwise. A job only fails
//! outright when no source made progress; partial failures complete with a
//! non-zero failure count in the result.

use crate::pipeline::ExtractionPipeline;
use crate::schema::{ExtractProjectOptions, SchemaPipeline};
use crate::PipelineError;
use chrono::Utc;
use gleaner_domain::{Checkpoint, Job, JobStatus};
use gleaner_extractor::facts::{ExtractionProfile, FactExtractor};
use gleaner_extractor::orchestrator::GroupExtractor;
use gleaner_store::MetaStore;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Background worker for extraction jobs
pub struct ExtractionWorker<X: GroupExtractor + 'static, F: FactExtractor> {
    store: Arc<MetaStore>,
    schema_pipeline: Arc<SchemaPipeline<X>>,
    fact_pipeline: Arc<ExtractionPipeline<F>>,
}

impl<X: GroupExtractor + 'static, F: FactExtractor> ExtractionWorker<X, F> {
    /// Create a worker over both pipelines
    pub fn new(
        store: Arc<MetaStore>,
        schema_pipeline: Arc<SchemaPipeline<X>>,
        fact_pipeline: Arc<ExtractionPipeline<F>>,
    ) -> Self {
        Self { store, schema_pipeline, fact_pipeline }
    }

    /// Process one extraction job to a terminal status
    ///
    /// Errors are absorbed into the job record; the returned job carries the
    /// final status, result, and any checkpoint written along the way.
    pub async fn process_job(&self, job_id: Uuid) -> Result<Job, PipelineError> {
        let mut job = self
            .store
            .get_job(job_id)?
            .ok_or(PipelineError::JobNotFound(job_id))?;

        info!(job_id = %job_id, "extraction job started");
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.store.update_job(&job)?;

        match self.run_job(job).await {
            Ok(job) => Ok(job),
            Err((mut job, e)) => {
                error!(job_id = %job.id, error = %e, "extraction job error");
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
                job.completed_at = Some(Utc::now());
                self.store.update_job(&job)?;
                Ok(job)
            }
        }
    }

    async fn run_job(&self, job: Job) -> Result<Job, (Job, PipelineError)> {
        let project_id = match payload_project_id(&job.payload) {
            Ok(id) => id,
            Err(e) => return Err((job, e)),
        };
        let project = match self.store.get_project(project_id) {
            Ok(Some(project)) => project,
            Ok(None) => return Err((job, PipelineError::ProjectNotFound(project_id))),
            Err(e) => return Err((job, e.into())),
        };

        if project.extraction_schema.is_some() {
            self.run_schema_job(job, project_id).await
        } else {
            self.run_fact_job(job, project_id).await
        }
    }

    async fn run_schema_job(&self, job: Job, project_id: Uuid) -> Result<Job, (Job, PipelineError)> {
        let job_id = job.id;
        let resume_from: Option<HashSet<Uuid>> =
            job.resume_from().map(|ids| ids.into_iter().collect());
        if let Some(resume) = &resume_from {
            info!(job_id = %job_id, resumed = resume.len(), "resuming from checkpoint");
        }
        let source_groups = payload_string_list(&job.payload, "source_groups");

        // The callback mutates the job payload so the chunk transaction
        // commits checkpoint and extractions together
        let shared_job = Arc::new(Mutex::new(job));
        let callback_job = Arc::clone(&shared_job);
        let callback_store = Arc::clone(&self.store);
        let checkpoint_callback = Box::new(move |ids: &[Uuid], extractions: u64, entities: u64| {
            let mut job = callback_job.lock().expect("job lock");
            job.set_checkpoint(&Checkpoint {
                processed_source_ids: ids.to_vec(),
                total_extractions: extractions,
                total_entities: entities,
                last_checkpoint_at: Utc::now(),
            });
            if let Err(e) = callback_store.update_job(&job) {
                warn!(job_id = %job.id, error = %e, "checkpoint write failed");
            }
        });

        let cancel_store = Arc::clone(&self.store);
        let cancel_check = Box::new(move || {
            matches!(
                cancel_store.get_job(job_id),
                Ok(Some(Job { status: JobStatus::Cancelling, .. }))
            )
        });

        let options = ExtractProjectOptions {
            source_groups,
            resume_from,
            checkpoint_callback: Some(checkpoint_callback),
            cancel_check: Some(cancel_check),
        };

        let outcome = self.schema_pipeline.extract_project(project_id, options).await;

        let mut job = Arc::try_unwrap(shared_job)
            .map(|m| m.into_inner().expect("job lock"))
            .unwrap_or_else(|arc| arc.lock().expect("job lock").clone());

        match outcome {
            Ok(summary) => {
                job.result = Some(json!({
                    "sources_processed": summary.sources_processed,
                    "sources_failed": summary.sources_failed,
                    "sources_skipped": summary.sources_skipped,
                    "extractions_created": summary.extractions_created,
                    "extractions_deduplicated": summary.extractions_deduplicated,
                    "entities_created": summary.entities_created,
                }));
                job.status = if summary.cancelled {
                    JobStatus::Cancelled
                } else if summary.sources_processed == 0 && summary.sources_failed > 0 {
                    job.error = Some(format!(
                        "All {} sources failed to process",
                        summary.sources_failed
                    ));
                    JobStatus::Failed
                } else {
                    JobStatus::Completed
                };
                job.completed_at = Some(Utc::now());
                if let Err(e) = self.store.update_job(&job) {
                    return Err((job, e.into()));
                }
                info!(
                    job_id = %job.id,
                    status = job.status.as_str(),
                    sources_processed = summary.sources_processed,
                    extractions = summary.extractions_created,
                    "extraction job finished"
                );
                Ok(job)
            }
            Err(e) => Err((job, e)),
        }
    }

    async fn run_fact_job(&self, mut job: Job, project_id: Uuid) -> Result<Job, (Job, PipelineError)> {
        // Unknown profile names fall back to the built-in general profile,
        // keeping the requested name for provenance
        let mut profile = ExtractionProfile::general();
        if let Some(name) = job.payload.get("profile").and_then(Value::as_str) {
            profile.name = name.to_string();
        }
        let source_ids = payload_uuid_list(&job.payload, "source_ids");

        let result = match source_ids {
            Some(ids) => self.fact_pipeline.process_batch(&ids, project_id, &profile).await,
            None => match self.fact_pipeline.process_project_pending(project_id, &profile).await {
                Ok(result) => result,
                Err(e) => return Err((job, e)),
            },
        };

        job.result = Some(json!({
            "sources_processed": result.sources_processed,
            "sources_failed": result.sources_failed,
            "total_extractions": result.total_extractions,
            "total_deduplicated": result.total_deduplicated,
            "total_entities": result.total_entities,
        }));
        job.status = if result.sources_failed > 0 && result.sources_failed == result.sources_processed
        {
            job.error = Some(format!("All {} sources failed to process", result.sources_failed));
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        job.completed_at = Some(Utc::now());
        if let Err(e) = self.store.update_job(&job) {
            return Err((job, e.into()));
        }
        Ok(job)
    }
}

fn payload_project_id(payload: &Value) -> Result<Uuid, PipelineError> {
    payload
        .get("project_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(PipelineError::MissingPayloadField("project_id"))
}

fn payload_uuid_list(payload: &Value, key: &str) -> Option<Vec<Uuid>> {
    let list = payload.get(key)?.as_array()?;
    Some(
        list.iter()
            .filter_map(Value::as_str)
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect(),
    )
}

fn payload_string_list(payload: &Value, key: &str) -> Option<Vec<String>> {
    let list = payload.get(key)?.as_array()?;
    Some(list.iter().filter_map(Value::as_str).map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{EntityExtractor, PayloadCandidates};
    use crate::metrics::PipelineMetrics;
    use crate::pipeline::PipelineConfig;
    use crate::schema::SchemaPipelineConfig;
    use async_trait::async_trait;
    use gleaner_domain::{
        ExtractionSchema, FieldDefinition, FieldGroup, FieldType, JobKind, Project, Source,
    };
    use gleaner_extractor::facts::{ExtractedFact, FactOrchestrator};
    use gleaner_extractor::orchestrator::SchemaOrchestrator;
    use gleaner_extractor::ExtractorConfig;
    use gleaner_llm::MockEmbeddingApi;
    use gleaner_store::{Deduplicator, MemoryVectorStore};

    struct EchoExtractor;

    #[async_trait]
    impl GroupExtractor for EchoExtractor {
        async fn extract_field_group(
            &self,
            content: &str,
            _group: &FieldGroup,
            _source_context: &str,
        ) -> Result<Value, gleaner_extractor::ExtractorError> {
            Ok(json!({"company_name": content.trim(), "confidence": 0.9}))
        }
    }

    struct NoFacts;

    #[async_trait]
    impl FactExtractor for NoFacts {
        async fn extract_facts(
            &self,
            _content: &str,
            _profile: &ExtractionProfile,
        ) -> Result<Vec<ExtractedFact>, gleaner_extractor::ExtractorError> {
            Ok(Vec::new())
        }
    }

    fn schema() -> ExtractionSchema {
        ExtractionSchema {
            name: "catalog".to_string(),
            field_groups: vec![FieldGroup {
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
            }],
        }
    }

    fn worker(store: Arc<MetaStore>) -> ExtractionWorker<EchoExtractor, NoFacts> {
        let vectors = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(MockEmbeddingApi::new(64));
        let deduplicator = Arc::new(Deduplicator::new(embedder.clone(), vectors.clone()));
        let entity_extractor =
            Arc::new(EntityExtractor::new(Arc::new(PayloadCandidates), store.clone()));

        let schema_pipeline = Arc::new(SchemaPipeline::new(
            Arc::new(SchemaOrchestrator::new(Arc::new(EchoExtractor), ExtractorConfig::default())),
            deduplicator.clone(),
            entity_extractor.clone(),
            None,
            store.clone(),
            vectors.clone(),
            embedder.clone(),
            None,
            Arc::new(PipelineMetrics::new()),
            SchemaPipelineConfig { checkpoint_chunk_size: 2, max_concurrent_sources: 2 },
        ));
        let fact_pipeline = Arc::new(ExtractionPipeline::new(
            FactOrchestrator::new(NoFacts, &ExtractorConfig::default()),
            deduplicator,
            entity_extractor,
            store.clone(),
            vectors,
            embedder,
            Arc::new(PipelineMetrics::new()),
            PipelineConfig::default(),
        ));
        ExtractionWorker::new(store, schema_pipeline, fact_pipeline)
    }

    fn seeded_project(store: &MetaStore, with_schema: bool, source_count: usize) -> Project {
        let mut project = Project::new("p", "");
        if with_schema {
            project = project.with_schema(schema());
        }
        store.insert_project(&project).unwrap();
        for i in 0..source_count {
            let mut source =
                Source::new(project.id, format!("https://acme.test/{i}"), "Acme");
            source.content = Some(format!("corp number {i}"));
            store.insert_source(&source).unwrap();
        }
        project
    }

    #[tokio::test]
    async fn test_schema_job_completes_with_checkpoint() {
        let store = Arc::new(MetaStore::open_in_memory().unwrap());
        let project = seeded_project(&store, true, 3);
        let job = Job::new(
            JobKind::Extract,
            Some(project.id),
            json!({"project_id": project.id.to_string()}),
        );
        store.insert_job(&job).unwrap();

        let finished = worker(store.clone()).process_job(job.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.result.as_ref().unwrap()["sources_processed"], json!(3));

        // The persisted job carries the checkpoint of the final chunk
        let stored = store.get_job(job.id).unwrap().unwrap();
        let checkpoint = stored.checkpoint().unwrap();
        assert_eq!(checkpoint.processed_source_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_schema_job_resumes_from_checkpoint() {
        let store = Arc::new(MetaStore::open_in_memory().unwrap());
        let project = seeded_project(&store, true, 5);
        let processed: Vec<String> = store
            .extractable_sources(project.id, None)
            .unwrap()
            .iter()
            .take(2)
            .map(|s| s.id.to_string())
            .collect();

        let job = Job::new(
            JobKind::Extract,
            Some(project.id),
            json!({
                "project_id": project.id.to_string(),
                "checkpoint": {
                    "processed_source_ids": processed,
                    "total_extractions": 2,
                    "total_entities": 0,
                    "last_checkpoint_at": "2024-01-15T10:30:00Z",
                },
            }),
        );
        store.insert_job(&job).unwrap();

        let finished = worker(store.clone()).process_job(job.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        let result = finished.result.unwrap();
        assert_eq!(result["sources_skipped"], json!(2));
        assert_eq!(result["sources_processed"], json!(3));
    }

    #[tokio::test]
    async fn test_missing_project_id_fails_job() {
        let store = Arc::new(MetaStore::open_in_memory().unwrap());
        seeded_project(&store, true, 0);
        let job = Job::new(JobKind::Extract, None, json!({}));
        store.insert_job(&job).unwrap();

        let finished = worker(store.clone()).process_job(job.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(finished.error.unwrap().contains("project_id"));
    }

    #[tokio::test]
    async fn test_fact_job_without_schema_completes() {
        let store = Arc::new(MetaStore::open_in_memory().unwrap());
        let project = seeded_project(&store, false, 2);
        let job = Job::new(
            JobKind::Extract,
            Some(project.id),
            json!({"project_id": project.id.to_string()}),
        );
        store.insert_job(&job).unwrap();

        let finished = worker(store.clone()).process_job(job.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.result.unwrap()["sources_processed"], json!(2));
    }
}
