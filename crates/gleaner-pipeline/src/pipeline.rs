//! Generic fact extraction pipeline
//!
//! Orchestrates the per-source flow for projects without an extraction
//! schema: extract facts → deduplicate each → persist → embed → upsert →
//! link entities → mark the source extracted. Failures of individual facts
//! are captured in the source result and never abort the source; failures of
//! whole sources never block their batch peers.

use crate::entities::EntityExtractor;
use crate::metrics::PipelineMetrics;
use gleaner_domain::{Extraction, SourceStatus};
use gleaner_extractor::facts::{ExtractionProfile, FactExtractor, FactOrchestrator};
use gleaner_llm::EmbeddingApi;
use gleaner_store::{Deduplicator, MetaStore, VectorPayload, VectorStore};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Pipeline tuning knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sources processed concurrently in a batch
    pub max_concurrent_sources: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_concurrent_sources: 10 }
    }
}

/// Result from processing a single source
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineResult {
    /// The source processed
    pub source_id: Uuid,
    /// Extractions persisted
    pub extractions_created: u64,
    /// Extractions suppressed as duplicates
    pub extractions_deduplicated: u64,
    /// Entities linked
    pub entities_extracted: u64,
    /// Per-fact errors; non-empty does not mean the source failed
    pub errors: Vec<String>,
}

/// Result from processing a batch of sources
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchPipelineResult {
    /// Sources attempted
    pub sources_processed: u64,
    /// Sources whose result carried errors
    pub sources_failed: u64,
    /// Extractions persisted across the batch
    pub total_extractions: u64,
    /// Duplicates suppressed across the batch
    pub total_deduplicated: u64,
    /// Entities linked across the batch
    pub total_entities: u64,
    /// Per-source results
    pub results: Vec<PipelineResult>,
}

/// The generic fact pipeline
pub struct ExtractionPipeline<F: FactExtractor> {
    orchestrator: FactOrchestrator<F>,
    deduplicator: Arc<Deduplicator>,
    entity_extractor: Arc<EntityExtractor>,
    store: Arc<MetaStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingApi>,
    metrics: Arc<PipelineMetrics>,
    config: PipelineConfig,
}

impl<F: FactExtractor> ExtractionPipeline<F> {
    /// Assemble the pipeline from its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orchestrator: FactOrchestrator<F>,
        deduplicator: Arc<Deduplicator>,
        entity_extractor: Arc<EntityExtractor>,
        store: Arc<MetaStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingApi>,
        metrics: Arc<PipelineMetrics>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            orchestrator,
            deduplicator,
            entity_extractor,
            store,
            vectors,
            embedder,
            metrics,
            config,
        }
    }

    /// Process a single source through the full pipeline
    pub async fn process_source(
        &self,
        source_id: Uuid,
        project_id: Uuid,
        profile: &ExtractionProfile,
    ) -> PipelineResult {
        let mut result = PipelineResult { source_id, ..PipelineResult::default() };

        let source = match self.store.get_source(source_id) {
            Ok(Some(source)) if source.has_content() => source,
            Ok(_) => {
                result.errors.push("Source not found or empty".to_string());
                return result;
            }
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        };

        let entity_types = match self.store.get_project(project_id) {
            Ok(Some(project)) => project.entity_types,
            _ => Vec::new(),
        };

        let markdown = source.content.as_deref().unwrap_or_default();
        let extraction = match self.orchestrator.extract(source_id, markdown, profile).await {
            Ok(extraction) => extraction,
            Err(e) => {
                // No progress was made; leave the status untouched for a retry
                error!(source_id = %source_id, error = %e, "fact orchestration failed");
                result.errors.push(format!("Extraction failed: {e}"));
                self.metrics.add(&self.metrics.sources_failed, 1);
                return result;
            }
        };

        for fact in &extraction.facts {
            match self
                .process_fact(&source.source_group, project_id, source_id, profile, fact, &entity_types)
                .await
            {
                Ok(FactOutcome::Created { entities }) => {
                    result.extractions_created += 1;
                    result.entities_extracted += entities;
                }
                Ok(FactOutcome::Duplicate) => result.extractions_deduplicated += 1,
                Err(e) => {
                    error!(source_id = %source_id, error = %e, fact = %fact.fact, "fact processing failed");
                    result.errors.push(format!("Error processing fact: {e}"));
                }
            }
        }

        // The source advanced even with partial failures; operators re-run
        // with force when they want another pass
        if let Err(e) = self.store.update_source_status(source_id, SourceStatus::Extracted) {
            result.errors.push(e.to_string());
        }

        self.metrics.add(&self.metrics.sources_processed, 1);
        self.metrics.add(&self.metrics.extractions_created, result.extractions_created);
        self.metrics
            .add(&self.metrics.extractions_deduplicated, result.extractions_deduplicated);
        self.metrics.add(&self.metrics.entities_linked, result.entities_extracted);

        info!(
            source_id = %source_id,
            created = result.extractions_created,
            deduplicated = result.extractions_deduplicated,
            entities = result.entities_extracted,
            errors = result.errors.len(),
            "source processed"
        );
        result
    }

    async fn process_fact(
        &self,
        source_group: &str,
        project_id: Uuid,
        source_id: Uuid,
        profile: &ExtractionProfile,
        fact: &gleaner_extractor::facts::ExtractedFact,
        entity_types: &[gleaner_domain::EntityTypeDecl],
    ) -> Result<FactOutcome, crate::PipelineError> {
        let dedup = self
            .deduplicator
            .check_duplicate(project_id, source_group, &fact.fact)
            .await?;
        if dedup.is_duplicate {
            return Ok(FactOutcome::Duplicate);
        }

        let data = json!({
            "fact_text": fact.fact,
            "category": fact.category,
            "header_context": fact.header_context,
        });
        let mut extraction =
            Extraction::new(project_id, source_id, fact.category.clone(), source_group, data.clone())
                .with_confidence(fact.confidence);
        extraction.profile_used = Some(profile.name.clone());
        extraction.embedding_id = Some(extraction.id.to_string());
        self.store.insert_extraction(&extraction)?;

        let embedding = self.embedder.embed(&fact.fact).await?;
        self.vectors
            .upsert(
                extraction.id,
                embedding,
                VectorPayload {
                    project_id,
                    source_group: source_group.to_string(),
                    extraction_type: fact.category.clone(),
                },
            )
            .await?;

        let entities = self
            .entity_extractor
            .extract(extraction.id, &data, project_id, entity_types, source_group)
            .await?;
        if !entities.is_empty() {
            self.store.set_entities_extracted(extraction.id)?;
        }

        Ok(FactOutcome::Created { entities: entities.len() as u64 })
    }

    /// Process sources concurrently, bounded by `max_concurrent_sources`
    pub async fn process_batch(
        &self,
        source_ids: &[Uuid],
        project_id: Uuid,
        profile: &ExtractionProfile,
    ) -> BatchPipelineResult {
        let results: Vec<PipelineResult> = stream::iter(source_ids.iter().copied())
            .map(|source_id| self.process_source(source_id, project_id, profile))
            .buffer_unordered(self.config.max_concurrent_sources)
            .collect()
            .await;

        let sources_failed = results.iter().filter(|r| !r.errors.is_empty()).count() as u64;
        BatchPipelineResult {
            sources_processed: source_ids.len() as u64,
            sources_failed,
            total_extractions: results.iter().map(|r| r.extractions_created).sum(),
            total_deduplicated: results.iter().map(|r| r.extractions_deduplicated).sum(),
            total_entities: results.iter().map(|r| r.entities_extracted).sum(),
            results,
        }
    }

    /// Process every pending source of a project
    pub async fn process_project_pending(
        &self,
        project_id: Uuid,
        profile: &ExtractionProfile,
    ) -> Result<BatchPipelineResult, crate::PipelineError> {
        let pending = self.store.sources_by_status(project_id, SourceStatus::Pending)?;
        let source_ids: Vec<Uuid> = pending.iter().map(|s| s.id).collect();
        Ok(self.process_batch(&source_ids, project_id, profile).await)
    }
}

enum FactOutcome {
    Created { entities: u64 },
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PayloadCandidates;
    use async_trait::async_trait;
    use gleaner_domain::{Project, Source};
    use gleaner_extractor::facts::ExtractedFact;
    use gleaner_extractor::ExtractorConfig;
    use gleaner_llm::MockEmbeddingApi;
    use gleaner_store::MemoryVectorStore;

    struct FixedFacts(Vec<ExtractedFact>);

    #[async_trait]
    impl FactExtractor for FixedFacts {
        async fn extract_facts(
            &self,
            _content: &str,
            _profile: &ExtractionProfile,
        ) -> Result<Vec<ExtractedFact>, gleaner_extractor::ExtractorError> {
            Ok(self.0.clone())
        }
    }

    fn fact(text: &str) -> ExtractedFact {
        ExtractedFact {
            fact: text.to_string(),
            category: "general".to_string(),
            confidence: 0.9,
            header_context: None,
        }
    }

    struct Fixture {
        pipeline: ExtractionPipeline<FixedFacts>,
        store: Arc<MetaStore>,
        vectors: Arc<MemoryVectorStore>,
        project: Project,
    }

    fn fixture(facts: Vec<ExtractedFact>) -> Fixture {
        let store = Arc::new(MetaStore::open_in_memory().unwrap());
        let vectors = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(MockEmbeddingApi::new(64));
        let project = Project::new("p", "");
        store.insert_project(&project).unwrap();

        let pipeline = ExtractionPipeline::new(
            FactOrchestrator::new(FixedFacts(facts), &ExtractorConfig::default()),
            Arc::new(Deduplicator::new(embedder.clone(), vectors.clone())),
            Arc::new(EntityExtractor::new(Arc::new(PayloadCandidates), store.clone())),
            store.clone(),
            vectors.clone(),
            embedder,
            Arc::new(PipelineMetrics::new()),
            PipelineConfig::default(),
        );
        Fixture { pipeline, store, vectors, project }
    }

    fn add_source(fixture: &Fixture, uri: &str, group: &str) -> Source {
        let mut source = Source::new(fixture.project.id, uri, group);
        source.content = Some("Paris is the capital of France.".to_string());
        fixture.store.insert_source(&source).unwrap();
        source
    }

    #[tokio::test]
    async fn test_missing_source_reports_and_leaves_status() {
        let fixture = fixture(vec![]);
        let result = fixture
            .pipeline
            .process_source(Uuid::new_v4(), fixture.project.id, &ExtractionProfile::general())
            .await;
        assert_eq!(result.errors, vec!["Source not found or empty".to_string()]);
        assert_eq!(result.extractions_created, 0);
    }

    #[tokio::test]
    async fn test_empty_content_reports_and_leaves_status() {
        let fixture = fixture(vec![]);
        let source = Source::new(fixture.project.id, "https://a.test/", "G");
        fixture.store.insert_source(&source).unwrap();

        let result = fixture
            .pipeline
            .process_source(source.id, fixture.project.id, &ExtractionProfile::general())
            .await;
        assert_eq!(result.errors, vec!["Source not found or empty".to_string()]);
        let loaded = fixture.store.get_source(source.id).unwrap().unwrap();
        assert_eq!(loaded.status, SourceStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_suppression_across_sources() {
        let fixture = fixture(vec![fact("Paris is the capital of France")]);
        let first = add_source(&fixture, "https://a.test/1", "G");
        let second = add_source(&fixture, "https://a.test/2", "G");
        let profile = ExtractionProfile::general();

        let first_result = fixture
            .pipeline
            .process_source(first.id, fixture.project.id, &profile)
            .await;
        assert_eq!(first_result.extractions_created, 1);
        assert_eq!(first_result.extractions_deduplicated, 0);

        let second_result = fixture
            .pipeline
            .process_source(second.id, fixture.project.id, &profile)
            .await;
        assert_eq!(second_result.extractions_created, 0);
        assert_eq!(second_result.extractions_deduplicated, 1);

        // Exactly one point for the (project, group) scope
        assert_eq!(fixture.vectors.len(), 1);
        let loaded = fixture.store.get_source(second.id).unwrap().unwrap();
        assert_eq!(loaded.status, SourceStatus::Extracted);
    }

    #[tokio::test]
    async fn test_different_source_groups_do_not_dedup() {
        let fixture = fixture(vec![fact("Paris is the capital of France")]);
        let acme = add_source(&fixture, "https://a.test/1", "Acme");
        let globex = add_source(&fixture, "https://b.test/1", "Globex");
        let profile = ExtractionProfile::general();

        fixture.pipeline.process_source(acme.id, fixture.project.id, &profile).await;
        let result = fixture
            .pipeline
            .process_source(globex.id, fixture.project.id, &profile)
            .await;
        assert_eq!(result.extractions_created, 1);
        assert_eq!(fixture.vectors.len(), 2);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent_under_dedup() {
        let fixture = fixture(vec![fact("Paris is the capital of France")]);
        let source = add_source(&fixture, "https://a.test/1", "G");
        let profile = ExtractionProfile::general();

        fixture.pipeline.process_source(source.id, fixture.project.id, &profile).await;
        let rerun = fixture
            .pipeline
            .process_source(source.id, fixture.project.id, &profile)
            .await;
        assert_eq!(rerun.extractions_created, 0);
        assert_eq!(rerun.extractions_deduplicated, 1);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let fixture = fixture(vec![fact("Some fact")]);
        let good = add_source(&fixture, "https://a.test/1", "G");
        let missing = Uuid::new_v4();
        let profile = ExtractionProfile::general();

        let batch = fixture
            .pipeline
            .process_batch(&[good.id, missing], fixture.project.id, &profile)
            .await;
        assert_eq!(batch.sources_processed, 2);
        assert_eq!(batch.sources_failed, 1);
        assert_eq!(batch.total_extractions, 1);
    }

    #[tokio::test]
    async fn test_process_project_pending_only_takes_pending() {
        let fixture = fixture(vec![fact("Some fact")]);
        let pending = add_source(&fixture, "https://a.test/1", "G");
        let done = add_source(&fixture, "https://a.test/2", "G");
        fixture
            .store
            .update_source_status(done.id, SourceStatus::Extracted)
            .unwrap();

        let batch = fixture
            .pipeline
            .process_project_pending(fixture.project.id, &ExtractionProfile::general())
            .await
            .unwrap();
        assert_eq!(batch.sources_processed, 1);
        assert_eq!(batch.results[0].source_id, pending.id);
    }
}
