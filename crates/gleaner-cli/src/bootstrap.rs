//! Process bootstrap assembler
//!
//! Builds the shared infrastructure once and hands explicit values to the
//! commands; nothing here is a global.

use crate::settings::Settings;
use anyhow::{Context, Result};
use gleaner_extractor::{ClassifierConfig, ExtractorConfig, SmartClassifier};
use gleaner_llm::{EmbeddingApi, EmbeddingClient};
use gleaner_pipeline::entities::EntityExtractor;
use gleaner_pipeline::metrics::PipelineMetrics;
use gleaner_queue::{DlqService, LlmQueue, QueueConfig, QueueLlmClient};
use gleaner_store::{Deduplicator, MetaStore, QdrantStore, VectorStore};
use std::sync::Arc;

/// Shared infrastructure handles
pub struct Runtime {
    /// Process settings
    pub settings: Settings,
    /// LLM request queue
    pub queue: LlmQueue,
    /// Dead-letter queues
    pub dlq: DlqService,
    /// Queue-mode LLM client
    pub llm: QueueLlmClient,
    /// Metadata store
    pub store: Arc<MetaStore>,
    /// Vector store
    pub vectors: Arc<dyn VectorStore>,
    /// Embedding host client
    pub embedder: Arc<dyn EmbeddingApi>,
    /// Vector-similarity deduplicator
    pub deduplicator: Arc<Deduplicator>,
    /// Entity extraction service
    pub entity_extractor: Arc<EntityExtractor>,
    /// Smart classifier, when enabled
    pub classifier: Option<Arc<SmartClassifier>>,
    /// Process-local pipeline metrics
    pub metrics: Arc<PipelineMetrics>,
}

impl Runtime {
    /// Connect everything the extraction commands need
    pub async fn build(settings: Settings) -> Result<Self> {
        let redis_client =
            redis::Client::open(settings.redis_url.as_str()).context("redis url")?;
        let redis = redis_client
            .get_connection_manager()
            .await
            .context("redis connection")?;

        let queue = LlmQueue::new(
            redis_client,
            redis.clone(),
            QueueConfig {
                max_queue_depth: settings.llm_queue_max_depth,
                backpressure_threshold: settings.llm_queue_backpressure_threshold,
                response_ttl_secs: settings.llm_response_ttl,
                poll_interval_ms: settings.llm_poll_interval_ms,
                ..QueueConfig::default()
            },
        );
        queue.config().validate().map_err(anyhow::Error::msg)?;
        let dlq = DlqService::new(redis.clone());
        let llm = QueueLlmClient::new(queue.clone(), settings.llm_request_timeout);

        let store = Arc::new(MetaStore::open(&settings.database_path).context("metadata store")?);

        let qdrant = QdrantStore::connect(&settings.qdrant_url).context("qdrant")?;
        qdrant.init_collection().await.context("qdrant collection")?;
        let vectors: Arc<dyn VectorStore> = Arc::new(qdrant);

        let embedder: Arc<dyn EmbeddingApi> = Arc::new(EmbeddingClient::new(
            settings.embedding_base_url.as_str(),
            settings.llm_api_key.as_str(),
            settings.embedding_model.as_str(),
            settings.reranker_model.as_str(),
        ));

        let deduplicator = Arc::new(Deduplicator::with_threshold(
            embedder.clone(),
            vectors.clone(),
            settings.dedup_threshold,
        ));
        let entity_extractor =
            Arc::new(EntityExtractor::new(Arc::new(llm.clone()), store.clone()));

        let classifier = settings.smart_classification_enabled.then(|| {
            Arc::new(SmartClassifier::new(
                embedder.clone(),
                Some(redis.clone()),
                ClassifierConfig {
                    enabled: true,
                    high_threshold: settings.classification_embedding_high_threshold,
                    low_threshold: settings.classification_embedding_low_threshold,
                    reranker_threshold: settings.classification_reranker_threshold,
                    cache_ttl_secs: settings.classification_cache_ttl,
                    use_default_skip_patterns: settings.classification_use_default_skip_patterns,
                },
            ))
        });

        Ok(Self {
            queue,
            dlq,
            llm,
            store,
            vectors,
            embedder,
            deduplicator,
            entity_extractor,
            classifier,
            metrics: Arc::new(PipelineMetrics::new()),
            settings,
        })
    }

    /// Extractor configuration derived from settings
    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            max_chunk_size: self.settings.extraction_max_chunk_size,
            chunk_overlap: self.settings.extraction_chunk_overlap,
            max_concurrent_chunks: self.settings.extraction_max_concurrent_chunks,
            max_chunk_retries: self.settings.llm_max_retries,
            retry_backoff_min_secs: self.settings.llm_retry_backoff_min,
            retry_backoff_max_secs: self.settings.llm_retry_backoff_max,
        }
    }
}
