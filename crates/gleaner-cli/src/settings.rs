//! Process settings
//!
//! Every option is loadable from the environment with the `KE_` prefix
//! (`KE_REDIS_URL`, `KE_LLM_MODEL`, ...); scraper options additionally
//! accept the bare `CAMOUFOX_` prefix for compatibility with existing
//! deployments. `api_key` is the only required setting, and a weak one
//! refuses to start the process.

use figment::providers::{Env, Serialized};
use figment::Figment;
use gleaner_scraper::ScraperConfig;
use serde::{Deserialize, Serialize};

/// API keys nobody should be running with
const INSECURE_API_KEYS: &[&str] = &[
    "dev-key-change-in-production",
    "changeme",
    "test",
    "dev",
    "development",
];

/// All process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// API key for the outer HTTP surface (required, ≥ 16 chars)
    pub api_key: String,

    // Backends
    /// Redis connection URL (queue, DLQ, caches)
    pub redis_url: String,
    /// Qdrant URL (vector store)
    pub qdrant_url: String,
    /// SQLite database path (metadata store)
    pub database_path: String,

    // LLM hosts
    /// OpenAI-compatible chat host base URL
    pub llm_base_url: String,
    /// Embedding host base URL (also serves /rerank)
    pub embedding_base_url: String,
    /// API key for both hosts
    pub llm_api_key: String,
    /// Chat model for extraction
    pub llm_model: String,
    /// Embedding model
    pub embedding_model: String,
    /// Reranker model
    pub reranker_model: String,

    // LLM behaviour
    /// Token cap per completion
    pub llm_max_tokens: u32,
    /// Attempts before a request dead-letters
    pub llm_max_retries: u32,
    /// Minimum chunk-retry backoff, seconds
    pub llm_retry_backoff_min: u64,
    /// Maximum chunk-retry backoff, seconds
    pub llm_retry_backoff_max: u64,
    /// Base sampling temperature
    pub llm_base_temperature: f32,
    /// Temperature added per retry
    pub llm_retry_temperature_increment: f32,
    /// Request lifetime and caller wait, seconds
    pub llm_request_timeout: i64,

    // Queue and worker
    /// Initial worker concurrency
    pub llm_worker_concurrency: usize,
    /// Adaptive concurrency lower bound
    pub llm_worker_min_concurrency: usize,
    /// Adaptive concurrency upper bound
    pub llm_worker_max_concurrency: usize,
    /// Queue depth at which submissions fail
    pub llm_queue_max_depth: u64,
    /// Queue depth driving backpressure status
    pub llm_queue_backpressure_threshold: u64,
    /// Response key TTL, seconds
    pub llm_response_ttl: u64,
    /// Waiter poll interval, milliseconds
    pub llm_poll_interval_ms: u64,

    // Extraction
    /// Concurrent chunk extractions per field group
    pub extraction_max_concurrent_chunks: usize,
    /// Concurrent sources in a batch
    pub extraction_max_concurrent_sources: usize,
    /// Sources per checkpoint chunk
    pub extraction_checkpoint_chunk_size: usize,
    /// Chunk size, characters
    pub extraction_max_chunk_size: usize,
    /// Chunk overlap, characters
    pub extraction_chunk_overlap: usize,
    /// Vector-similarity duplicate threshold
    pub dedup_threshold: f32,

    // Classification
    /// Enable embedding-based smart classification
    pub smart_classification_enabled: bool,
    /// High-confidence similarity threshold
    pub classification_embedding_high_threshold: f64,
    /// Below this, all groups run
    pub classification_embedding_low_threshold: f64,
    /// Reranker keep threshold
    pub classification_reranker_threshold: f64,
    /// Group-embedding cache TTL, seconds
    pub classification_cache_ttl: u64,
    /// Force built-in skip patterns when a project declares none
    pub classification_use_default_skip_patterns: bool,

    // Smart merge
    /// Candidate cap per merged column
    pub smart_merge_max_candidates: usize,
    /// Minimum candidate confidence
    pub smart_merge_min_confidence: f64,

    // Scraper (also reachable via CAMOUFOX_*)
    /// Browser pool configuration
    pub scraper: ScraperConfig,

    // Alerting
    /// Webhook for operator alerts; log-only when unset
    pub alert_webhook_url: Option<String>,
    /// Webhook payload format: "json" or "slack"
    pub alert_webhook_format: String,

    // Logging
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format: "json" or "pretty"
    pub log_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            redis_url: "redis://localhost:6379".to_string(),
            qdrant_url: "http://localhost:6334".to_string(),
            database_path: "gleaner.db".to_string(),
            llm_base_url: "http://localhost:9003/v1".to_string(),
            embedding_base_url: "http://localhost:9004/v1".to_string(),
            llm_api_key: "ollama".to_string(),
            llm_model: "Qwen3-30B-A3B-Instruct-4bit".to_string(),
            embedding_model: "bge-large-en".to_string(),
            reranker_model: "bge-reranker-v2-m3".to_string(),
            llm_max_tokens: 8192,
            llm_max_retries: 3,
            llm_retry_backoff_min: 2,
            llm_retry_backoff_max: 30,
            llm_base_temperature: 0.1,
            llm_retry_temperature_increment: 0.05,
            llm_request_timeout: 300,
            llm_worker_concurrency: 10,
            llm_worker_min_concurrency: 5,
            llm_worker_max_concurrency: 50,
            llm_queue_max_depth: 1000,
            llm_queue_backpressure_threshold: 500,
            llm_response_ttl: 300,
            llm_poll_interval_ms: 100,
            extraction_max_concurrent_chunks: 80,
            extraction_max_concurrent_sources: 10,
            extraction_checkpoint_chunk_size: 20,
            extraction_max_chunk_size: 4096,
            extraction_chunk_overlap: 256,
            dedup_threshold: 0.90,
            smart_classification_enabled: false,
            classification_embedding_high_threshold: 0.75,
            classification_embedding_low_threshold: 0.4,
            classification_reranker_threshold: 0.5,
            classification_cache_ttl: 86_400,
            classification_use_default_skip_patterns: false,
            smart_merge_max_candidates: 100,
            smart_merge_min_confidence: 0.3,
            scraper: ScraperConfig::default(),
            alert_webhook_url: None,
            alert_webhook_format: "json".to_string(),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the environment over the defaults
    pub fn load() -> Result<Self, String> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed("KE_").split("__"))
            .merge(
                Env::prefixed("CAMOUFOX_")
                    .map(|key| format!("scraper.{}", key.as_str().to_lowercase()).into())
                    .split("."),
            )
            .extract()
            .map_err(|e| format!("configuration error: {e}"))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Fail fast on configuration an operator must not run with
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.is_empty() {
            return Err("API_KEY must be set (KE_API_KEY)".to_string());
        }
        if INSECURE_API_KEYS.contains(&self.api_key.to_lowercase().as_str()) {
            return Err(format!(
                "insecure API key '{}'; set a strong KE_API_KEY",
                self.api_key
            ));
        }
        if self.api_key.len() < 16 {
            return Err("API key must be at least 16 characters".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "invalid log level '{}'; must be one of {valid_levels:?}",
                self.log_level
            ));
        }

        if self.classification_embedding_high_threshold
            <= self.classification_embedding_low_threshold
        {
            return Err(format!(
                "classification_embedding_high_threshold ({}) must be greater than \
                 classification_embedding_low_threshold ({})",
                self.classification_embedding_high_threshold,
                self.classification_embedding_low_threshold
            ));
        }

        if !(0.0..=1.0).contains(&self.dedup_threshold) {
            return Err("dedup_threshold must be in [0, 1]".to_string());
        }

        self.scraper.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        Settings {
            api_key: "a-sufficiently-long-key".to_string(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_valid_settings_pass() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(Settings::default().validate().is_err());
    }

    #[test]
    fn test_short_api_key_rejected() {
        let settings = Settings { api_key: "short".to_string(), ..Settings::default() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_known_insecure_keys_rejected() {
        for key in ["changeme", "dev-key-change-in-production", "TEST"] {
            let settings = Settings { api_key: key.to_string(), ..Settings::default() };
            let err = settings.validate().unwrap_err();
            assert!(err.contains("insecure") || err.contains("16"), "{err}");
        }
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let settings = Settings { log_level: "verbose".to_string(), ..valid() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let settings = Settings {
            classification_embedding_high_threshold: 0.3,
            classification_embedding_low_threshold: 0.4,
            ..valid()
        };
        assert!(settings.validate().is_err());
    }
}
