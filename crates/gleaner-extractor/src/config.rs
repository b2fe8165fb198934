//! Configuration for the extraction layer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for chunking and orchestration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Maximum chunk size (characters)
    pub max_chunk_size: usize,

    /// Characters of trailing context carried into the next chunk when a
    /// section has to be split
    pub chunk_overlap: usize,

    /// Concurrent chunk extractions per field group
    pub max_concurrent_chunks: usize,

    /// Attempts per chunk before it contributes nothing
    pub max_chunk_retries: u32,

    /// Minimum retry backoff (seconds)
    pub retry_backoff_min_secs: u64,

    /// Maximum retry backoff (seconds)
    pub retry_backoff_max_secs: u64,
}

impl ExtractorConfig {
    /// Backoff delay for the given attempt (0-based), exponential and bounded
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .retry_backoff_min_secs
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_secs(exp.min(self.retry_backoff_max_secs))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_size == 0 {
            return Err("max_chunk_size must be greater than 0".to_string());
        }
        if self.chunk_overlap >= self.max_chunk_size {
            return Err("chunk_overlap must be smaller than max_chunk_size".to_string());
        }
        if self.max_concurrent_chunks == 0 {
            return Err("max_concurrent_chunks must be greater than 0".to_string());
        }
        if self.retry_backoff_min_secs > self.retry_backoff_max_secs {
            return Err("retry_backoff_min_secs cannot exceed retry_backoff_max_secs".to_string());
        }
        Ok(())
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {e}"))
    }

    /// Serialize configuration to a TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {e}"))
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 4096,
            chunk_overlap: 256,
            max_concurrent_chunks: 80,
            max_chunk_retries: 3,
            retry_backoff_min_secs: 2,
            retry_backoff_max_secs: 30,
        }
    }
}
