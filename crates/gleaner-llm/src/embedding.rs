//! Embedding and rerank client
//!
//! Talks to an OpenAI-compatible embedding host. Reranking uses the
//! `/rerank` endpoint on the same host, which returns
//! `{"results": [{"index": 0, "relevance_score": 0.9}, ...]}`.

use crate::LlmError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// Embedding vector dimension (BGE-large-en)
pub const EMBEDDING_DIMENSION: usize = 1024;

/// Attempts made per call before giving up
const MAX_ATTEMPTS: u32 = 3;

/// Embedding and rerank transport
#[async_trait]
pub trait EmbeddingApi: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Embed a batch of texts in one call
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    /// Score documents against a query; returns (index, score) sorted by
    /// score descending
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<(usize, f32)>, LlmError>;

    /// Vector dimension produced by `embed`
    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Client for the embedding host
pub struct EmbeddingClient {
    base_url: String,
    api_key: String,
    model: String,
    reranker_model: String,
    client: reqwest::Client,
}

impl EmbeddingClient {
    /// Create a client for the given host
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        reranker_model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client builds");
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            reranker_model: reranker_model.into(),
            client,
        }
    }

    /// POST with retry on transport errors and 5xx, exponential backoff
    async fn post_with_retry(
        &self,
        kind: &'static str,
        url: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, LlmError> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < MAX_ATTEMPTS {
            match self
                .client
                .post(url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<failed to read body>".to_string());
                    let error = LlmError::Api { kind, status, message };
                    // Client errors are not retryable
                    if status < 500 {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
                Err(e) => {
                    last_error = Some(LlmError::Communication(format!("{kind} request failed: {e}")));
                }
            }

            attempt += 1;
            if attempt < MAX_ATTEMPTS {
                let delay = Duration::from_secs(2u64.pow(attempt));
                warn!(kind, attempt, delay_secs = delay.as_secs(), "embedding host retry");
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Communication("max retries exceeded".to_string())))
    }
}

#[async_trait]
impl EmbeddingApi for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| LlmError::InvalidResponse("embedding response was empty".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": texts });
        let response = self.post_with_retry("embedding", &url, body).await?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("embedding response parse: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(LlmError::InvalidResponse(format!(
                "embedding count mismatch: sent {}, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<(usize, f32)>, LlmError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.base_url);
        let body = json!({
            "model": self.reranker_model,
            "query": query,
            "documents": documents,
        });
        let response = self.post_with_retry("rerank", &url, body).await?;

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("rerank response parse: {e}")))?;

        let mut ranked: Vec<(usize, f32)> = parsed
            .results
            .into_iter()
            .map(|r| (r.index, r.relevance_score))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked)
    }
}

/// Cosine similarity between two vectors of equal length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_orthogonal_and_identical() {
        let x = vec![1.0, 0.0, 0.0];
        let y = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&x, &x) > 0.999);
        assert!(cosine_similarity(&x, &y).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let x = vec![0.0, 0.0];
        let y = vec![1.0, 0.0];
        assert_eq!(cosine_similarity(&x, &y), 0.0);
    }

    #[tokio::test]
    async fn test_embed_batch_empty_is_noop() {
        let client = EmbeddingClient::new("http://127.0.0.1:9", "key", "bge-large-en", "bge-reranker-v2-m3");
        let vectors = client.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
