//! Deterministic mock transports for tests
//!
//! Downstream crates exercise the worker, orchestrator, and pipeline against
//! these instead of live hosts.

use crate::chat::{ChatApi, ChatOutcome, ChatRequest};
use crate::embedding::{cosine_similarity, EmbeddingApi};
use crate::LlmError;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted chat transport
///
/// Responses are served in order; the last one repeats once the script runs
/// out. `fail_first` injects communication errors before any response is
/// served, for retry-path tests.
pub struct MockChatApi {
    responses: Mutex<Vec<ChatOutcome>>,
    calls: AtomicUsize,
    fail_first: AtomicUsize,
}

impl MockChatApi {
    /// Serve the given content for every request
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(vec![ChatOutcome {
                content: content.into(),
                finish_reason: Some("stop".to_string()),
            }]),
            calls: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
        }
    }

    /// Serve scripted outcomes in order
    pub fn with_script(outcomes: Vec<ChatOutcome>) -> Self {
        Self {
            responses: Mutex::new(outcomes),
            calls: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` calls with a communication error
    pub fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// How many completions were attempted
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatOutcome, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first.load(Ordering::SeqCst) {
            return Err(LlmError::Communication("injected failure".to_string()));
        }
        let responses = self.responses.lock().expect("mock lock");
        let index = call
            .saturating_sub(self.fail_first.load(Ordering::SeqCst))
            .min(responses.len().saturating_sub(1));
        responses
            .get(index)
            .cloned()
            .ok_or_else(|| LlmError::InvalidResponse("mock has no responses".to_string()))
    }
}

/// Hash-based deterministic embeddings
///
/// The same text always produces the same unit vector, and token overlap
/// produces correlated vectors, which is enough for dedup and classifier
/// tests without model files.
pub struct MockEmbeddingApi {
    dimension: usize,
}

impl MockEmbeddingApi {
    /// Create a mock with the given vector dimension
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let seed = hasher.finish();
            let index = (seed as usize) % self.dimension;
            let sign = if seed & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingApi for MockEmbeddingApi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<(usize, f32)>, LlmError> {
        let query_vector = self.embed_sync(query);
        let mut ranked: Vec<(usize, f32)> = documents
            .iter()
            .enumerate()
            .map(|(i, d)| (i, cosine_similarity(&query_vector, &self.embed_sync(d))))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.1,
            max_tokens: 64,
            response_format: None,
        }
    }

    #[tokio::test]
    async fn test_mock_chat_fail_then_succeed() {
        let chat = MockChatApi::new("{}").failing_first(2);
        assert!(chat.complete(request()).await.is_err());
        assert!(chat.complete(request()).await.is_err());
        assert!(chat.complete(request()).await.is_ok());
        assert_eq!(chat.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let embedder = MockEmbeddingApi::new(64);
        let a = embedder.embed("Paris is the capital of France").await.unwrap();
        let b = embedder.embed("Paris is the capital of France").await.unwrap();
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embedding_distinct_texts_diverge() {
        let embedder = MockEmbeddingApi::new(64);
        let a = embedder.embed("gearbox manufacturing plant").await.unwrap();
        let b = embedder.embed("privacy policy cookie banner").await.unwrap();
        assert!(cosine_similarity(&a, &b) < 0.9);
    }
}
