//! Generic fact extraction
//!
//! The profile-driven path for projects without an extraction schema: chunk
//! the document, pull (fact, category, confidence) triples from each chunk,
//! stamp the header breadcrumb onto facts the model left without context,
//! and drop exact duplicates.

use crate::chunking::MarkdownChunker;
use crate::config::ExtractorConfig;
use crate::prompt::fact_prompts;
use crate::ExtractorError;
use async_trait::async_trait;
use gleaner_domain::RequestPayload;
use gleaner_queue::QueueLlmClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// A named extraction profile for the generic pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionProfile {
    /// Profile name
    pub name: String,
    /// Fact categories the profile cares about
    pub categories: Vec<String>,
    /// Focus statement injected into the system prompt
    pub prompt_focus: String,
    /// Depth hint ("summary", "detailed", ...)
    pub depth: String,
    /// Extra operator-supplied instructions
    #[serde(default)]
    pub custom_instructions: Option<String>,
    /// Whether the profile ships with the system
    #[serde(default)]
    pub is_builtin: bool,
}

impl ExtractionProfile {
    /// The built-in fallback profile
    pub fn general() -> Self {
        Self {
            name: "general".to_string(),
            categories: vec![
                "general".to_string(),
                "features".to_string(),
                "technical".to_string(),
                "integration".to_string(),
            ],
            prompt_focus: "General technical facts about the product, features, integrations, and capabilities".to_string(),
            depth: "detailed".to_string(),
            custom_instructions: None,
            is_builtin: true,
        }
    }
}

/// One extracted fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFact {
    /// The fact statement
    pub fact: String,
    /// Category from the profile
    pub category: String,
    /// Model confidence in [0, 1]
    #[serde(default = "default_fact_confidence")]
    pub confidence: f64,
    /// Enclosing section, from the model or the chunk breadcrumb
    #[serde(default)]
    pub header_context: Option<String>,
}

fn default_fact_confidence() -> f64 {
    0.8
}

/// Result of fact extraction over one source
#[derive(Debug, Clone)]
pub struct FactExtractionResult {
    /// Source the facts came from
    pub source_id: Uuid,
    /// Unique facts in document order
    pub facts: Vec<ExtractedFact>,
    /// How many chunks were processed
    pub chunks_processed: usize,
    /// Wall time, milliseconds (at least 1)
    pub extraction_time_ms: u64,
}

/// Seam for the chunk-level fact call
#[async_trait]
pub trait FactExtractor: Send + Sync {
    /// Extract facts from one chunk under a profile
    async fn extract_facts(
        &self,
        content: &str,
        profile: &ExtractionProfile,
    ) -> Result<Vec<ExtractedFact>, ExtractorError>;
}

#[async_trait]
impl FactExtractor for QueueLlmClient {
    async fn extract_facts(
        &self,
        content: &str,
        profile: &ExtractionProfile,
    ) -> Result<Vec<ExtractedFact>, ExtractorError> {
        let payload = RequestPayload::ExtractFacts {
            prompts: fact_prompts(profile, content),
            content: content.to_string(),
            categories: profile.categories.clone(),
            profile_name: profile.name.clone(),
        };
        let result = self.request(payload).await?;
        parse_facts(&result)
    }
}

/// Parse a `{"facts": [...]}` payload
pub(crate) fn parse_facts(value: &Value) -> Result<Vec<ExtractedFact>, ExtractorError> {
    let list = value
        .get("facts")
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractorError::InvalidPayload("missing facts list".to_string()))?;
    let mut facts = Vec::with_capacity(list.len());
    for item in list {
        let fact: ExtractedFact = serde_json::from_value(item.clone())
            .map_err(|e| ExtractorError::InvalidPayload(format!("bad fact entry: {e}")))?;
        facts.push(fact);
    }
    Ok(facts)
}

/// Orchestrates fact extraction: chunking → LLM → merge
pub struct FactOrchestrator<F: FactExtractor> {
    extractor: F,
    chunker: MarkdownChunker,
}

impl<F: FactExtractor> FactOrchestrator<F> {
    /// Create an orchestrator
    pub fn new(extractor: F, config: &ExtractorConfig) -> Self {
        let chunker = MarkdownChunker::new(config.max_chunk_size, config.chunk_overlap);
        Self { extractor, chunker }
    }

    /// Extract unique facts from the whole document
    pub async fn extract(
        &self,
        source_id: Uuid,
        markdown: &str,
        profile: &ExtractionProfile,
    ) -> Result<FactExtractionResult, ExtractorError> {
        let started = Instant::now();

        if markdown.trim().is_empty() {
            return Ok(FactExtractionResult {
                source_id,
                facts: Vec::new(),
                chunks_processed: 0,
                extraction_time_ms: started.elapsed().as_millis().max(1) as u64,
            });
        }

        let chunks = self.chunker.chunk(markdown);
        let mut all_facts = Vec::new();

        for chunk in &chunks {
            let mut chunk_facts = self.extractor.extract_facts(&chunk.content, profile).await?;
            for fact in &mut chunk_facts {
                if fact.header_context.is_none() && !chunk.header_path.is_empty() {
                    fact.header_context = Some(chunk.breadcrumb());
                }
            }
            debug!(chunk = chunk.index, facts = chunk_facts.len(), "chunk facts extracted");
            all_facts.extend(chunk_facts);
        }

        let facts = deduplicate_exact(all_facts);
        info!(
            source_id = %source_id,
            chunks = chunks.len(),
            facts = facts.len(),
            "fact extraction complete"
        );

        Ok(FactExtractionResult {
            source_id,
            facts,
            chunks_processed: chunks.len(),
            extraction_time_ms: started.elapsed().as_millis().max(1) as u64,
        })
    }
}

/// Drop exact (fact, category) duplicates, keeping first occurrences
fn deduplicate_exact(facts: Vec<ExtractedFact>) -> Vec<ExtractedFact> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    facts
        .into_iter()
        .filter(|f| seen.insert((f.fact.clone(), f.category.clone())))
        .collect()
}
