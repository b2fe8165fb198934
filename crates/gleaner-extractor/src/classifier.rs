//! Smart page classification
//!
//! Decides which field groups to run for a page before any LLM work is
//! spent: rule-based URL skipping first, then embedding similarity between a
//! page summary and each group, then a reranker pass for the ambiguous
//! middle band.

use crate::ExtractorError;
use gleaner_domain::{ClassificationConfig, FieldGroup};
use gleaner_llm::{cosine_similarity, EmbeddingApi};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use regex::Regex;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};

/// URL fragments that mark pages not worth extracting
pub const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    "/careers",
    "/jobs",
    "/privacy",
    "/terms",
    "/imprint",
    "/impressum",
    "/cookie",
    "/login",
    "/signin",
    "/signup",
    "/register",
    "/cart",
    "/checkout",
    "/news/",
    "/blog/",
    "/press/",
    "/sitemap",
];

/// How far into the content the page summary reaches
const SUMMARY_CONTENT_CHARS: usize = 1000;

/// Which stage produced the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    /// A skip pattern matched the URL
    RuleBased,
    /// Embedding similarity alone was decisive
    Embedding,
    /// The reranker resolved a mid-band similarity
    Reranker,
}

/// Outcome of classifying one page
#[derive(Debug, Clone, Serialize)]
pub struct SmartClassification {
    /// True when the page should not be extracted at all
    pub skip_extraction: bool,
    /// Coarse label ("skip" for rule-based skips)
    pub page_type: Option<String>,
    /// Groups worth running; empty means "use all groups"
    pub relevant_groups: Vec<String>,
    /// Confidence of the decision
    pub confidence: f64,
    /// Stage that decided
    pub method: ClassificationMethod,
    /// Human-readable explanation
    pub reasoning: String,
}

/// Classifier tuning knobs
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Whether embedding classification runs at all
    pub enabled: bool,
    /// Similarity at or above this is a confident match
    pub high_threshold: f64,
    /// Best similarity below this means "use all groups"
    pub low_threshold: f64,
    /// Reranker score needed to keep a group
    pub reranker_threshold: f64,
    /// TTL for cached group embeddings, seconds
    pub cache_ttl_secs: u64,
    /// Force the built-in skip patterns when a project has none
    pub use_default_skip_patterns: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            high_threshold: 0.75,
            low_threshold: 0.4,
            reranker_threshold: 0.5,
            cache_ttl_secs: 86_400,
            use_default_skip_patterns: false,
        }
    }
}

impl ClassifierConfig {
    /// Validate threshold ordering
    pub fn validate(&self) -> Result<(), String> {
        if self.high_threshold <= self.low_threshold {
            return Err(format!(
                "high_threshold ({}) must be greater than low_threshold ({})",
                self.high_threshold, self.low_threshold
            ));
        }
        Ok(())
    }
}

/// Resolve which skip patterns apply
///
/// An explicit non-empty list wins; an explicit empty list disables
/// skipping; absent patterns fall back to the defaults only when smart
/// classification is disabled or the operator forces them.
pub(crate) fn resolve_skip_patterns<'a>(
    project: Option<&'a ClassificationConfig>,
    config: &ClassifierConfig,
) -> Vec<&'a str> {
    match project.and_then(|c| c.skip_patterns.as_ref()) {
        Some(patterns) => patterns.iter().map(String::as_str).collect(),
        None => {
            if config.use_default_skip_patterns || !config.enabled {
                DEFAULT_SKIP_PATTERNS.to_vec()
            } else {
                Vec::new()
            }
        }
    }
}

fn url_matches(url: &str, pattern: &str) -> bool {
    let lowered = url.to_lowercase();
    match Regex::new(pattern) {
        Ok(re) => re.is_match(&lowered),
        // Patterns that are not valid regexes match as substrings
        Err(_) => lowered.contains(&pattern.to_lowercase()),
    }
}

/// Embedding- and reranker-based page classifier
pub struct SmartClassifier {
    embedder: Arc<dyn EmbeddingApi>,
    cache: Option<ConnectionManager>,
    config: ClassifierConfig,
}

impl SmartClassifier {
    /// Create a classifier; `cache` holds field-group embeddings across runs
    pub fn new(
        embedder: Arc<dyn EmbeddingApi>,
        cache: Option<ConnectionManager>,
        config: ClassifierConfig,
    ) -> Self {
        Self { embedder, cache, config }
    }

    /// Classify a page against the project's field groups
    pub async fn classify(
        &self,
        url: &str,
        title: &str,
        content: &str,
        field_groups: &[FieldGroup],
        project_config: Option<&ClassificationConfig>,
    ) -> Result<SmartClassification, ExtractorError> {
        // Stage 1: rule-based URL skip
        let patterns = resolve_skip_patterns(project_config, &self.config);
        if let Some(pattern) = patterns.iter().find(|p| url_matches(url, p)) {
            return Ok(SmartClassification {
                skip_extraction: true,
                page_type: Some("skip".to_string()),
                relevant_groups: Vec::new(),
                confidence: 1.0,
                method: ClassificationMethod::RuleBased,
                reasoning: format!("URL matched skip pattern '{pattern}'"),
            });
        }

        if !self.config.enabled || field_groups.is_empty() {
            return Ok(use_all_groups(
                ClassificationMethod::Embedding,
                "Smart classification disabled",
            ));
        }

        // Stage 2: embedding similarity
        let prefix: String = content.chars().take(SUMMARY_CONTENT_CHARS).collect();
        let summary = format!("{title} {url} {prefix}");
        let page_embedding = self.embedder.embed(&summary).await?;

        let group_texts: Vec<String> =
            field_groups.iter().map(|g| g.classification_text()).collect();
        let group_embeddings = self.group_embeddings(field_groups, &group_texts).await?;

        let similarities: Vec<(usize, f64)> = group_embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(&page_embedding, e) as f64))
            .collect();

        let best = similarities
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);

        let high_matches: Vec<String> = similarities
            .iter()
            .filter(|(_, s)| *s >= self.config.high_threshold)
            .map(|(i, _)| field_groups[*i].name.clone())
            .collect();
        if !high_matches.is_empty() {
            return Ok(SmartClassification {
                skip_extraction: false,
                page_type: None,
                relevant_groups: high_matches,
                confidence: best,
                method: ClassificationMethod::Embedding,
                reasoning: format!("High embedding similarity ({best:.2})"),
            });
        }

        if best < self.config.low_threshold {
            // Nothing matched convincingly; run everything rather than miss
            return Ok(use_all_groups(
                ClassificationMethod::Embedding,
                &format!("Best similarity {best:.2} below low threshold"),
            ));
        }

        // Stage 3: reranker over the ambiguous middle band
        let embedding_positive: Vec<String> = similarities
            .iter()
            .filter(|(_, s)| *s >= self.config.low_threshold)
            .map(|(i, _)| field_groups[*i].name.clone())
            .collect();

        match self.embedder.rerank(&summary, &group_texts).await {
            Ok(ranked) => {
                let kept: Vec<String> = ranked
                    .iter()
                    .filter(|(_, score)| *score as f64 >= self.config.reranker_threshold)
                    .map(|(i, _)| field_groups[*i].name.clone())
                    .collect();
                let top = ranked.first().map(|(_, s)| *s as f64).unwrap_or(0.0);
                Ok(SmartClassification {
                    skip_extraction: false,
                    page_type: None,
                    relevant_groups: kept,
                    confidence: top,
                    method: ClassificationMethod::Reranker,
                    reasoning: format!("Reranker resolved mid-band similarity ({best:.2})"),
                })
            }
            Err(e) => {
                warn!(error = %e, "reranker failed, falling back to embedding matches");
                Ok(SmartClassification {
                    skip_extraction: false,
                    page_type: None,
                    relevant_groups: embedding_positive,
                    confidence: best,
                    method: ClassificationMethod::Embedding,
                    reasoning: "Reranker unavailable, embedding fallback".to_string(),
                })
            }
        }
    }

    /// Group embeddings, through the cache when one is configured
    ///
    /// Cached entries are keyed by a hash of the classification text, so a
    /// schema edit naturally invalidates them. Misses are embedded in one
    /// batch call and written back.
    async fn group_embeddings(
        &self,
        field_groups: &[FieldGroup],
        group_texts: &[String],
    ) -> Result<Vec<Vec<f32>>, ExtractorError> {
        let Some(cache) = &self.cache else {
            return Ok(self.embedder.embed_batch(group_texts).await?);
        };
        let mut con = cache.clone();

        let keys: Vec<String> = field_groups
            .iter()
            .zip(group_texts)
            .map(|(g, text)| cache_key(&g.name, text))
            .collect();

        let cached: Vec<Option<String>> = match con.mget(&keys).await {
            Ok(values) => values,
            Err(e) => {
                // Cache trouble degrades to a plain batch call
                warn!(error = %e, "embedding cache read failed");
                vec![None; keys.len()]
            }
        };

        let mut embeddings: Vec<Option<Vec<f32>>> = cached
            .into_iter()
            .map(|raw| raw.and_then(|r| serde_json::from_str(&r).ok()))
            .collect();

        let miss_indices: Vec<usize> = embeddings
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_none())
            .map(|(i, _)| i)
            .collect();

        if !miss_indices.is_empty() {
            let miss_texts: Vec<String> =
                miss_indices.iter().map(|i| group_texts[*i].clone()).collect();
            let fresh = self.embedder.embed_batch(&miss_texts).await?;
            debug!(misses = miss_indices.len(), "embedding cache misses");

            for (slot, embedding) in miss_indices.iter().zip(fresh) {
                let raw = serde_json::to_string(&embedding)
                    .map_err(|e| ExtractorError::Cache(e.to_string()))?;
                if let Err(e) = con
                    .set_ex::<_, _, ()>(&keys[*slot], raw, self.config.cache_ttl_secs)
                    .await
                {
                    warn!(error = %e, "embedding cache write failed");
                }
                embeddings[*slot] = Some(embedding);
            }
        }

        Ok(embeddings.into_iter().flatten().collect())
    }
}

fn use_all_groups(method: ClassificationMethod, reasoning: &str) -> SmartClassification {
    SmartClassification {
        skip_extraction: false,
        page_type: None,
        relevant_groups: Vec::new(),
        confidence: 0.0,
        method,
        reasoning: reasoning.to_string(),
    }
}

fn cache_key(group_name: &str, text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("classification:group_embed:{group_name}:{:x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gleaner_domain::FieldDefinition;
    use gleaner_llm::LlmError;

    fn groups() -> Vec<FieldGroup> {
        ["products_gearbox", "company_info", "services"]
            .into_iter()
            .map(|name| FieldGroup {
                name: name.to_string(),
                description: format!("{name} description"),
                prompt_hint: String::new(),
                is_entity_list: false,
                entity_key: None,
                fields: vec![FieldDefinition {
                    name: "field".to_string(),
                    field_type: gleaner_domain::FieldType::Text,
                    description: String::new(),
                    required: false,
                    default: None,
                    enum_values: None,
                }],
            })
            .collect()
    }

    /// Embedder with scripted similarities against a fixed page vector
    struct ScriptedEmbedder {
        group_similarities: Vec<f32>,
        rerank_scores: Option<Vec<f32>>,
    }

    #[async_trait]
    impl EmbeddingApi for ScriptedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            // Reference vector along the first axis
            let mut v = vec![0.0; 8];
            v[0] = 1.0;
            Ok(v)
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let s = self.group_similarities[i];
                    let mut v = vec![0.0; 8];
                    v[0] = s;
                    v[1] = (1.0 - s * s).max(0.0).sqrt();
                    v
                })
                .collect())
        }

        async fn rerank(
            &self,
            _query: &str,
            documents: &[String],
        ) -> Result<Vec<(usize, f32)>, LlmError> {
            match &self.rerank_scores {
                Some(scores) => {
                    let mut ranked: Vec<(usize, f32)> =
                        documents.iter().enumerate().map(|(i, _)| (i, scores[i])).collect();
                    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
                    Ok(ranked)
                }
                None => Err(LlmError::Communication("rerank down".to_string())),
            }
        }
    }

    fn classifier(similarities: Vec<f32>, rerank: Option<Vec<f32>>) -> SmartClassifier {
        SmartClassifier::new(
            Arc::new(ScriptedEmbedder { group_similarities: similarities, rerank_scores: rerank }),
            None,
            ClassifierConfig { enabled: true, ..ClassifierConfig::default() },
        )
    }

    #[tokio::test]
    async fn test_career_pages_skip_via_defaults_when_disabled() {
        let classifier = SmartClassifier::new(
            Arc::new(ScriptedEmbedder { group_similarities: vec![], rerank_scores: None }),
            None,
            ClassifierConfig { enabled: false, ..ClassifierConfig::default() },
        );
        let result = classifier
            .classify("https://example.com/careers/engineer", "Jobs", "Join us", &groups(), None)
            .await
            .unwrap();
        assert!(result.skip_extraction);
        assert_eq!(result.page_type.as_deref(), Some("skip"));
        assert_eq!(result.method, ClassificationMethod::RuleBased);
    }

    #[tokio::test]
    async fn test_explicit_empty_patterns_disable_skipping() {
        let classifier = SmartClassifier::new(
            Arc::new(ScriptedEmbedder { group_similarities: vec![0.1, 0.1, 0.1], rerank_scores: None }),
            None,
            ClassifierConfig { enabled: true, ..ClassifierConfig::default() },
        );
        let project = ClassificationConfig { skip_patterns: Some(vec![]) };
        let result = classifier
            .classify("https://example.com/careers", "Jobs", "text", &groups(), Some(&project))
            .await
            .unwrap();
        assert!(!result.skip_extraction);
    }

    #[tokio::test]
    async fn test_null_patterns_with_smart_enabled_skip_nothing() {
        let classifier = classifier(vec![0.1, 0.1, 0.1], None);
        let result = classifier
            .classify("https://example.com/careers", "Jobs", "text", &groups(), None)
            .await
            .unwrap();
        assert!(!result.skip_extraction);
    }

    #[tokio::test]
    async fn test_high_similarity_returns_matched_groups() {
        let classifier = classifier(vec![0.95, 0.3, 0.2], None);
        let result = classifier
            .classify(
                "https://example.com/products/gearboxes",
                "Gearbox Products",
                "Planetary gearboxes",
                &groups(),
                None,
            )
            .await
            .unwrap();
        assert!(!result.skip_extraction);
        assert_eq!(result.relevant_groups, vec!["products_gearbox"]);
        assert!(result.confidence >= 0.75);
        assert_eq!(result.method, ClassificationMethod::Embedding);
    }

    #[tokio::test]
    async fn test_all_high_matches_included() {
        let classifier = classifier(vec![0.85, 0.80, 0.2], None);
        let result = classifier
            .classify("https://example.com/about", "About", "text", &groups(), None)
            .await
            .unwrap();
        assert!(result.relevant_groups.contains(&"products_gearbox".to_string()));
        assert!(result.relevant_groups.contains(&"company_info".to_string()));
        assert!(!result.relevant_groups.contains(&"services".to_string()));
    }

    #[tokio::test]
    async fn test_low_similarity_means_use_all_groups() {
        let classifier = classifier(vec![0.2, 0.1, 0.3], None);
        let result = classifier
            .classify("https://example.com/misc", "Misc", "text", &groups(), None)
            .await
            .unwrap();
        assert!(!result.skip_extraction);
        assert!(result.relevant_groups.is_empty());
    }

    #[tokio::test]
    async fn test_mid_band_uses_reranker() {
        let classifier = classifier(vec![0.6, 0.5, 0.2], Some(vec![0.9, 0.3, 0.1]));
        let result = classifier
            .classify("https://example.com/page", "Page", "text", &groups(), None)
            .await
            .unwrap();
        assert_eq!(result.method, ClassificationMethod::Reranker);
        assert_eq!(result.relevant_groups, vec!["products_gearbox"]);
    }

    #[tokio::test]
    async fn test_reranker_failure_falls_back_to_embedding_positive() {
        let classifier = classifier(vec![0.6, 0.5, 0.2], None);
        let result = classifier
            .classify("https://example.com/page", "Page", "text", &groups(), None)
            .await
            .unwrap();
        assert_eq!(result.method, ClassificationMethod::Embedding);
        assert_eq!(
            result.relevant_groups,
            vec!["products_gearbox".to_string(), "company_info".to_string()]
        );
    }

    #[test]
    fn test_pattern_resolution_precedence() {
        let config = ClassifierConfig { enabled: true, ..ClassifierConfig::default() };
        let explicit =
            ClassificationConfig { skip_patterns: Some(vec!["/internal".to_string()]) };
        assert_eq!(resolve_skip_patterns(Some(&explicit), &config), vec!["/internal"]);

        let empty = ClassificationConfig { skip_patterns: Some(vec![]) };
        assert!(resolve_skip_patterns(Some(&empty), &config).is_empty());

        // Null + smart enabled: context-agnostic
        assert!(resolve_skip_patterns(None, &config).is_empty());

        // Null + smart disabled: defaults
        let disabled = ClassifierConfig { enabled: false, ..ClassifierConfig::default() };
        assert_eq!(resolve_skip_patterns(None, &disabled).len(), DEFAULT_SKIP_PATTERNS.len());

        // Forced defaults win over smart mode
        let forced = ClassifierConfig {
            enabled: true,
            use_default_skip_patterns: true,
            ..ClassifierConfig::default()
        };
        assert!(!resolve_skip_patterns(None, &forced).is_empty());
    }
}
