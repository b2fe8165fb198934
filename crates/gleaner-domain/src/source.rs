//! Source documents

use crate::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    /// Created by a crawl/scrape job, content not yet fetched
    Pending,
    /// Content populated by the fetcher
    Ready,
    /// Consumed by the extraction pipeline
    Extracted,
    /// Fetch or extraction gave up on this source
    Failed,
}

impl SourceStatus {
    /// Lowercase name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Ready => "ready",
            SourceStatus::Extracted => "extracted",
            SourceStatus::Failed => "failed",
        }
    }
}

impl FromStr for SourceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SourceStatus::Pending),
            "ready" => Ok(SourceStatus::Ready),
            "extracted" => Ok(SourceStatus::Extracted),
            "failed" => Ok(SourceStatus::Failed),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// Where a source came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Fetched from the web (crawl or targeted scrape)
    Web,
    /// Uploaded or converted file (e.g. PDF)
    File,
}

/// A fetched document within a project
///
/// Invariants: `uri` is unique within the project; `status == Extracted`
/// implies non-empty `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Unique identifier
    pub id: Uuid,
    /// Owning project
    pub project_id: Uuid,
    /// URI, unique within the project
    pub uri: String,
    /// Coarse grouping key, typically a company name
    pub source_group: String,
    /// Origin of the document
    pub kind: SourceKind,
    /// Lifecycle status
    pub status: SourceStatus,
    /// Rendered text/markdown content
    #[serde(default)]
    pub content: Option<String>,
    /// Raw fetched content before rendering
    #[serde(default)]
    pub raw_content: Option<String>,
    /// Page title, when known
    #[serde(default)]
    pub title: Option<String>,
    /// Outbound links discovered during fetch
    #[serde(default)]
    pub links: Option<Vec<String>>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Optional page-type label from classification
    #[serde(default)]
    pub page_type: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// Create a pending source
    pub fn new(project_id: Uuid, uri: impl Into<String>, source_group: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            uri: uri.into(),
            source_group: source_group.into(),
            kind: SourceKind::Web,
            status: SourceStatus::Pending,
            content: None,
            raw_content: None,
            title: None,
            links: None,
            metadata: serde_json::Value::Null,
            page_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the source carries usable content
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SourceStatus::Pending,
            SourceStatus::Ready,
            SourceStatus::Extracted,
            SourceStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SourceStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<SourceStatus>().is_err());
    }

    #[test]
    fn test_has_content_rejects_whitespace() {
        let mut source = Source::new(Uuid::new_v4(), "https://example.com", "Acme");
        assert!(!source.has_content());
        source.content = Some("   \n".to_string());
        assert!(!source.has_content());
        source.content = Some("# Page".to_string());
        assert!(source.has_content());
    }
}
