//! Background jobs and checkpoints

use crate::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of background work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Targeted page fetch
    Scrape,
    /// Site crawl
    Crawl,
    /// Extraction run over a project's sources
    Extract,
    /// Report materialisation
    Report,
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to run
    Queued,
    /// In progress
    Running,
    /// Cancellation requested; no new work is started
    Cancelling,
    /// Finished; may still carry a non-empty error count for partial failures
    Completed,
    /// Could not make any progress
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl JobStatus {
    /// Whether the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Lowercase name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "cancelling" => Ok(JobStatus::Cancelling),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// Resume state written into `job.payload.checkpoint` after each chunk of
/// sources commits
///
/// Only ids of sources that processed successfully are recorded, so failed
/// sources are retried on resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Sources already processed successfully
    pub processed_source_ids: Vec<Uuid>,
    /// Extractions created so far
    pub total_extractions: u64,
    /// Entities created so far
    pub total_entities: u64,
    /// When the checkpoint was written (ISO-8601 with offset)
    pub last_checkpoint_at: DateTime<Utc>,
}

/// A background job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub id: Uuid,
    /// Owning project, when project-scoped
    #[serde(default)]
    pub project_id: Option<Uuid>,
    /// Kind of work
    pub kind: JobKind,
    /// Lifecycle status
    pub status: JobStatus,
    /// Scheduling priority (higher first)
    #[serde(default)]
    pub priority: i32,
    /// Job parameters; mutated while running to carry the checkpoint
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Result summary written at completion
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error message for failed jobs
    #[serde(default)]
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the job started running
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job
    pub fn new(kind: JobKind, project_id: Option<Uuid>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            kind,
            status: JobStatus::Queued,
            priority: 0,
            payload,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Read the checkpoint out of the payload, if one was written
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.payload
            .get("checkpoint")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Write a checkpoint into the payload, preserving other fields
    pub fn set_checkpoint(&mut self, checkpoint: &Checkpoint) {
        let value = serde_json::to_value(checkpoint).unwrap_or(serde_json::Value::Null);
        match &mut self.payload {
            serde_json::Value::Object(map) => {
                map.insert("checkpoint".to_string(), value);
            }
            other => {
                *other = serde_json::json!({ "checkpoint": value });
            }
        }
    }

    /// Ids to skip on resume; `None` when there is no usable checkpoint
    pub fn resume_from(&self) -> Option<Vec<Uuid>> {
        let checkpoint = self.checkpoint()?;
        if checkpoint.processed_source_ids.is_empty() {
            return None;
        }
        Some(checkpoint.processed_source_ids)
    }
}
