//! Typed dead-letter queues
//!
//! Failed scrape, extraction, and LLM items land on bounded Redis lists.
//! Entries can be listed, counted, and popped by id for replay; an LLM
//! replay re-enters the request queue with its retry counter reset.

use crate::queue::LlmQueue;
use crate::QueueError;
use chrono::Utc;
use gleaner_domain::{DeadLetter, DeadLetterKind, LlmRequest};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

const SCRAPE_DLQ_KEY: &str = "scrape:dlq";
const EXTRACTION_DLQ_KEY: &str = "extraction:dlq";
const LLM_DLQ_KEY: &str = "llm:dlq";

/// Hard cap per list; oldest entries beyond it are trimmed away
const MAX_DLQ_ENTRIES: isize = 10_000;

/// Counts for each dead-letter list
#[derive(Debug, Clone, Serialize)]
pub struct DlqStats {
    /// Failed scrapes
    pub scrape: u64,
    /// Failed extractions
    pub extraction: u64,
    /// Failed LLM requests
    pub llm: u64,
}

/// Service over the three dead-letter lists
#[derive(Clone)]
pub struct DlqService {
    redis: ConnectionManager,
}

impl DlqService {
    /// Build the service over a shared connection manager
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(kind: DeadLetterKind) -> &'static str {
        match kind {
            DeadLetterKind::Scrape => SCRAPE_DLQ_KEY,
            DeadLetterKind::Extraction => EXTRACTION_DLQ_KEY,
            DeadLetterKind::Llm => LLM_DLQ_KEY,
        }
    }

    async fn push(&self, kind: DeadLetterKind, entry: &DeadLetter) -> Result<(), QueueError> {
        let mut con = self.redis.clone();
        let key = Self::key(kind);
        let raw = serde_json::to_string(entry)?;
        let _: i64 = con.lpush(key, raw).await?;
        let _: () = con.ltrim(key, 0, MAX_DLQ_ENTRIES - 1).await?;
        Ok(())
    }

    /// Record a scrape that gave up on a source
    pub async fn push_scrape(
        &self,
        source_id: Uuid,
        error: impl Into<String>,
        job_id: Option<Uuid>,
        retry_count: u32,
    ) -> Result<(), QueueError> {
        self.push(
            DeadLetterKind::Scrape,
            &DeadLetter::Scrape {
                id: Uuid::new_v4(),
                source_id,
                job_id,
                error: error.into(),
                failed_at: Utc::now(),
                retry_count,
            },
        )
        .await
    }

    /// Record an extraction that gave up on a source
    pub async fn push_extraction(
        &self,
        source_id: Uuid,
        error: impl Into<String>,
        job_id: Option<Uuid>,
        retry_count: u32,
    ) -> Result<(), QueueError> {
        self.push(
            DeadLetterKind::Extraction,
            &DeadLetter::Extraction {
                id: Uuid::new_v4(),
                source_id,
                job_id,
                error: error.into(),
                failed_at: Utc::now(),
                retry_count,
            },
        )
        .await
    }

    /// Record an LLM request that failed after max retries
    pub async fn push_llm(
        &self,
        request: LlmRequest,
        error: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Result<(), QueueError> {
        self.push(
            DeadLetterKind::Llm,
            &DeadLetter::Llm {
                id: Uuid::new_v4(),
                request,
                error: error.into(),
                failed_at: Utc::now(),
                worker_id: worker_id.into(),
            },
        )
        .await
    }

    /// Most recent entries of one kind, newest first
    pub async fn list(&self, kind: DeadLetterKind, limit: usize) -> Result<Vec<DeadLetter>, QueueError> {
        let mut con = self.redis.clone();
        let raw: Vec<String> = con
            .lrange(Self::key(kind), 0, limit as isize - 1)
            .await?;

        let mut entries = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_str(&item) {
                Ok(entry) => entries.push(entry),
                // Malformed entries are skipped, not fatal
                Err(e) => warn!(kind = kind.as_str(), error = %e, "skipping malformed DLQ entry"),
            }
        }
        Ok(entries)
    }

    /// Counts for all three lists
    pub async fn stats(&self) -> Result<DlqStats, QueueError> {
        let mut con = self.redis.clone();
        let scrape: u64 = con.llen(SCRAPE_DLQ_KEY).await?;
        let extraction: u64 = con.llen(EXTRACTION_DLQ_KEY).await?;
        let llm: u64 = con.llen(LLM_DLQ_KEY).await?;
        Ok(DlqStats { scrape, extraction, llm })
    }

    /// Remove and return the entry with the given id, if present
    pub async fn pop(&self, kind: DeadLetterKind, id: Uuid) -> Result<Option<DeadLetter>, QueueError> {
        let mut con = self.redis.clone();
        let key = Self::key(kind);
        let raw: Vec<String> = con.lrange(key, 0, -1).await?;

        for item in raw {
            let Ok(entry) = serde_json::from_str::<DeadLetter>(&item) else {
                continue;
            };
            if entry.id() == id {
                let _: i64 = con.lrem(key, 1, item).await?;
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Replay a dead LLM request with its retry counter reset to zero
    ///
    /// Returns the request id when the entry was found and re-enqueued.
    pub async fn requeue_llm(&self, queue: &LlmQueue, id: Uuid) -> Result<Option<String>, QueueError> {
        let Some(DeadLetter::Llm { request, .. }) = self.pop(DeadLetterKind::Llm, id).await? else {
            return Ok(None);
        };

        let mut fresh = request;
        fresh.retry_count = 0;
        queue.append(&fresh).await?;

        info!(request_id = %fresh.request_id, "DLQ item reprocessed");
        Ok(Some(fresh.request_id))
    }
}
