//! Redis-backed LLM request queue

use crate::QueueError;
use gleaner_domain::{LlmRequest, LlmResponse};
use redis::aio::ConnectionManager;
use redis::streams::StreamMaxlen;
use redis::AsyncCommands;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Queue tuning knobs
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct QueueConfig {
    /// Stream key requests are appended to
    pub stream_key: String,
    /// Submissions fail with `QueueFull` at this depth
    pub max_queue_depth: u64,
    /// Depth that drives the backpressure status
    pub backpressure_threshold: u64,
    /// TTL for stored responses, seconds
    pub response_ttl_secs: u64,
    /// Bounded poll interval for waiters, milliseconds
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stream_key: "llm:requests".to_string(),
            max_queue_depth: 1000,
            backpressure_threshold: 500,
            response_ttl_secs: 300,
            poll_interval_ms: 100,
        }
    }
}

impl QueueConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".to_string());
        }
        if self.backpressure_threshold == 0 {
            return Err("backpressure_threshold must be greater than 0".to_string());
        }
        if self.backpressure_threshold > self.max_queue_depth {
            return Err("backpressure_threshold cannot exceed max_queue_depth".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Coarse queue health reported to upstream producers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueHealth {
    /// Plenty of headroom
    Ok,
    /// Above half the threshold; producers should slow down
    Slow,
    /// At or above the threshold
    Full,
}

impl QueueHealth {
    /// Lowercase name as reported
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueHealth::Ok => "ok",
            QueueHealth::Slow => "slow",
            QueueHealth::Full => "full",
        }
    }
}

/// Snapshot returned by [`LlmQueue::backpressure_status`]
#[derive(Debug, Clone, Serialize)]
pub struct BackpressureStatus {
    /// Health bucket
    pub status: QueueHealth,
    /// True when producers should wait before submitting more
    pub should_wait: bool,
    /// Current number of pending requests
    pub queue_depth: u64,
    /// The configured backpressure threshold
    pub threshold: u64,
}

/// Pure assessment of depth against a threshold
///
/// `slow` at ≥ 50% of the threshold, `should_wait` at ≥ 80%, `full` at
/// ≥ 100%.
pub(crate) fn assess_backpressure(depth: u64, threshold: u64) -> (QueueHealth, bool) {
    let depth_f = depth as f64;
    let threshold_f = threshold as f64;
    let status = if depth_f >= threshold_f {
        QueueHealth::Full
    } else if depth_f >= threshold_f * 0.5 {
        QueueHealth::Slow
    } else {
        QueueHealth::Ok
    };
    let should_wait = depth_f >= threshold_f * 0.8;
    (status, should_wait)
}

/// Name of the pub/sub channel announcing a stored response
pub(crate) fn response_channel(request_id: &str) -> String {
    format!("llm:response:notify:{request_id}")
}

/// Key the response for a request is stored under
pub(crate) fn response_key(request_id: &str) -> String {
    format!("llm:response:{request_id}")
}

/// Process-wide LLM request queue
///
/// Cloning is cheap; all clones share the same connection manager.
#[derive(Clone)]
pub struct LlmQueue {
    client: redis::Client,
    redis: ConnectionManager,
    config: QueueConfig,
}

impl LlmQueue {
    /// Connect to Redis and build a queue
    pub async fn connect(redis_url: &str, config: QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let redis = client.get_connection_manager().await?;
        Ok(Self { client, redis, config })
    }

    /// Build a queue over existing connections (shared with other services)
    pub fn new(client: redis::Client, redis: ConnectionManager, config: QueueConfig) -> Self {
        Self { client, redis, config }
    }

    /// Queue configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Fresh handle onto the shared connection manager
    pub(crate) fn connection(&self) -> ConnectionManager {
        self.redis.clone()
    }

    /// Submit a request; returns the request id for correlation
    ///
    /// Fails with [`QueueError::QueueFull`] when the queue is at capacity.
    pub async fn submit(&self, request: &LlmRequest) -> Result<String, QueueError> {
        let depth = self.queue_depth().await?;
        if depth >= self.config.max_queue_depth {
            warn!(
                depth,
                max_depth = self.config.max_queue_depth,
                request_id = %request.request_id,
                "llm queue full"
            );
            return Err(QueueError::QueueFull {
                depth,
                max_depth: self.config.max_queue_depth,
            });
        }

        self.append(request).await?;

        debug!(
            request_id = %request.request_id,
            request_type = request.payload.request_type(),
            queue_depth = depth + 1,
            "llm request submitted"
        );
        Ok(request.request_id.clone())
    }

    /// Append without the depth check; used for retries and DLQ replay so a
    /// full queue cannot strand an already-accepted request
    pub(crate) async fn append(&self, request: &LlmRequest) -> Result<(), QueueError> {
        let mut con = self.redis.clone();
        // Auto-trim far beyond capacity so a stuck consumer cannot grow the
        // stream without bound
        let _: String = con
            .xadd_maxlen(
                &self.config.stream_key,
                StreamMaxlen::Approx((self.config.max_queue_depth * 2) as usize),
                "*",
                &[
                    ("request_id", request.request_id.as_str()),
                    ("data", request.to_json().as_str()),
                ],
            )
            .await?;
        Ok(())
    }

    /// Block until the response for `request_id` arrives, up to `timeout`
    ///
    /// Subscribes to the response channel and also polls at a bounded
    /// interval, so a missed notification delays at most one poll. The
    /// response key is deleted after reading: delivery is at-most-once to
    /// any one caller.
    pub async fn wait_for_result(
        &self,
        request_id: &str,
        timeout: Duration,
    ) -> Result<LlmResponse, QueueError> {
        let key = response_key(request_id);
        let channel = response_channel(request_id);
        let deadline = Instant::now() + timeout;
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        // Best-effort subscription; polling alone is sufficient for progress
        let mut pubsub = match self.client.get_async_pubsub().await {
            Ok(mut ps) => match ps.subscribe(&channel).await {
                Ok(()) => Some(ps),
                Err(e) => {
                    warn!(request_id, error = %e, "response channel subscribe failed, polling only");
                    None
                }
            },
            Err(e) => {
                warn!(request_id, error = %e, "pubsub connection failed, polling only");
                None
            }
        };

        let mut con = self.redis.clone();
        loop {
            if let Some(raw) = con.get::<_, Option<String>>(&key).await? {
                let response = LlmResponse::from_json(&raw)?;
                // Clean up the response key; failure here only costs the TTL
                if let Err(e) = con.del::<_, i64>(&key).await {
                    warn!(request_id, error = %e, "response key cleanup failed");
                }
                return Ok(response);
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = poll_interval.min(deadline - now);
            match pubsub.as_mut() {
                Some(ps) => {
                    use futures::StreamExt;
                    let mut messages = ps.on_message();
                    // Either a notification or the poll tick wakes us
                    let _ = tokio::time::timeout(wait, messages.next()).await;
                }
                None => tokio::time::sleep(wait).await,
            }
        }

        error!(request_id, timeout_secs = timeout.as_secs(), "llm request wait timed out");
        Err(QueueError::RequestTimeout {
            request_id: request_id.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Current number of pending requests
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut con = self.redis.clone();
        let depth: u64 = con.xlen(&self.config.stream_key).await?;
        Ok(depth)
    }

    /// Backpressure snapshot for upstream components
    pub async fn backpressure_status(&self) -> Result<BackpressureStatus, QueueError> {
        let depth = self.queue_depth().await?;
        let (status, should_wait) = assess_backpressure(depth, self.config.backpressure_threshold);
        Ok(BackpressureStatus {
            status,
            should_wait,
            queue_depth: depth,
            threshold: self.config.backpressure_threshold,
        })
    }

    /// Store a response and wake any waiter
    pub async fn store_response(&self, response: &LlmResponse) -> Result<(), QueueError> {
        let mut con = self.redis.clone();
        let key = response_key(&response.request_id);
        let _: () = con
            .set_ex(&key, response.to_json(), self.config.response_ttl_secs)
            .await?;
        let _: i64 = con
            .publish(response_channel(&response.request_id), "ready")
            .await?;
        debug!(
            request_id = %response.request_id,
            status = ?response.status,
            processing_time_ms = response.processing_time_ms,
            "llm response stored"
        );
        Ok(())
    }
}
