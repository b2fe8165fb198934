//! LLM worker
//!
//! Pulls requests from the consumer group, executes chat completions, writes
//! responses, and retries or dead-letters failures. Parallelism adapts to the
//! observed timeout rate; the semaphore is only replaced when no request is
//! in flight.

use crate::dlq::DlqService;
use crate::queue::LlmQueue;
use crate::QueueError;
use gleaner_domain::{LlmRequest, LlmResponse, RequestPayload};
use gleaner_llm::chat::{ChatApi, ChatMessage, ChatRequest};
use gleaner_llm::try_repair_json;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Appended to the system prompt on retries
const RETRY_SUFFIX: &str = "\n\nIMPORTANT: Be concise. Output valid JSON only.";

/// Fallback user-prompt budget, characters
const FALLBACK_CONTENT_LIMIT: usize = 8000;

/// Worker tuning knobs
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique consumer name within the group
    pub worker_id: String,
    /// Consumer group shared by all workers
    pub consumer_group: String,
    /// Starting concurrent-request limit
    pub initial_concurrency: usize,
    /// Upper bound for adaptive concurrency
    pub max_concurrency: usize,
    /// Lower bound for adaptive concurrency
    pub min_concurrency: usize,
    /// Default model when the payload names none
    pub model: String,
    /// Attempts before a request moves to the DLQ
    pub max_retries: u32,
    /// Token cap per completion
    pub max_tokens: u32,
    /// Base sampling temperature
    pub base_temperature: f32,
    /// Temperature added per retry to vary outputs
    pub temperature_increment: f32,
    /// Seconds between concurrency adjustments
    pub adjustment_interval_secs: u64,
    /// Stream read block, milliseconds
    pub block_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            consumer_group: "llm-workers".to_string(),
            initial_concurrency: 10,
            max_concurrency: 50,
            min_concurrency: 5,
            model: "Qwen3-30B-A3B-Instruct-4bit".to_string(),
            max_retries: 3,
            max_tokens: 4096,
            base_temperature: 0.1,
            temperature_increment: 0.05,
            adjustment_interval_secs: 10,
            block_ms: 1000,
        }
    }
}

/// Concurrency state guarded by one lock so semaphore replacement can be
/// deferred until the in-flight count is observed to be zero
struct ConcurrencyState {
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    active: usize,
    pending: Option<usize>,
}

/// Decide the next concurrency target from one adjustment window
///
/// Returns `None` when nothing should change: fewer than 10 samples, or the
/// timeout rate sits in the acceptable band.
pub(crate) fn decide_concurrency(
    current: usize,
    min: usize,
    max: usize,
    successes: u64,
    timeouts: u64,
) -> Option<usize> {
    let total = successes + timeouts;
    if total < 10 {
        return None;
    }
    let timeout_rate = timeouts as f64 / total as f64;

    let target = if timeout_rate > 0.1 {
        min.max((current as f64 * 0.7) as usize)
    } else if timeout_rate < 0.02 && successes > 50 {
        max.min((current as f64 * 1.2) as usize)
    } else {
        return None;
    };

    (target != current).then_some(target)
}

/// Worker that processes LLM requests from the queue
pub struct LlmWorker<C: ChatApi> {
    queue: LlmQueue,
    chat: Arc<C>,
    dlq: DlqService,
    config: WorkerConfig,
    state: Mutex<ConcurrencyState>,
    success_count: AtomicU64,
    timeout_count: AtomicU64,
    last_adjustment: Mutex<Instant>,
    running: AtomicBool,
}

impl<C: ChatApi + 'static> LlmWorker<C> {
    /// Create a worker over an existing queue and chat transport
    pub fn new(queue: LlmQueue, chat: C, dlq: DlqService, config: WorkerConfig) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.initial_concurrency));
        Arc::new(Self {
            queue,
            chat: Arc::new(chat),
            dlq,
            state: Mutex::new(ConcurrencyState {
                concurrency: config.initial_concurrency,
                semaphore,
                active: 0,
                pending: None,
            }),
            config,
            success_count: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            last_adjustment: Mutex::new(Instant::now()),
            running: AtomicBool::new(false),
        })
    }

    /// Current concurrency limit
    pub async fn concurrency(&self) -> usize {
        self.state.lock().await.concurrency
    }

    /// Create the consumer group if it does not exist yet
    pub async fn initialize(&self) -> Result<(), QueueError> {
        let mut con = self.queue.connection();
        let created: Result<(), redis::RedisError> = con
            .xgroup_create_mkstream(
                &self.queue.config().stream_key,
                &self.config.consumer_group,
                "0",
            )
            .await;
        match created {
            Ok(()) => {
                info!(
                    worker_id = %self.config.worker_id,
                    group = %self.config.consumer_group,
                    "created consumer group"
                );
                Ok(())
            }
            // Group already exists is fine
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    worker_id = %self.config.worker_id,
                    group = %self.config.consumer_group,
                    "consumer group exists"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run the processing loop until [`stop`](Self::stop) is called
    pub async fn run(self: &Arc<Self>) -> Result<(), QueueError> {
        self.initialize().await?;
        self.running.store(true, Ordering::SeqCst);

        info!(
            worker_id = %self.config.worker_id,
            initial_concurrency = self.config.initial_concurrency,
            "llm worker started"
        );

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.process_batch().await {
                error!(worker_id = %self.config.worker_id, error = %e, "worker batch failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            self.maybe_adjust_concurrency().await;
        }

        info!(worker_id = %self.config.worker_id, "llm worker stopped");
        Ok(())
    }

    /// Ask the processing loop to stop after the current batch
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Read up to `concurrency` messages and dispatch them concurrently
    pub async fn process_batch(self: &Arc<Self>) -> Result<(), QueueError> {
        let (count, semaphore) = {
            let state = self.state.lock().await;
            (state.concurrency, state.semaphore.clone())
        };

        let options = StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.worker_id)
            .count(count)
            .block(self.config.block_ms as usize);

        let mut con = self.queue.connection();
        let reply: StreamReadReply = con
            .xread_options(&[&self.queue.config().stream_key], &[">"], &options)
            .await?;

        let mut handles = Vec::new();
        for stream in reply.keys {
            for entry in stream.ids {
                let raw: Option<String> = entry.get("data");
                let Some(raw) = raw else {
                    warn!(entry_id = %entry.id, "stream entry without data field");
                    self.ack(&entry.id).await;
                    continue;
                };
                let request = match LlmRequest::from_json(&raw) {
                    Ok(request) => request,
                    Err(e) => {
                        // Undecodable entries can never succeed; drop them
                        warn!(entry_id = %entry.id, error = %e, "dropping undecodable request");
                        self.ack(&entry.id).await;
                        continue;
                    }
                };

                let this = Arc::clone(self);
                let semaphore = semaphore.clone();
                let entry_id = entry.id.clone();
                handles.push(tokio::spawn(async move {
                    this.process_request(entry_id, request, semaphore).await;
                }));
            }
        }

        futures::future::join_all(handles).await;
        Ok(())
    }

    async fn ack(&self, entry_id: &str) {
        let mut con = self.queue.connection();
        let acked: Result<i64, redis::RedisError> = con
            .xack(
                &self.queue.config().stream_key,
                &self.config.consumer_group,
                &[entry_id],
            )
            .await;
        if let Err(e) = acked {
            warn!(entry_id, error = %e, "xack failed");
        }
    }

    async fn process_request(self: Arc<Self>, entry_id: String, request: LlmRequest, semaphore: Arc<Semaphore>) {
        // A closed semaphore only happens at shutdown; skip silently
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return;
        };
        self.state.lock().await.active += 1;

        let started = Instant::now();
        let outcome: Result<(), QueueError> = async {
            if request.is_expired() {
                warn!(
                    request_id = %request.request_id,
                    request_type = request.payload.request_type(),
                    "request expired before processing"
                );
                let response =
                    LlmResponse::timeout(&request.request_id, "Request expired before processing");
                self.queue.store_response(&response).await?;
            } else {
                match self.execute(&request).await {
                    Ok(result) => {
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        self.success_count.fetch_add(1, Ordering::Relaxed);
                        let response =
                            LlmResponse::success(&request.request_id, result, elapsed_ms);
                        self.queue.store_response(&response).await?;
                        debug!(
                            request_id = %request.request_id,
                            request_type = request.payload.request_type(),
                            processing_time_ms = elapsed_ms,
                            "request completed"
                        );
                    }
                    Err(e) => {
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        let message = e.to_string();
                        let lowered = message.to_lowercase();
                        if lowered.contains("timeout") || lowered.contains("timed out") {
                            self.timeout_count.fetch_add(1, Ordering::Relaxed);
                        }
                        error!(
                            request_id = %request.request_id,
                            request_type = request.payload.request_type(),
                            retry_count = request.retry_count,
                            error = %message,
                            processing_time_ms = elapsed_ms,
                            "request failed"
                        );
                        self.handle_failure(&request, &message, elapsed_ms).await?;
                    }
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = outcome {
            error!(request_id = %request.request_id, error = %e, "response delivery failed");
        }

        // Ack whether the request succeeded, was requeued, or went to DLQ
        self.ack(&entry_id).await;

        drop(_permit);
        let mut state = self.state.lock().await;
        state.active -= 1;
        if state.active == 0 {
            if let Some(target) = state.pending.take() {
                state.concurrency = target;
                state.semaphore = Arc::new(Semaphore::new(target));
                info!(
                    worker_id = %self.config.worker_id,
                    new_concurrency = target,
                    "deferred concurrency adjustment applied"
                );
            }
        }
    }

    /// Execute the chat call for one request
    async fn execute(&self, request: &LlmRequest) -> Result<Value, QueueError> {
        let temperature = self.config.base_temperature
            + request.retry_count as f32 * self.config.temperature_increment;
        let retrying = request.retry_count > 0;

        match &request.payload {
            RequestPayload::ExtractFacts { prompts, content, categories, profile_name } => {
                let system = prompts.system_prompt.clone().unwrap_or_else(|| {
                    format!(
                        "Extract facts from the content. Categories: {categories:?}. Profile: {profile_name}"
                    )
                });
                let user = prompts
                    .user_prompt
                    .clone()
                    .unwrap_or_else(|| truncate_chars(content, FALLBACK_CONTENT_LIMIT));
                let outcome = self
                    .chat_json(prompts.model.as_deref(), system, user, temperature, retrying)
                    .await?;
                Ok(try_repair_json(&outcome.content, "extract_facts")?)
            }
            RequestPayload::ExtractFieldGroup { prompts, content, field_group, source_context } => {
                let system = prompts.system_prompt.clone().unwrap_or_else(|| {
                    format!(
                        "Extract {} information: {}",
                        field_group.name, field_group.description
                    )
                });
                let user = prompts.user_prompt.clone().unwrap_or_else(|| {
                    let body = truncate_chars(content, FALLBACK_CONTENT_LIMIT);
                    if source_context.is_empty() {
                        format!("Content:\n{body}")
                    } else {
                        format!("Source: {source_context}\n\nContent:\n{body}")
                    }
                });
                let outcome = self
                    .chat_json(prompts.model.as_deref(), system, user, temperature, retrying)
                    .await?;

                if outcome.truncated() {
                    warn!(
                        field_group = %field_group.name,
                        is_entity_list = field_group.is_entity_list,
                        response_length = outcome.content.len(),
                        max_tokens = self.config.max_tokens,
                        "field group extraction truncated"
                    );
                    if field_group.is_entity_list {
                        // Truncated entity lists degrade to empty rather than
                        // failing the whole group
                        return Ok(
                            match try_repair_json(&outcome.content, "extract_field_group_truncated")
                            {
                                Ok(value) => value,
                                Err(_) => {
                                    warn!(
                                        field_group = %field_group.name,
                                        "truncation unrecoverable, returning empty list"
                                    );
                                    json!({ field_group.name.clone(): [], "confidence": 0.0 })
                                }
                            },
                        );
                    }
                }

                Ok(try_repair_json(&outcome.content, "extract_field_group")?)
            }
            RequestPayload::ExtractEntities { prompts, extraction_data, entity_types } => {
                let system = prompts.system_prompt.clone().unwrap_or_else(|| {
                    let names: Vec<&str> = entity_types.iter().map(|t| t.name.as_str()).collect();
                    format!("Extract entities of types: {names:?}")
                });
                let user = prompts
                    .user_prompt
                    .clone()
                    .unwrap_or_else(|| extraction_data.to_string());
                let outcome = self
                    .chat_json(prompts.model.as_deref(), system, user, temperature, retrying)
                    .await?;
                Ok(try_repair_json(&outcome.content, "extract_entities")?)
            }
            RequestPayload::Complete { prompts, response_format, temperature: temp_override } => {
                let mut system = prompts.system_prompt.clone().unwrap_or_default();
                if retrying {
                    system.push_str(RETRY_SUFFIX);
                }
                let request = ChatRequest {
                    model: prompts
                        .model
                        .clone()
                        .unwrap_or_else(|| self.config.model.clone()),
                    messages: vec![
                        ChatMessage::system(system),
                        ChatMessage::user(prompts.user_prompt.clone().unwrap_or_default()),
                    ],
                    temperature: temp_override.unwrap_or(temperature),
                    max_tokens: self.config.max_tokens,
                    response_format: response_format.clone(),
                };
                let outcome = self.chat.complete(request).await?;

                let wants_json = response_format
                    .as_ref()
                    .and_then(|f| f.get("type"))
                    .and_then(Value::as_str)
                    == Some("json_object");
                if wants_json {
                    Ok(try_repair_json(&outcome.content, "complete")?)
                } else {
                    Ok(json!({ "text": outcome.content }))
                }
            }
        }
    }

    /// Chat call with JSON response format and the retry conciseness hint
    async fn chat_json(
        &self,
        model: Option<&str>,
        mut system: String,
        user: String,
        temperature: f32,
        retrying: bool,
    ) -> Result<gleaner_llm::ChatOutcome, QueueError> {
        if retrying {
            system.push_str(RETRY_SUFFIX);
        }
        let request = ChatRequest {
            model: model.unwrap_or(&self.config.model).to_string(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature,
            max_tokens: self.config.max_tokens,
            response_format: Some(json!({"type": "json_object"})),
        };
        Ok(self.chat.complete(request).await?)
    }

    /// Requeue with an incremented retry counter, or dead-letter and unblock
    /// the caller with an error response
    async fn handle_failure(
        &self,
        request: &LlmRequest,
        error_msg: &str,
        processing_time_ms: u64,
    ) -> Result<(), QueueError> {
        if request.retry_count < self.config.max_retries.saturating_sub(1) {
            let retried = request.with_retry();
            self.queue.append(&retried).await?;
            info!(
                request_id = %request.request_id,
                retry_count = retried.retry_count,
                max_retries = self.config.max_retries,
                "request requeued"
            );
            return Ok(());
        }

        self.dlq
            .push_llm(request.clone(), error_msg, &self.config.worker_id)
            .await?;
        warn!(
            request_id = %request.request_id,
            request_type = request.payload.request_type(),
            retry_count = request.retry_count,
            error = error_msg,
            "request moved to DLQ"
        );

        // The caller must not be left waiting
        let response = LlmResponse::error(
            &request.request_id,
            format!(
                "Request failed after {} attempts: {error_msg}",
                self.config.max_retries
            ),
            processing_time_ms,
        );
        self.queue.store_response(&response).await
    }

    /// Apply one adaptive-concurrency window if it has elapsed
    pub async fn maybe_adjust_concurrency(&self) {
        {
            let mut last = self.last_adjustment.lock().await;
            if last.elapsed() < Duration::from_secs(self.config.adjustment_interval_secs) {
                return;
            }
            *last = Instant::now();
        }

        let successes = self.success_count.swap(0, Ordering::Relaxed);
        let timeouts = self.timeout_count.swap(0, Ordering::Relaxed);

        let mut state = self.state.lock().await;
        let Some(target) = decide_concurrency(
            state.concurrency,
            self.config.min_concurrency,
            self.config.max_concurrency,
            successes,
            timeouts,
        ) else {
            return;
        };

        if target < state.concurrency {
            warn!(
                worker_id = %self.config.worker_id,
                successes,
                timeouts,
                old_concurrency = state.concurrency,
                new_concurrency = target,
                "backing off"
            );
        } else {
            info!(
                worker_id = %self.config.worker_id,
                successes,
                timeouts,
                old_concurrency = state.concurrency,
                new_concurrency = target,
                "scaling up"
            );
        }

        if state.active == 0 {
            state.concurrency = target;
            state.semaphore = Arc::new(Semaphore::new(target));
        } else {
            // Replacing the semaphore while permits are held would leak
            // capacity; defer until the last in-flight request completes
            state.pending = Some(target);
        }
    }
}

/// Truncate to a character budget without splitting a code point
fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
