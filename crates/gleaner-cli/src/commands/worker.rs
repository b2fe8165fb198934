//! `gleaner worker` — run the LLM queue worker

use crate::bootstrap::Runtime;
use anyhow::Result;
use gleaner_llm::OpenAiChatClient;
use gleaner_pipeline::alerting::{AlertFormat, AlertSink};
use gleaner_pipeline::shutdown::{listen_for_signals, ShutdownManager};
use gleaner_queue::{LlmWorker, WorkerConfig};
use std::time::Duration;
use tracing::info;

/// How often the DLQ monitor looks for new dead letters
const DLQ_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Run the worker until interrupted
pub async fn run(runtime: Runtime, worker_id: Option<String>) -> Result<()> {
    let settings = &runtime.settings;
    let chat = OpenAiChatClient::with_timeout(
        settings.llm_base_url.as_str(),
        settings.llm_api_key.as_str(),
        Duration::from_secs(settings.llm_request_timeout.max(1) as u64),
    );

    let mut config = WorkerConfig {
        initial_concurrency: settings.llm_worker_concurrency,
        min_concurrency: settings.llm_worker_min_concurrency,
        max_concurrency: settings.llm_worker_max_concurrency,
        model: settings.llm_model.clone(),
        max_retries: settings.llm_max_retries,
        max_tokens: settings.llm_max_tokens,
        base_temperature: settings.llm_base_temperature,
        temperature_increment: settings.llm_retry_temperature_increment,
        ..WorkerConfig::default()
    };
    if let Some(worker_id) = worker_id {
        config.worker_id = worker_id;
    }

    let alert_format = if settings.alert_webhook_format == "slack" {
        AlertFormat::Slack
    } else {
        AlertFormat::Json
    };
    let alerts = AlertSink::new(settings.alert_webhook_url.clone(), alert_format);

    let worker = LlmWorker::new(runtime.queue.clone(), chat, runtime.dlq.clone(), config);

    // Alert when the LLM dead-letter queue grows
    let monitor_dlq = runtime.dlq.clone();
    let monitor = tokio::spawn(async move {
        let mut last_count = 0u64;
        loop {
            tokio::time::sleep(DLQ_MONITOR_INTERVAL).await;
            if let Ok(stats) = monitor_dlq.stats().await {
                if stats.llm > last_count {
                    alerts
                        .warn(
                            "llm_dlq_growth",
                            &format!("{} new dead-lettered LLM requests", stats.llm - last_count),
                        )
                        .await;
                }
                last_count = stats.llm;
            }
        }
    });

    let runner = worker.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    // Graceful termination: the shutdown manager stops the worker loop,
    // then we wait for the in-flight batch to drain
    let shutdown = ShutdownManager::new();
    let stopper = worker.clone();
    shutdown
        .register_cleanup("llm-worker", move || {
            let worker = stopper.clone();
            Box::pin(async move { worker.stop() })
        })
        .await;
    tokio::spawn(listen_for_signals(shutdown.clone()));

    shutdown.wait_for_shutdown().await;
    info!("shutdown complete, draining worker");
    monitor.abort();
    handle.await??;
    Ok(())
}
