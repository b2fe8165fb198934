//! Operator alerting
//!
//! Alerts always log; a webhook is optional. Delivery failures are logged
//! and swallowed so alerting can never take the pipeline down with it.

use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, warn};

/// Webhook payload shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertFormat {
    /// Generic `{"severity", "title", "message"}` body
    Json,
    /// Slack-compatible `{"text": ...}` body
    Slack,
}

/// Sends operator alerts
pub struct AlertSink {
    webhook_url: Option<String>,
    format: AlertFormat,
    client: reqwest::Client,
}

impl AlertSink {
    /// Create a sink; `webhook_url = None` means log-only
    pub fn new(webhook_url: Option<String>, format: AlertFormat) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds");
        Self { webhook_url, format, client }
    }

    /// Emit a warning-severity alert
    pub async fn warn(&self, title: &str, message: &str) {
        warn!(alert = title, "{message}");
        self.deliver("warning", title, message).await;
    }

    /// Emit an error-severity alert
    pub async fn error(&self, title: &str, message: &str) {
        error!(alert = title, "{message}");
        self.deliver("error", title, message).await;
    }

    async fn deliver(&self, severity: &str, title: &str, message: &str) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let body = match self.format {
            AlertFormat::Json => json!({
                "severity": severity,
                "title": title,
                "message": message,
            }),
            AlertFormat::Slack => json!({
                "text": format!("[{severity}] {title}: {message}"),
            }),
        };

        if let Err(e) = self.client.post(url).json(&body).send().await {
            warn!(error = %e, "alert webhook delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_only_sink_never_errors() {
        let sink = AlertSink::new(None, AlertFormat::Json);
        sink.warn("llm_dlq_entry", "request moved to DLQ").await;
        sink.error("pipeline_stalled", "no progress").await;
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_swallowed() {
        let sink = AlertSink::new(Some("http://127.0.0.1:9/hook".to_string()), AlertFormat::Slack);
        sink.warn("t", "m").await;
    }
}
