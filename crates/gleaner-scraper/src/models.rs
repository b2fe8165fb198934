//! Scrape service wire models
//!
//! The field casing is compatibility-critical: callers already speak this
//! shape (`pageStatusCode`, `discoveredUrls`, ...).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `POST /scrape` request body
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeRequest {
    /// Page to render; http/https only
    pub url: String,
    /// Per-request timeout, milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Extra settle time after load, milliseconds
    #[serde(default)]
    pub wait_after_load: u64,
    /// Extra headers; protected fingerprint headers are dropped
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Selector that must appear, else the scrape fails
    #[serde(default)]
    pub check_selector: Option<String>,
    /// Ignore TLS certificate errors
    #[serde(default)]
    pub skip_tls_verification: bool,
    /// Click through interactive elements and collect XHR/fetch URLs
    #[serde(default)]
    pub discover_ajax: bool,
}

fn default_timeout() -> u64 {
    30_000
}

/// `POST /scrape` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    /// Rendered DOM, or the raw body for JSON/plain-text responses
    pub content: String,
    /// HTTP status of the main document; 0 when no response was observed
    #[serde(rename = "pageStatusCode")]
    pub page_status_code: u16,
    /// Human-readable error for status ≥ 300
    #[serde(rename = "pageError", skip_serializing_if = "Option::is_none")]
    pub page_error: Option<String>,
    /// Content type of the main document
    #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// URLs collected during AJAX discovery
    #[serde(rename = "discoveredUrls", skip_serializing_if = "Option::is_none")]
    pub discovered_urls: Option<Vec<String>>,
}

/// `GET /health` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok" while the pool is serving
    pub status: String,
    /// Pool-wide page limit
    #[serde(rename = "maxConcurrentPages")]
    pub max_concurrent_pages: usize,
    /// Pages currently in flight
    #[serde(rename = "activePages")]
    pub active_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: ScrapeRequest =
            serde_json::from_value(json!({"url": "https://example.com"})).unwrap();
        assert_eq!(request.timeout, 30_000);
        assert_eq!(request.wait_after_load, 0);
        assert!(!request.skip_tls_verification);
        assert!(!request.discover_ajax);
        assert!(request.headers.is_none());
    }

    #[test]
    fn test_response_wire_casing() {
        let response = ScrapeResponse {
            content: "<html></html>".to_string(),
            page_status_code: 404,
            page_error: Some("Not Found".to_string()),
            content_type: Some("text/html".to_string()),
            discovered_urls: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["pageStatusCode"], json!(404));
        assert_eq!(value["pageError"], json!("Not Found"));
        assert_eq!(value["contentType"], json!("text/html"));
        assert!(value.get("discoveredUrls").is_none());
    }

    #[test]
    fn test_health_wire_casing() {
        let health = HealthResponse {
            status: "ok".to_string(),
            max_concurrent_pages: 10,
            active_pages: 2,
        };
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["maxConcurrentPages"], json!(10));
        assert_eq!(value["activePages"], json!(2));
    }
}
