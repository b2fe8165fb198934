//! Scraper configuration

use serde::{Deserialize, Serialize};

/// Browser pool and scrape-flow tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Long-lived browser instances in the pool
    pub browser_count: usize,
    /// Total in-flight scrapes across the pool
    pub max_concurrent_pages: usize,
    /// Run browsers headless
    pub headless: bool,
    /// Optional proxy server URL
    pub proxy: Option<String>,
    /// Restart a browser after this many requests; 0 or negative disables
    pub recycle_after_requests: i64,
    /// Bounded settle wait after load, milliseconds
    pub networkidle_timeout_ms: u64,
    /// Consecutive stable length checks before content counts as ready
    pub content_stability_checks: u32,
    /// Interval between stability checks, milliseconds
    pub content_stability_interval_ms: u64,
    /// Elements clicked during AJAX discovery
    pub ajax_discovery_max_clicks: usize,
    /// Seconds to wait for active pages on shutdown before closing anyway
    pub shutdown_drain_secs: u64,
    /// Default per-request timeout, milliseconds
    pub default_timeout_ms: u64,
    /// Bind address for the scrape service
    pub bind_address: String,
    /// Bind port for the scrape service
    pub bind_port: u16,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            browser_count: 3,
            max_concurrent_pages: 10,
            headless: true,
            proxy: None,
            recycle_after_requests: 100,
            networkidle_timeout_ms: 5000,
            content_stability_checks: 2,
            content_stability_interval_ms: 500,
            ajax_discovery_max_clicks: 10,
            shutdown_drain_secs: 30,
            default_timeout_ms: 30_000,
            bind_address: "0.0.0.0".to_string(),
            bind_port: 3003,
        }
    }
}

impl ScraperConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.browser_count == 0 {
            return Err("browser_count must be greater than 0".to_string());
        }
        if self.max_concurrent_pages == 0 {
            return Err("max_concurrent_pages must be greater than 0".to_string());
        }
        if self.content_stability_checks == 0 {
            return Err("content_stability_checks must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Full bind address (address:port)
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.bind_port)
    }
}
