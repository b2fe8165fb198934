//! Gleaner Scraper Layer
//!
//! Renders pages (JavaScript-executed DOM) while multiplexing many
//! concurrent scrapes across a small pool of long-lived browser instances
//! with health probing, background restarts, and request-count recycling.
//! The internal HTTP surface (`POST /scrape`, `GET /health`) lives in
//! [`server`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod headers;
pub mod models;
pub mod pool;
pub mod server;

pub use config::ScraperConfig;
pub use headers::{get_error_message, merge_headers, validate_scrape_url, AD_SERVING_DOMAINS};
pub use models::{HealthResponse, ScrapeRequest, ScrapeResponse};
pub use pool::BrowserPool;

use thiserror::Error;

/// Errors from the scraper
#[derive(Error, Debug)]
pub enum ScraperError {
    /// `start` was never called or every launch failed
    #[error("Browser pool not started")]
    PoolNotStarted,

    /// Every browser in the pool is disconnected and restart failed
    #[error("All browsers in pool are disconnected")]
    AllBrowsersDown,

    /// The caller-supplied selector never appeared
    #[error("Required selector not found")]
    SelectorNotFound,

    /// Only http/https URLs are accepted
    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    /// The URL could not be parsed at all
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation or rendering failure
    #[error("An error occurred while fetching the page: {0}")]
    Scrape(String),
}
