//! Internal scrape service
//!
//! `POST /scrape` and `GET /health` over the browser pool. The wire shapes
//! are compatibility-critical; see [`crate::models`].

use crate::models::{HealthResponse, ScrapeRequest};
use crate::pool::BrowserPool;
use crate::{ScraperConfig, ScraperError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Error body for every failure path
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ScraperError {
    fn into_response(self) -> Response {
        let status = match &self {
            // Bad input is the caller's problem
            ScraperError::InvalidScheme(_) | ScraperError::InvalidUrl(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Build the service router
pub fn router(pool: Arc<BrowserPool>) -> Router {
    Router::new()
        .route("/scrape", post(scrape))
        .route("/health", get(health))
        .with_state(pool)
}

/// POST /scrape
async fn scrape(
    State(pool): State<Arc<BrowserPool>>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Response, ScraperError> {
    if request.url.trim().is_empty() {
        return Err(ScraperError::InvalidUrl("missing url".to_string()));
    }
    let response = pool.scrape(request).await?;
    Ok(Json(response).into_response())
}

/// GET /health
async fn health(State(pool): State<Arc<BrowserPool>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        max_concurrent_pages: pool.max_concurrent_pages(),
        active_pages: pool.active_pages(),
    })
}

/// Start the pool and serve until the listener fails or shutdown
pub async fn run(config: ScraperConfig) -> Result<(), ScraperError> {
    let bind_addr = config.bind_addr();
    let pool = BrowserPool::new(config);
    pool.start().await?;

    let app = router(pool.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| ScraperError::Scrape(format!("bind {bind_addr}: {e}")))?;
    info!(addr = %bind_addr, "scrape service listening");

    let serve = std::future::IntoFuture::into_future(axum::serve(listener, app));
    let result = tokio::select! {
        outcome = serve => outcome.map_err(|e| ScraperError::Scrape(e.to_string())),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, draining browser pool");
            Ok(())
        }
    };
    pool.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_maps_to_400() {
        let response = ScraperError::InvalidScheme("file".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_scrape_failure_maps_to_500() {
        let response = ScraperError::Scrape("browser has been closed".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
