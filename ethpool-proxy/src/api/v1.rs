//! API version 1 endpoints.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::SessionRegistry;
use crate::template::TemplateSource;

/// Shared application state for API endpoints.
#[derive(Clone)]
pub struct AppState {
    /// Authenticated stratum sessions
    pub registry: Arc<SessionRegistry>,
    /// Current work
    pub templates: Arc<dyn TemplateSource>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, templates: Arc<dyn TemplateSource>) -> Self {
        Self {
            registry,
            templates,
        }
    }

    /// Snapshot the proxy's state.
    pub fn stats(&self) -> StatsResponse {
        let template = self.templates.current_template();
        let stats = StatsResponse {
            sessions: self.registry.len(),
            height: template.as_ref().map(|t| t.height),
            header: template.as_ref().map(|t| t.header.clone()),
            upstream_sick: self.templates.is_sick(),
        };
        debug!(
            sessions = stats.sessions,
            height = ?stats.height,
            "Getting stats"
        );
        stats
    }
}

/// Stats response payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StatsResponse {
    /// Number of logged-in sessions
    pub sessions: usize,
    /// Height of the block being mined, if work is available
    pub height: Option<u64>,
    /// Header hash of the current work
    pub header: Option<String>,
    /// Whether every upstream node is failing
    pub upstream_sick: bool,
}

/// Health check endpoint handler.
///
/// Returns a simple OK status to verify the API is running.
async fn health() -> &'static str {
    "OK"
}

/// Stats endpoint handler.
///
/// # Example
/// ```bash
/// curl http://localhost:8080/api/v1/stats
/// ```
async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.stats())
}

/// Build the v1 API routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}
