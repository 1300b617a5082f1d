//! HTTP API server.
//!
//! A small read-only Axum API for monitoring the proxy: liveness and a
//! snapshot of sessions and current work.

pub mod v1;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::tracing::prelude::*;

pub use v1::{AppState, StatsResponse};

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", v1::routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `listen` until cancelled.
pub async fn serve(listen: &str, state: AppState, running: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { running.cancelled().await })
        .await?;
    Ok(())
}
