//! Admin HTTP server: health, metrics and explicit index rebuilds.
//!
//! Runs beside the lookup listener on its own port. It never serves
//! queries; the wire protocol stays on the TCP listener.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::engine::LookupEngine;
use crate::error::Result;

/// HTTP server state.
#[derive(Clone)]
pub struct AdminState {
    engine: Arc<LookupEngine>,
}

/// Build the admin router.
pub fn router(engine: Arc<LookupEngine>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/rebuild", post(rebuild))
        .layer(TraceLayer::new_for_http())
        .with_state(AdminState { engine })
}

/// Start the admin HTTP server.
pub async fn start_server(bind_address: &str, port: u16, engine: Arc<LookupEngine>) -> Result<()> {
    let addr = format!("{}:{}", bind_address, port);
    info!("Starting admin HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(engine)).await?;

    Ok(())
}

/// Health check endpoint.
async fn health_check(State(state): State<AdminState>) -> impl IntoResponse {
    let engine = &state.engine;
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "strategy": engine.strategy(),
        "semantics": engine.semantics(),
        "consistency": engine.consistency(),
        "uses_cache": engine.uses_cache(),
        "cache": engine.cache_status().await,
    }))
}

/// Prometheus metrics endpoint.
async fn metrics(State(state): State<AdminState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.engine.metrics().to_prometheus(),
    )
}

/// Rebuild the cached index from the current corpus file.
async fn rebuild(State(state): State<AdminState>) -> impl IntoResponse {
    match state.engine.rebuild().await {
        Ok(status) => (StatusCode::OK, Json(serde_json::json!(status))),
        Err(e) => {
            error!("Rebuild failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}
