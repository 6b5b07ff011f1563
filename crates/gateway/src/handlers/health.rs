//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: ReadyChecks,
    pub uptime_secs: i64,
}

#[derive(Serialize)]
pub struct ReadyChecks {
    pub index_fragments: usize,
    pub embedding_model: String,
    pub models: Vec<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: counsel_common::VERSION.to_string(),
    })
}

/// Readiness probe - ready while at least one model backend is registered
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let models = state.registry.names().await;
    let ready = !models.is_empty() && !state.registry.is_closed().await;

    Json(ReadyResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        checks: ReadyChecks {
            index_fragments: state.index.len().await,
            embedding_model: state.index.model().to_string(),
            models,
        },
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}
