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
    pub index_documents: usize,
    pub streams: Vec<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: recallforge_common::VERSION.to_string(),
    })
}

/// Readiness probe - reports the local index size and the enabled streams
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let index_documents = state.orchestrator.index_size().await;
    let streams = state
        .orchestrator
        .enabled_streams()
        .into_iter()
        .map(|k| k.as_str().to_string())
        .collect();

    Json(ReadyResponse {
        status: "ready".to_string(),
        index_documents,
        streams,
    })
}
