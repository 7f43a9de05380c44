//! Retrieval handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::orchestrator::OrchestratedResult;
use crate::AppState;
use recallforge_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
};

/// Retrieval request
#[derive(Debug, Deserialize, Validate)]
pub struct RetrieveRequest {
    #[validate(length(min = 1, max = 4000))]
    pub query: String,

    /// Final document count; defaults to `retrieval.default_top_k`
    #[validate(range(min = 1, max = 200))]
    pub top_k: Option<usize>,
}

/// Retrieval response: the orchestrated result plus the assembled context
#[derive(Serialize)]
pub struct RetrieveResponse {
    #[serde(flatten)]
    pub result: OrchestratedResult,
    pub context: String,
}

/// Run one orchestrated retrieval
pub async fn retrieve(
    State(state): State<AppState>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>> {
    let metrics = RequestMetrics::start("POST", "/v1/retrieve");
    let response = run_retrieve(&state, request).await;
    metrics.finish_result(&response);
    response.map(Json)
}

async fn run_retrieve(state: &AppState, request: RetrieveRequest) -> Result<RetrieveResponse> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let top_k = request.top_k.unwrap_or(state.config.retrieval.default_top_k);
    let result = state.orchestrator.retrieve(&request.query, top_k).await?;

    tracing::info!(
        top_k,
        documents = result.documents.len(),
        rejected = result.rejected,
        latency_ms = result.processing_time_ms,
        "Retrieve request served"
    );

    let context = result.assemble_context();
    Ok(RetrieveResponse { result, context })
}
