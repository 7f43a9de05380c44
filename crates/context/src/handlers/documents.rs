//! Document management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::orchestrator::IngestReport;
use crate::AppState;
use recallforge_common::{
    db::models::{Document, DocumentKind},
    errors::{AppError, Result},
    metrics::RequestMetrics,
};

/// Request to ingest a batch of documents
#[derive(Debug, Deserialize, Validate)]
pub struct IngestRequest {
    #[validate(length(min = 1, max = 1000), nested)]
    pub documents: Vec<DocumentInput>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct DocumentInput {
    /// Derived from the content when omitted
    #[serde(default)]
    pub id: Option<String>,

    #[validate(length(min = 1, max = 200000))]
    pub content: String,

    pub kind: DocumentKind,

    #[serde(default)]
    pub source_url: Option<String>,

    /// Precomputed embedding; computed during ingestion when omitted
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl From<DocumentInput> for Document {
    fn from(input: DocumentInput) -> Self {
        let mut document = Document::with_id(input.id.unwrap_or_default(), input.content, input.kind);
        document.source_url = input.source_url;
        document.embedding = input.embedding;
        document.metadata = input.metadata;
        document
    }
}

/// Ingest documents into the store and rebuild the local index
pub async fn ingest_documents(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestReport>> {
    let metrics = RequestMetrics::start("POST", "/v1/documents");
    let report = run_ingest(&state, request).await;
    metrics.finish_result(&report);
    report.map(Json)
}

async fn run_ingest(state: &AppState, request: IngestRequest) -> Result<IngestReport> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let documents: Vec<Document> = request.documents.into_iter().map(Document::from).collect();
    state.orchestrator.ingest(documents).await
}

/// Remove a document
pub async fn delete_document(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    let metrics = RequestMetrics::start("DELETE", "/v1/documents/{id}");
    let outcome = match state.orchestrator.remove(&id).await {
        Ok(true) => {
            tracing::info!(document_id = %id, "Document deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(AppError::DocumentNotFound { id }),
        Err(e) => Err(e),
    };

    metrics.finish(match &outcome {
        Ok(status) => status.as_u16(),
        Err(e) => e.status_code().as_u16(),
    });
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_conversion() {
        let input: DocumentInput = serde_json::from_str(
            r#"{"content":"cats are great","kind":"log-entry","metadata":{"source":"syslog"}}"#,
        )
        .unwrap();
        let document = Document::from(input);

        assert!(document.id.is_empty());
        assert_eq!(document.kind, DocumentKind::LogEntry);
        assert_eq!(document.metadata.get("source").map(String::as_str), Some("syslog"));
        assert!(document.embedding.is_none());
    }

    #[test]
    fn test_empty_batch_fails_validation() {
        let request = IngestRequest { documents: Vec::new() };
        tokio_test::assert_err!(request.validate());
    }

    #[test]
    fn test_nested_content_is_validated() {
        let request: IngestRequest =
            serde_json::from_str(r#"{"documents":[{"content":"","kind":"code"}]}"#).unwrap();
        assert!(request.validate().is_err());
    }
}
