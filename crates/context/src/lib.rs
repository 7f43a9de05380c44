//! RecallForge Context Engine
//!
//! The retrieval orchestrator and the thin HTTP service around it:
//! - Query screening and entity-enriched query rewriting
//! - Concurrent fan-out to the enabled recall streams
//! - Stream merging and context window selection
//! - Document ingestion into the store and local index

pub mod handlers;
pub mod orchestrator;

pub use orchestrator::{IngestFailure, IngestReport, OrchestratedResult, Orchestrator, OrchestratorBuilder};

use axum::{
    routing::{delete, get, post},
    Router,
};
use recallforge_common::config::AppConfig;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/retrieve", post(handlers::retrieve::retrieve))
        .route("/documents", post(handlers::documents::ingest_documents))
        .route("/documents/{id}", delete(handlers::documents::delete_document))
        .route("/ready", get(handlers::health::ready));

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use recallforge_common::config::RetrievalConfig;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let mut config = AppConfig::default();
        config.retrieval = RetrievalConfig {
            use_hybrid_search: false,
            ..RetrievalConfig::default()
        };
        let orchestrator = Orchestrator::builder(config.retrieval.clone()).build().unwrap();
        create_router(AppState {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
        })
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ingest_then_retrieve() {
        let app = app();

        let ingest = post_json(
            "/v1/documents",
            json!({
                "documents": [
                    {"id": "1", "content": "cats are great", "kind": "knowledge"},
                    {"id": "2", "content": "dogs are loyal", "kind": "knowledge"},
                    {"id": "3", "content": "cats and dogs coexist", "kind": "knowledge"}
                ]
            }),
        );
        let response = app.clone().oneshot(ingest).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["accepted"], 3);
        assert_eq!(report["index_size"], 3);

        let response = app
            .oneshot(post_json("/v1/retrieve", json!({"query": "cats", "top_k": 5})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let ids: Vec<&str> = body["documents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["document"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(body["context"], "cats are great\n\ncats and dogs coexist");
        assert_eq!(body["strategy"], "balanced");
        assert_eq!(body["rejected"], false);
    }

    #[tokio::test]
    async fn test_retrieve_rejects_empty_query() {
        let response = app()
            .oneshot(post_json("/v1/retrieve", json!({"query": ""})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_ingest_rejects_empty_batch() {
        let response = app()
            .oneshot(post_json("/v1/documents", json!({"documents": []})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_delete_unknown_document() {
        let request = Request::builder()
            .method("DELETE")
            .uri("/v1/documents/missing")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
