//! Recall streams
//!
//! A recall stream is one independent source of candidate documents. Every
//! stream exposes the same `fetch` contract: it never fails, it reports its
//! own latency, and errors or timeouts come back as data on the
//! `StreamResult` so the orchestrator can tolerate partial completion.

mod local;
mod remote;

pub use local::LocalStream;
pub use remote::{DocumentAiBackend, ManagedIndexBackend, RemoteHit, RemoteStream, SearchBackend};

use async_trait::async_trait;
use recallforge_common::config::StreamKind;
use recallforge_common::db::models::ScoredResult;
use recallforge_common::errors::{AppError, Result};
use recallforge_common::metrics::{record_stream, StreamOutcome};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Outcome of one stream fetch
#[derive(Debug, Clone, Serialize)]
pub struct StreamResult {
    pub source_name: String,
    pub kind: StreamKind,
    pub results: Vec<ScoredResult>,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub timed_out: bool,
}

impl StreamResult {
    pub fn completed(source_name: impl Into<String>, kind: StreamKind, results: Vec<ScoredResult>, latency_ms: u64) -> Self {
        Self {
            source_name: source_name.into(),
            kind,
            results,
            latency_ms,
            error: None,
            timed_out: false,
        }
    }

    pub fn failed(source_name: impl Into<String>, kind: StreamKind, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            source_name: source_name.into(),
            kind,
            results: Vec::new(),
            latency_ms,
            error: Some(error.into()),
            timed_out: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Common trait for all recall streams
#[async_trait]
pub trait RecallStream: Send + Sync {
    /// Stream name used in provenance and metrics
    fn name(&self) -> &str;

    fn kind(&self) -> StreamKind;

    /// Ranked results with scores in [0, 1]
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>>;

    /// Run `search` under a timeout. Never fails.
    async fn fetch(&self, query: &str, top_k: usize, timeout: Duration) -> StreamResult {
        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.search(query, top_k)).await;
        let elapsed = start.elapsed();
        let latency_ms = elapsed.as_millis() as u64;

        match outcome {
            Ok(Ok(mut results)) => {
                results.truncate(top_k);
                record_stream(self.name(), elapsed.as_secs_f64(), StreamOutcome::Ok);
                tracing::debug!(stream = self.name(), results = results.len(), latency_ms, "Stream completed");
                StreamResult::completed(self.name(), self.kind(), results, latency_ms)
            }
            Ok(Err(e)) => {
                record_stream(self.name(), elapsed.as_secs_f64(), StreamOutcome::Error);
                tracing::warn!(stream = self.name(), error = %e, latency_ms, "Stream failed");
                StreamResult::failed(self.name(), self.kind(), e.to_string(), latency_ms)
            }
            Err(_) => {
                record_stream(self.name(), elapsed.as_secs_f64(), StreamOutcome::Timeout);
                let error = AppError::StreamTimeout {
                    stream: self.name().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                tracing::warn!(stream = self.name(), timeout_ms = timeout.as_millis() as u64, "Stream timed out");
                let mut result = StreamResult::failed(self.name(), self.kind(), error.to_string(), latency_ms);
                result.timed_out = true;
                result
            }
        }
    }
}
