//! Remote recall streams
//!
//! Provides:
//! - `SearchBackend`, the adapter seam for hosted search services
//! - A managed search index adapter (API-key header auth)
//! - A document AI corpus adapter (bearer auth)
//! - `RemoteStream`, which maps backend hits into scored documents

use super::RecallStream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recallforge_common::config::{DocumentAiConfig, ManagedIndexConfig, StreamKind};
use recallforge_common::db::models::{normalize_by_max, sort_by_score, Document, DocumentKind, ScoreSource, ScoredResult};
use recallforge_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One hit returned by a remote backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteHit {
    pub content: String,
    pub score: f32,
    pub source_id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Creation time reported by the backend, if any
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Trait for hosted search services
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name for logs and error messages
    fn name(&self) -> &str;

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RemoteHit>>;
}

/// Recall stream over a `SearchBackend`
pub struct RemoteStream {
    kind: StreamKind,
    backend: Arc<dyn SearchBackend>,
}

impl RemoteStream {
    pub fn new(kind: StreamKind, backend: Arc<dyn SearchBackend>) -> Self {
        Self { kind, backend }
    }

    fn to_result(&self, hit: RemoteHit) -> ScoredResult {
        // Undated hits sort after every dated document under recency
        let created_at = hit.created_at.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut document = Document::with_id(hit.source_id, hit.content, DocumentKind::ExternalResult)
            .with_created_at(created_at)
            .with_metadata("backend", self.backend.name());
        if let Some(url) = hit.url {
            document = document.with_source_url(url);
        }

        let score = if hit.score.is_finite() { hit.score.max(0.0) } else { 0.0 };
        ScoredResult::new(Arc::new(document), score, ScoreSource::Remote)
    }
}

#[async_trait]
impl RecallStream for RemoteStream {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn kind(&self) -> StreamKind {
        self.kind
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        let hits = self.backend.search(query, top_k).await?;
        tracing::debug!(backend = self.backend.name(), hits = hits.len(), "Remote backend responded");

        let mut results: Vec<ScoredResult> = hits
            .into_iter()
            .filter(|hit| !hit.source_id.is_empty())
            .map(|hit| self.to_result(hit))
            .collect();

        normalize_by_max(&mut results);
        sort_by_score(&mut results);
        results.truncate(top_k);
        Ok(results)
    }
}

fn http_client(service: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder().build().map_err(|e| AppError::Upstream {
        service: service.to_string(),
        message: format!("Failed to create HTTP client: {}", e),
    })
}

fn required(value: &Option<String>, field: &str) -> Result<String> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::configuration(format!("{} is required", field)))
}

async fn read_json<T: for<'de> Deserialize<'de>>(service: &str, response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Upstream {
            service: service.to_string(),
            message: format!("API error {}: {}", status, body),
        });
    }

    response.json().await.map_err(|e| AppError::Upstream {
        service: service.to_string(),
        message: format!("Failed to parse response: {}", e),
    })
}

// ============================================================================
// Managed search index
// ============================================================================

/// Managed search index client
pub struct ManagedIndexBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    index_name: String,
}

#[derive(Serialize)]
struct ManagedIndexRequest<'a> {
    search: &'a str,
    top: usize,
}

#[derive(Deserialize)]
struct ManagedIndexResponse {
    #[serde(default)]
    value: Vec<ManagedIndexDocument>,
}

#[derive(Deserialize)]
struct ManagedIndexDocument {
    id: String,
    #[serde(default)]
    content: String,
    #[serde(rename = "@search.score", default)]
    score: f32,
    #[serde(default)]
    url: Option<String>,
    #[serde(rename = "createdAt", default)]
    created_at: Option<DateTime<Utc>>,
}

impl ManagedIndexBackend {
    const SERVICE: &'static str = "managed_index";

    pub fn new(config: &ManagedIndexConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(Self::SERVICE)?,
            endpoint: required(&config.endpoint, "backends.managed_index.endpoint")?
                .trim_end_matches('/')
                .to_string(),
            api_key: required(&config.api_key, "backends.managed_index.api_key")?,
            index_name: config.index_name.clone(),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/indexes/{}/docs/search", self.endpoint, self.index_name)
    }
}

#[async_trait]
impl SearchBackend for ManagedIndexBackend {
    fn name(&self) -> &str {
        Self::SERVICE
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RemoteHit>> {
        let response = self
            .client
            .post(self.search_url())
            .header("api-key", &self.api_key)
            .json(&ManagedIndexRequest { search: query, top: top_k })
            .send()
            .await
            .map_err(|e| AppError::Upstream {
                service: Self::SERVICE.to_string(),
                message: format!("Request failed: {}", e),
            })?;

        let body: ManagedIndexResponse = read_json(Self::SERVICE, response).await?;
        Ok(body
            .value
            .into_iter()
            .map(|d| RemoteHit {
                content: d.content,
                score: d.score,
                source_id: d.id,
                url: d.url,
                created_at: d.created_at,
            })
            .collect())
    }
}

// ============================================================================
// Document AI corpus
// ============================================================================

/// Document AI corpus query client
pub struct DocumentAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    corpus: String,
}

#[derive(Serialize)]
struct DocumentAiRequest<'a> {
    query: &'a str,
    page_size: usize,
}

#[derive(Deserialize)]
struct DocumentAiResponse {
    #[serde(default)]
    documents: Vec<DocumentAiDocument>,
}

#[derive(Deserialize)]
struct DocumentAiDocument {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    relevance: f32,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
}

impl DocumentAiBackend {
    const SERVICE: &'static str = "document_ai";

    pub fn new(config: &DocumentAiConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(Self::SERVICE)?,
            endpoint: required(&config.endpoint, "backends.document_ai.endpoint")?
                .trim_end_matches('/')
                .to_string(),
            api_key: required(&config.api_key, "backends.document_ai.api_key")?,
            corpus: config.corpus.clone(),
        })
    }

    fn query_url(&self) -> String {
        format!("{}/corpora/{}:query", self.endpoint, self.corpus)
    }
}

#[async_trait]
impl SearchBackend for DocumentAiBackend {
    fn name(&self) -> &str {
        Self::SERVICE
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RemoteHit>> {
        let response = self
            .client
            .post(self.query_url())
            .bearer_auth(&self.api_key)
            .json(&DocumentAiRequest { query, page_size: top_k })
            .send()
            .await
            .map_err(|e| AppError::Upstream {
                service: Self::SERVICE.to_string(),
                message: format!("Request failed: {}", e),
            })?;

        let body: DocumentAiResponse = read_json(Self::SERVICE, response).await?;
        Ok(body
            .documents
            .into_iter()
            .map(|d| RemoteHit {
                content: d.text,
                score: d.relevance,
                source_id: d.id,
                url: d.uri,
                created_at: d.create_time,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use recallforge_common::context::{ContextWindowSelector, ContextWindowStrategy};
    use std::time::Duration;

    struct FakeBackend {
        hits: Vec<RemoteHit>,
        fail: bool,
    }

    #[async_trait]
    impl SearchBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RemoteHit>> {
            if self.fail {
                return Err(AppError::Upstream {
                    service: "fake".to_string(),
                    message: "503".to_string(),
                });
            }
            Ok(self.hits.clone())
        }
    }

    fn hit(id: &str, score: f32) -> RemoteHit {
        RemoteHit {
            content: format!("content of {}", id),
            score,
            source_id: id.to_string(),
            url: Some(format!("https://example.org/{}", id)),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_maps_hits_to_external_results() {
        let backend = FakeBackend {
            hits: vec![hit("b", 2.0), hit("a", 8.0), hit("", 5.0), hit("c", -1.0)],
            fail: false,
        };
        let stream = RemoteStream::new(StreamKind::ManagedIndex, Arc::new(backend));
        let results = stream.search("q", 10).await.unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[1].score - 0.25).abs() < 1e-6);
        assert_eq!(results[2].score, 0.0);
        assert!(results.iter().all(|r| r.source == ScoreSource::Remote));

        let doc = &results[0].document;
        assert_eq!(doc.kind, DocumentKind::ExternalResult);
        assert_eq!(doc.source_url.as_deref(), Some("https://example.org/a"));
        assert_eq!(doc.metadata.get("backend").map(String::as_str), Some("fake"));
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_in_fetch() {
        let stream = RemoteStream::new(StreamKind::DocumentAi, Arc::new(FakeBackend { hits: vec![], fail: true }));
        let result = stream.fetch("q", 5, Duration::from_secs(1)).await;

        assert_eq!(result.source_name, "document_ai");
        assert_eq!(result.kind, StreamKind::DocumentAi);
        assert!(result.error.unwrap().contains("503"));
    }

    #[test]
    fn test_backends_require_endpoint_and_key() {
        assert!(ManagedIndexBackend::new(&ManagedIndexConfig::default()).is_err());
        assert!(DocumentAiBackend::new(&DocumentAiConfig::default()).is_err());

        let config = ManagedIndexConfig {
            endpoint: Some("https://search.example.net/".to_string()),
            api_key: Some("key".to_string()),
            ..ManagedIndexConfig::default()
        };
        let backend = ManagedIndexBackend::new(&config).unwrap();
        assert_eq!(backend.search_url(), "https://search.example.net/indexes/knowledge/docs/search");

        let config = DocumentAiConfig {
            endpoint: Some("https://docs.example.net".to_string()),
            api_key: Some("token".to_string()),
            ..DocumentAiConfig::default()
        };
        let backend = DocumentAiBackend::new(&config).unwrap();
        assert_eq!(backend.query_url(), "https://docs.example.net/corpora/default:query");
    }

    #[test]
    fn test_managed_index_response_shape() {
        let body = r#"{"value":[{"id":"x","content":"hello","@search.score":3.5},
            {"id":"y","content":"dated","@search.score":1.0,"createdAt":"2024-03-01T12:00:00Z"}]}"#;
        let parsed: ManagedIndexResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.value[0].id, "x");
        assert_eq!(parsed.value[0].score, 3.5);
        assert!(parsed.value[0].url.is_none());
        assert!(parsed.value[0].created_at.is_none());
        assert_eq!(
            parsed.value[1].created_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_undated_hits_get_stable_timestamp() {
        let mut dated = hit("dated", 1.0);
        dated.created_at = Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap());
        let backend = FakeBackend {
            hits: vec![hit("undated", 2.0), dated],
            fail: false,
        };
        let stream = RemoteStream::new(StreamKind::ManagedIndex, Arc::new(backend));

        let first = stream.search("q", 10).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = stream.search("q", 10).await.unwrap();

        assert_eq!(first[0].id(), "undated");
        assert_eq!(first[0].document.created_at, DateTime::<Utc>::MIN_UTC);
        assert_eq!(first[0].document.created_at, second[0].document.created_at);
        assert_eq!(first[1].document.created_at, Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_recency_ranks_undated_remote_hits_last() {
        let backend = FakeBackend {
            hits: vec![hit("ext", 9.0)],
            fail: false,
        };
        let stream = RemoteStream::new(StreamKind::DocumentAi, Arc::new(backend));
        let mut candidates = stream.search("q", 10).await.unwrap();

        let local = Document::with_id("recent", "stored", DocumentKind::Knowledge)
            .with_created_at(Utc::now() - chrono::Duration::seconds(1));
        candidates.push(ScoredResult::new(Arc::new(local), 0.1, ScoreSource::Lexical));

        let selector = ContextWindowSelector::new(ContextWindowStrategy::Recency, 1_000);
        let selection = selector.select(candidates, 10);
        let ids: Vec<&str> = selection.documents.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["recent", "ext"]);
    }
}
