//! Retrieval orchestrator
//!
//! Coordinates one retrieval end to end:
//! - Screens the query for injection and optionally rejects it
//! - Extracts entities and builds the enhanced query
//! - Fans out to every enabled recall stream concurrently, each under its own timeout
//! - Merges stream results and applies the context window policy
//!
//! Also owns ingestion into the document store and the local snapshot.

mod merge;

pub use merge::merge_streams;

use futures::future::join_all;
use recallforge_common::config::{AppConfig, Bm25Config, RetrievalConfig, StreamKind, StreamSettings};
use recallforge_common::context::{
    assemble_context, ContextWindowSelector, ContextWindowStrategy, Entity, EntityExtractor, EntityType,
    InjectionScreener, ScreeningRule, SecurityVerdict,
};
use recallforge_common::db::models::{Document, ScoredResult};
use recallforge_common::db::{DocumentFilter, DocumentStore, InMemoryDocumentStore};
use recallforge_common::embeddings::{create_embedder, Embedder};
use recallforge_common::errors::{AppError, Result};
use recallforge_common::metrics;
use recallforge_search::{
    streams::{DocumentAiBackend, ManagedIndexBackend},
    LocalStream, RecallStream, RemoteStream, StreamResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of one orchestrated retrieval
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratedResult {
    /// Selected documents, ordered by `strategy`
    pub documents: Vec<ScoredResult>,
    pub entities: Vec<Entity>,
    pub security_verdict: SecurityVerdict,
    /// One entry per enabled stream, in configuration order
    pub stream_results: Vec<StreamResult>,
    /// Distinct documents after merging, before selection
    pub total_candidates: usize,
    pub context_char_length: usize,
    pub processing_time_ms: u64,
    /// Query text sent to the streams
    pub enhanced_query: String,
    pub strategy: ContextWindowStrategy,
    /// True when the query was refused by the screener
    pub rejected: bool,
}

impl OrchestratedResult {
    /// Join the selected documents into a generation context
    pub fn assemble_context(&self) -> String {
        assemble_context(&self.documents)
    }

    fn rejected(verdict: SecurityVerdict, strategy: ContextWindowStrategy, start: Instant) -> Self {
        Self {
            documents: Vec::new(),
            entities: Vec::new(),
            enhanced_query: verdict.sanitized_query.clone(),
            security_verdict: verdict,
            stream_results: Vec::new(),
            total_candidates: 0,
            context_char_length: 0,
            processing_time_ms: start.elapsed().as_millis() as u64,
            strategy,
            rejected: true,
        }
    }
}

/// A document that could not be ingested
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of an ingestion batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: usize,
    /// Documents embedded during this batch
    pub embedded: usize,
    pub failed: Vec<IngestFailure>,
    /// Local snapshot size after the rebuild
    pub index_size: usize,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    config: RetrievalConfig,
    store: Option<Arc<dyn DocumentStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    streams: BTreeMap<StreamKind, Arc<dyn RecallStream>>,
}

impl OrchestratorBuilder {
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Register the stream serving `stream.kind()`, replacing any earlier one
    pub fn stream(mut self, stream: Arc<dyn RecallStream>) -> Self {
        self.streams.insert(stream.kind(), stream);
        self
    }

    /// Configuration is validated per call to `retrieve`, not here.
    pub fn build(self) -> Result<Orchestrator> {
        let local = Arc::new(LocalStream::new(&self.config, self.embedder.clone()));

        let mut streams = self.streams;
        streams
            .entry(StreamKind::Local)
            .or_insert_with(|| local.clone() as Arc<dyn RecallStream>);

        Ok(Orchestrator {
            screener: InjectionScreener::new(&self.config.security)?,
            extractor: EntityExtractor::new()?,
            selector: ContextWindowSelector::new(self.config.context_window_strategy, self.config.max_context_length),
            store: self.store.unwrap_or_else(|| Arc::new(InMemoryDocumentStore::new())),
            embedder: self.embedder,
            local,
            streams,
            ingest_lock: Mutex::new(()),
            config: self.config,
        })
    }
}

/// Retrieval orchestrator
pub struct Orchestrator {
    config: RetrievalConfig,
    store: Arc<dyn DocumentStore>,
    embedder: Option<Arc<dyn Embedder>>,
    local: Arc<LocalStream>,
    streams: BTreeMap<StreamKind, Arc<dyn RecallStream>>,
    screener: InjectionScreener,
    extractor: EntityExtractor,
    selector: ContextWindowSelector,
    ingest_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn builder(config: RetrievalConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            store: None,
            embedder: None,
            streams: BTreeMap::new(),
        }
    }

    /// Wire the orchestrator from application configuration: embedder,
    /// and a remote stream for every enabled remote backend.
    pub fn from_config(config: &AppConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let mut builder = Self::builder(config.retrieval.clone())
            .store(store)
            .embedder(create_embedder(&config.embedding)?);

        let streams = &config.retrieval.streams;
        if streams.managed_index.enabled {
            let backend = ManagedIndexBackend::new(&config.backends.managed_index)?;
            builder = builder.stream(Arc::new(RemoteStream::new(StreamKind::ManagedIndex, Arc::new(backend))));
        }
        if streams.document_ai.enabled {
            let backend = DocumentAiBackend::new(&config.backends.document_ai)?;
            builder = builder.stream(Arc::new(RemoteStream::new(StreamKind::DocumentAi, Arc::new(backend))));
        }

        builder.build()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Append a custom entity pattern
    pub fn register_entity_pattern(&mut self, pattern: &str, entity_type: EntityType, confidence: f32) -> Result<()> {
        self.extractor.register(pattern, entity_type, confidence)
    }

    /// Append a custom screening rule
    pub fn add_screening_rule(&mut self, rule: ScreeningRule) {
        self.screener.add_rule(rule);
    }

    /// Enabled streams in configuration order
    pub fn enabled_streams(&self) -> Vec<StreamKind> {
        StreamKind::ALL
            .into_iter()
            .filter(|k| self.config.streams.get(*k).enabled)
            .collect()
    }

    /// Documents in the current local snapshot
    pub async fn index_size(&self) -> usize {
        self.local.snapshot().await.len()
    }

    /// Run one retrieval
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<OrchestratedResult> {
        let start = Instant::now();

        // Fatal checks, before any I/O
        self.config.validate()?;
        if query.trim().is_empty() {
            return Err(AppError::validation("query", "query must not be empty"));
        }
        if top_k == 0 {
            return Err(AppError::validation("top_k", "top_k must be positive"));
        }
        let plan = self.plan()?;
        let strategy = self.selector.strategy();

        // 1. Screen
        let verdict = if self.config.enable_injection_detection {
            let verdict = self.screener.validate(query);
            metrics::record_screening(verdict.is_safe, verdict.categories());
            verdict
        } else {
            SecurityVerdict::unscreened(query)
        };

        if !verdict.is_safe {
            warn!(
                findings = verdict.findings.len(),
                short_circuited = verdict.short_circuited,
                reject = self.config.reject_unsafe_queries,
                "Unsafe query"
            );
            if self.config.reject_unsafe_queries {
                let result = OrchestratedResult::rejected(verdict, strategy, start);
                metrics::record_retrieval(start.elapsed().as_secs_f64(), strategy.as_str(), 0);
                return Ok(result);
            }
        }

        // 2. Entities
        let screened = verdict.sanitized_query.as_str();
        let (entities, enhanced_query) = if self.config.enable_entity_recognition {
            (self.extractor.extract(screened), self.extractor.enhance_query(screened))
        } else {
            (Vec::new(), screened.to_string())
        };
        debug!(entities = entities.len(), enhanced_query = %enhanced_query, "Query prepared");

        // 3. Fan out
        let stream_results = fan_out(&plan, &enhanced_query).await;

        // 4. Merge
        let weighted: Vec<(&StreamResult, f32)> = stream_results
            .iter()
            .zip(&plan)
            .map(|(result, (settings, _))| (result, settings.weight))
            .collect();
        let merged = merge_streams(&weighted);
        let total_candidates = merged.len();

        // 5. Select
        let selection = self.selector.select(merged, top_k);

        let processing_time_ms = start.elapsed().as_millis() as u64;
        let failed = stream_results.iter().filter(|r| !r.is_ok()).count();
        metrics::record_retrieval(start.elapsed().as_secs_f64(), strategy.as_str(), selection.documents.len());
        info!(
            streams = stream_results.len(),
            failed_streams = failed,
            candidates = total_candidates,
            selected = selection.documents.len(),
            context_chars = selection.context_char_length,
            strategy = %strategy,
            latency_ms = processing_time_ms,
            "Retrieval completed"
        );

        // 6. Assemble
        Ok(OrchestratedResult {
            documents: selection.documents,
            entities,
            security_verdict: verdict,
            stream_results,
            total_candidates,
            context_char_length: selection.context_char_length,
            processing_time_ms,
            enhanced_query,
            strategy,
            rejected: false,
        })
    }

    /// Enabled streams with their settings. Every enabled kind must have a
    /// registered stream.
    fn plan(&self) -> Result<Vec<(StreamSettings, Arc<dyn RecallStream>)>> {
        self.enabled_streams()
            .into_iter()
            .map(|kind| {
                let stream = self.streams.get(&kind).cloned().ok_or_else(|| {
                    AppError::configuration(format!("stream '{}' is enabled but not configured", kind))
                })?;
                Ok((*self.config.streams.get(kind), stream))
            })
            .collect()
    }

    /// Store and index a batch of documents
    pub async fn ingest(&self, documents: Vec<Document>) -> Result<IngestReport> {
        let _guard = self.ingest_lock.lock().await;
        let mut report = IngestReport::default();

        let mut pending = Vec::with_capacity(documents.len());
        for mut document in documents {
            if document.id.trim().is_empty() {
                document.id = Document::content_id(&document.content);
            }
            if document.content.trim().is_empty() {
                report.failed.push(IngestFailure {
                    id: document.id,
                    reason: "content must not be empty".to_string(),
                });
                continue;
            }
            pending.push(document);
        }

        report.embedded = self.embed_missing(&mut pending).await;

        for document in pending {
            let id = document.id.clone();
            match self.store.put(document).await {
                Ok(()) => report.accepted += 1,
                Err(e) => {
                    warn!(document_id = %id, error = %e, "Failed to store document");
                    report.failed.push(IngestFailure { id, reason: e.to_string() });
                }
            }
        }

        report.index_size = self.rebuild().await?;
        metrics::record_ingestion(report.accepted, report.index_size);
        info!(
            accepted = report.accepted,
            embedded = report.embedded,
            failed = report.failed.len(),
            index_size = report.index_size,
            "Ingestion completed"
        );
        Ok(report)
    }

    /// Remove a document; returns whether it existed
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.ingest_lock.lock().await;
        let removed = self.store.remove(id).await?;
        if removed {
            self.rebuild().await?;
            info!(document_id = %id, "Document removed");
        }
        Ok(removed)
    }

    /// Rebuild the local snapshot from the store
    pub async fn reindex(&self) -> Result<usize> {
        let _guard = self.ingest_lock.lock().await;
        self.rebuild().await
    }

    /// Retune BM25 and rebuild the local snapshot with the new parameters.
    ///
    /// Serialized with ingestion so a concurrent rebuild cannot swap in a
    /// snapshot indexed with stale parameters.
    pub async fn set_bm25_params(&self, k1: f32, b: f32) -> Result<()> {
        Bm25Config { k1, b }.validate().map_err(|e| match e {
            AppError::Configuration { message } => AppError::validation("bm25", message),
            other => other,
        })?;

        let _guard = self.ingest_lock.lock().await;
        self.local.set_bm25_params(k1, b).await;
        Ok(())
    }

    /// Caller holds `ingest_lock`
    async fn rebuild(&self) -> Result<usize> {
        let documents = self.store.get(&DocumentFilter::all()).await?;
        Ok(self.local.replace(documents).await)
    }

    /// Embed documents without a vector. Failures leave documents lexical-only.
    async fn embed_missing(&self, documents: &mut [Document]) -> usize {
        let Some(embedder) = &self.embedder else {
            return 0;
        };

        let missing: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return 0;
        }

        let texts: Vec<String> = missing.iter().map(|&i| documents[i].content.clone()).collect();
        match embedder.embed_batch(&texts).await {
            Ok(embeddings) if embeddings.len() == missing.len() => {
                for (&i, embedding) in missing.iter().zip(embeddings) {
                    documents[i].embedding = Some(embedding);
                }
                missing.len()
            }
            Ok(embeddings) => {
                warn!(
                    expected = missing.len(),
                    received = embeddings.len(),
                    "Embedding count mismatch, indexing lexically only"
                );
                0
            }
            Err(e) => {
                warn!(error = %e, documents = missing.len(), "Embedding failed, indexing lexically only");
                0
            }
        }
    }
}

/// One task per stream; join errors become stream errors
async fn fan_out(plan: &[(StreamSettings, Arc<dyn RecallStream>)], query: &str) -> Vec<StreamResult> {
    let handles: Vec<_> = plan
        .iter()
        .map(|(settings, stream)| {
            let stream = stream.clone();
            let settings = *settings;
            let query = query.to_string();
            tokio::spawn(async move { stream.fetch(&query, settings.top_k, settings.timeout()).await })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .zip(plan)
        .map(|(joined, (_, stream))| {
            joined.unwrap_or_else(|e| {
                warn!(stream = stream.name(), error = %e, "Stream task failed");
                StreamResult::failed(stream.name(), stream.kind(), format!("stream task failed: {}", e), 0)
            })
        })
        .collect()
}
