//! Local recall stream over the in-process corpus snapshot

use super::RecallStream;
use crate::retrieval::{CorpusSnapshot, HybridRetriever};
use async_trait::async_trait;
use recallforge_common::config::{Bm25Config, RetrievalConfig, StreamKind};
use recallforge_common::db::models::{Document, ScoredResult};
use recallforge_common::embeddings::Embedder;
use recallforge_common::errors::Result;
use std::sync::Arc;
use tokio::sync::RwLock;

/// BM25 plus optional vector search over a copy-on-write snapshot.
///
/// Searches clone the current `Arc<CorpusSnapshot>` and release the lock
/// before any embedding I/O. `replace` builds the next snapshot off-lock.
pub struct LocalStream {
    snapshot: RwLock<Arc<CorpusSnapshot>>,
    bm25: RwLock<Bm25Config>,
    retriever: HybridRetriever,
    embedder: Option<Arc<dyn Embedder>>,
}

impl LocalStream {
    pub fn new(config: &RetrievalConfig, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(CorpusSnapshot::empty(&config.bm25))),
            bm25: RwLock::new(config.bm25),
            retriever: HybridRetriever::new(config.vector_weight, config.use_hybrid_search),
            embedder,
        }
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Arc<CorpusSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Index `documents` into a fresh snapshot and swap it in.
    /// Returns the new snapshot size.
    pub async fn replace(&self, documents: Vec<Document>) -> usize {
        let params = *self.bm25.read().await;
        let next = Arc::new(CorpusSnapshot::build(documents, &params));
        let size = next.len();

        *self.snapshot.write().await = next;
        tracing::info!(documents = size, "Local snapshot replaced");
        size
    }

    /// Retune BM25 and rebuild the current snapshot with the new parameters
    pub async fn set_bm25_params(&self, k1: f32, b: f32) {
        {
            let mut params = self.bm25.write().await;
            params.k1 = k1;
            params.b = b;
        }

        let current = self.snapshot().await;
        let params = *self.bm25.read().await;
        let next = Arc::new(CorpusSnapshot::from_shared(current.documents().to_vec(), &params));
        *self.snapshot.write().await = next;
        tracing::info!(k1, b, "BM25 parameters updated");
    }
}

#[async_trait]
impl RecallStream for LocalStream {
    fn name(&self) -> &str {
        StreamKind::Local.as_str()
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Local
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        let snapshot = self.snapshot().await;
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = match &self.embedder {
            Some(embedder) if self.retriever.wants_embedding() => Some(embedder.embed(query).await?),
            _ => None,
        };

        Ok(self
            .retriever
            .retrieve(&snapshot, query, query_embedding.as_deref(), top_k))
    }
}
