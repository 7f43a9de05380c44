//! Local retrieval over an immutable corpus snapshot
//!
//! Provides two retrieval modes:
//! - BM25 search (lexical matching)
//! - Hybrid search (min-max normalized, alpha-weighted fusion of BM25 and
//!   cosine similarity over document embeddings)

mod bm25;
mod fusion;
mod hybrid;
mod vector;

pub use bm25::Bm25Index;
pub use fusion::{min_max_normalize, ScoreFusion};
pub use hybrid::HybridRetriever;
pub use vector::{cosine_similarity, VectorRetriever};

use recallforge_common::config::Bm25Config;
use recallforge_common::db::models::Document;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Retrieval mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// BM25 only
    Lexical,
    /// Fused lexical and vector
    Hybrid,
}

/// Read-only view of the local corpus used by one or more retrievals.
///
/// Built once per ingestion and swapped in whole; never mutated after build.
#[derive(Debug, Clone)]
pub struct CorpusSnapshot {
    lexical: Bm25Index,
}

impl Default for CorpusSnapshot {
    fn default() -> Self {
        Self::empty(&Bm25Config::default())
    }
}

impl CorpusSnapshot {
    pub fn empty(params: &Bm25Config) -> Self {
        Self {
            lexical: Bm25Index::new(params),
        }
    }

    /// Index `documents` into a new snapshot
    pub fn build(documents: Vec<Document>, params: &Bm25Config) -> Self {
        Self::from_shared(documents.into_iter().map(Arc::new).collect(), params)
    }

    pub fn from_shared(documents: Vec<Arc<Document>>, params: &Bm25Config) -> Self {
        let mut lexical = Bm25Index::new(params);
        lexical.index(documents);
        Self { lexical }
    }

    pub fn lexical(&self) -> &Bm25Index {
        &self.lexical
    }

    pub fn documents(&self) -> &[Arc<Document>] {
        self.lexical.documents()
    }

    pub fn len(&self) -> usize {
        self.lexical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexical.is_empty()
    }
}
