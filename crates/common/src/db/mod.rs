//! Document store collaborator
//!
//! Provides:
//! - Document and scored-result models
//! - The `DocumentStore` trait the orchestrator is constructed with
//! - An in-memory store used by the service binary and tests
//!
//! The retrieval core never persists anything itself; it reads through this
//! trait during reindexing and writes through it during ingestion.

pub mod models;

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use models::{Document, DocumentKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Selection criteria for `DocumentStore::get`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFilter {
    /// Restrict to these kinds (empty means all)
    #[serde(default)]
    pub kinds: Vec<DocumentKind>,

    /// Only documents created strictly after this instant
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,

    /// Maximum number of documents to return
    #[serde(default)]
    pub limit: Option<usize>,
}

impl DocumentFilter {
    /// Filter matching every document
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kinds(kinds: impl IntoIterator<Item = DocumentKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Check a single document against the filter (ignores `limit`)
    pub fn matches(&self, document: &Document) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&document.kind) {
            return false;
        }
        if let Some(after) = self.created_after {
            if document.created_at <= after {
                return false;
            }
        }
        true
    }
}

/// Storage collaborator for documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch documents matching the filter, ordered by id
    async fn get(&self, filter: &DocumentFilter) -> Result<Vec<Document>>;

    /// Insert or replace a document
    async fn put(&self, document: Document) -> Result<()>;

    /// Remove a document, returning whether it existed
    async fn remove(&self, id: &str) -> Result<bool>;
}

/// In-memory document store
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<String, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with documents
    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let documents = documents
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        Self {
            documents: RwLock::new(documents),
        }
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let documents = self.documents.read().await;
        let limit = filter.limit.unwrap_or(usize::MAX);

        let matched: Vec<Document> = documents
            .values()
            .filter(|d| filter.matches(d))
            .take(limit)
            .cloned()
            .collect();

        debug!(matched = matched.len(), total = documents.len(), "Document store read");
        Ok(matched)
    }

    async fn put(&self, document: Document) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut documents = self.documents.write().await;
        Ok(documents.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_put_get_remove() {
        let store = InMemoryDocumentStore::new();
        let doc = Document::with_id("a", "cats are great", DocumentKind::Knowledge);

        tokio_test::block_on(store.put(doc.clone())).unwrap();
        let all = tokio_test::block_on(store.get(&DocumentFilter::all())).unwrap();
        assert_eq!(all, vec![doc]);

        assert!(tokio_test::block_on(store.remove("a")).unwrap());
        assert!(!tokio_test::block_on(store.remove("a")).unwrap());
        assert!(tokio_test::block_on(store.is_empty()));
    }

    #[tokio::test]
    async fn test_filter_by_kind_and_time() {
        let now = Utc::now();
        let store = InMemoryDocumentStore::with_documents(vec![
            Document::with_id("old", "x", DocumentKind::Code).with_created_at(now - Duration::days(2)),
            Document::with_id("new", "y", DocumentKind::Code).with_created_at(now),
            Document::with_id("conv", "z", DocumentKind::Conversation).with_created_at(now),
        ]);

        let code = store.get(&DocumentFilter::kinds([DocumentKind::Code])).await.unwrap();
        assert_eq!(code.len(), 2);

        let recent = store
            .get(&DocumentFilter {
                kinds: vec![DocumentKind::Code],
                created_after: Some(now - Duration::days(1)),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "new");
    }

    #[tokio::test]
    async fn test_limit_applies_in_id_order() {
        let store = InMemoryDocumentStore::with_documents(vec![
            Document::with_id("c", "3", DocumentKind::Knowledge),
            Document::with_id("a", "1", DocumentKind::Knowledge),
            Document::with_id("b", "2", DocumentKind::Knowledge),
        ]);
        let limited = store
            .get(&DocumentFilter { limit: Some(2), ..DocumentFilter::default() })
            .await
            .unwrap();
        let ids: Vec<_> = limited.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
