//! Document entity shared by every recall stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Number of hex characters kept from a content digest when deriving an id
const CONTENT_ID_HEX_LEN: usize = 16;

/// Collection/type tag a document belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    /// Past conversation turns
    Conversation,
    /// Specifications and design documents
    Specification,
    /// Results mapped from a remote search backend
    ExternalResult,
    /// Curated knowledge bucket entries
    Knowledge,
    /// Ingested log lines
    LogEntry,
    /// Source code
    Code,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 6] = [
        DocumentKind::Conversation,
        DocumentKind::Specification,
        DocumentKind::ExternalResult,
        DocumentKind::Knowledge,
        DocumentKind::LogEntry,
        DocumentKind::Code,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Conversation => "conversation",
            DocumentKind::Specification => "specification",
            DocumentKind::ExternalResult => "external-result",
            DocumentKind::Knowledge => "knowledge",
            DocumentKind::LogEntry => "log-entry",
            DocumentKind::Code => "code",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrievable document.
///
/// Owned by the document store; the retrieval path only ever sees it behind an
/// `Arc` and never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    pub content: String,

    pub kind: DocumentKind,

    /// Source locator, if the document came from somewhere addressable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Precomputed embedding (dimension is fixed by the embedder in use).
    /// Accepted on input, never written back out in responses.
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,

    /// Free-form tags (source, bucket, owner, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    /// Create a document with a random id and the current timestamp
    pub fn new(content: impl Into<String>, kind: DocumentKind) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), content, kind)
    }

    /// Create a document with an explicit id
    pub fn with_id(id: impl Into<String>, content: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            kind,
            source_url: None,
            created_at: Utc::now(),
            embedding: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Length of the content in characters (the unit of the context budget)
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Derive a stable id from content, used when a caller submits none
    pub fn content_id(content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        let mut id = hex::encode(digest);
        id.truncate(CONTENT_ID_HEX_LEN);
        format!("doc_{}", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_is_stable() {
        let a = Document::content_id("cats are great");
        let b = Document::content_id("cats are great");
        assert_eq!(a, b);
        assert_eq!(a.len(), "doc_".len() + CONTENT_ID_HEX_LEN);
        assert_ne!(a, Document::content_id("dogs are loyal"));
    }

    #[test]
    fn test_char_len_counts_chars_not_bytes() {
        let doc = Document::new("héllo", DocumentKind::Knowledge);
        assert_eq!(doc.char_len(), 5);
        assert_eq!(doc.content.len(), 6);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&DocumentKind::ExternalResult).unwrap();
        assert_eq!(json, "\"external-result\"");
        assert_eq!(DocumentKind::LogEntry.to_string(), "log-entry");
    }

    #[test]
    fn test_embedding_is_read_but_not_written() {
        let doc = Document::with_id("d1", "cats", DocumentKind::Knowledge).with_embedding(vec![0.5; 8]);
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["id"], "d1");

        let parsed: Document = serde_json::from_str(
            r#"{"id":"d2","content":"dogs","kind":"knowledge","created_at":"2024-01-01T00:00:00Z","embedding":[1.0,0.0]}"#,
        )
        .unwrap();
        assert_eq!(parsed.embedding, Some(vec![1.0, 0.0]));
    }
}
