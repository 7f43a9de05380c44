//! RecallForge Common Library
//!
//! Shared code for the RecallForge retrieval services including:
//! - Document models and the document store abstraction
//! - Embedding client abstraction
//! - Error types and handling
//! - Configuration management
//! - Query screening, entity recognition and context windows
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod text;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::models::{Document, DocumentKind, ScoreSource, ScoredResult};
pub use db::{DocumentFilter, DocumentStore, InMemoryDocumentStore};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
