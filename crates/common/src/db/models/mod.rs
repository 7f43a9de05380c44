//! Data model for RecallForge
//!
//! Documents are owned by the store; scored results are request-scoped.

mod document;
mod scored;

pub use document::{Document, DocumentKind};
pub use scored::{compare_by_score, normalize_by_max, sort_by_score, ScoreSource, ScoredResult};
