//! Per-query scored references to documents

use super::document::Document;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Which signal produced a score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// BM25 over the local inverted index
    Lexical,
    /// Cosine similarity between embeddings
    Vector,
    /// Combination of more than one signal
    Fused,
    /// Score reported by a remote search backend
    Remote,
}

/// A document reference with a relevance score.
///
/// Created per query and dropped once the orchestrator returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub document: Arc<Document>,

    pub score: f32,

    pub source: ScoreSource,

    /// Names of the recall streams that contributed this result
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<String>,
}

impl ScoredResult {
    pub fn new(document: Arc<Document>, score: f32, source: ScoreSource) -> Self {
        Self {
            document,
            score,
            source,
            streams: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }
}

/// Descending by score, ties broken by ascending document id
pub fn compare_by_score(a: &ScoredResult, b: &ScoredResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id().cmp(b.id()))
}

/// Sort a result list deterministically by score
pub fn sort_by_score(results: &mut [ScoredResult]) {
    results.sort_by(compare_by_score);
}

/// Scale scores into `[0, 1]` by dividing by the maximum.
///
/// Order is preserved. Non-positive maxima leave the list clamped at zero.
pub fn normalize_by_max(results: &mut [ScoredResult]) {
    let max = results.iter().map(|r| r.score).fold(f32::MIN, f32::max);
    if max > 0.0 {
        for result in results.iter_mut() {
            result.score = (result.score / max).clamp(0.0, 1.0);
        }
    } else {
        for result in results.iter_mut() {
            result.score = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DocumentKind;

    fn scored(id: &str, score: f32) -> ScoredResult {
        ScoredResult::new(
            Arc::new(Document::with_id(id, "text", DocumentKind::Knowledge)),
            score,
            ScoreSource::Lexical,
        )
    }

    #[test]
    fn test_sort_breaks_ties_by_id() {
        let mut results = vec![scored("b", 0.5), scored("c", 0.9), scored("a", 0.5)];
        sort_by_score(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_normalize_by_max_keeps_order() {
        let mut results = vec![scored("a", 4.0), scored("b", 2.0), scored("c", 1.0)];
        normalize_by_max(&mut results);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[1].score, 0.5);
        assert_eq!(results[2].score, 0.25);
    }
}
