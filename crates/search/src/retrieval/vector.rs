//! Vector similarity search over document embeddings
//!
//! Provides semantic search via cosine similarity

use recallforge_common::db::models::{sort_by_score, Document, ScoreSource, ScoredResult};
use std::sync::Arc;

/// Cosine similarity `a.b / (|a||b|)`. Zero for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Brute-force vector retriever
#[derive(Debug, Clone, Default)]
pub struct VectorRetriever;

impl VectorRetriever {
    /// Rank documents carrying an embedding of the query's dimension.
    /// Non-positive similarities are dropped.
    pub fn search(&self, documents: &[Arc<Document>], query_embedding: &[f32], top_k: usize) -> Vec<ScoredResult> {
        let mut skipped = 0usize;
        let mut results: Vec<ScoredResult> = documents
            .iter()
            .filter_map(|doc| {
                let embedding = doc.embedding.as_deref()?;
                if embedding.len() != query_embedding.len() {
                    skipped += 1;
                    return None;
                }
                let similarity = cosine_similarity(query_embedding, embedding);
                (similarity > 0.0)
                    .then(|| ScoredResult::new(doc.clone(), similarity.min(1.0), ScoreSource::Vector))
            })
            .collect();

        if skipped > 0 {
            tracing::debug!(skipped, dimension = query_embedding.len(), "Skipped embeddings with mismatched dimension");
        }

        sort_by_score(&mut results);
        results.truncate(top_k);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recallforge_common::db::models::DocumentKind;

    fn doc(id: &str, embedding: Option<Vec<f32>>) -> Arc<Document> {
        let doc = Document::with_id(id, id, DocumentKind::Knowledge);
        Arc::new(match embedding {
            Some(e) => doc.with_embedding(e),
            None => doc,
        })
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[3.0, 4.0], &[6.0, 8.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let docs = vec![
            doc("far", Some(vec![0.1, 1.0])),
            doc("near", Some(vec![1.0, 0.1])),
            doc("opposite", Some(vec![-1.0, 0.0])),
            doc("none", None),
            doc("wrong_dim", Some(vec![1.0, 0.0, 0.0])),
        ];
        let results = VectorRetriever::default().search(&docs, &[1.0, 0.0], 10);

        let ids: Vec<&str> = results.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert!(results.iter().all(|r| r.score > 0.0 && r.score <= 1.0));
        assert!(results.iter().all(|r| r.source == ScoreSource::Vector));
    }

    #[test]
    fn test_search_respects_top_k() {
        let docs = vec![doc("a", Some(vec![1.0, 0.0])), doc("b", Some(vec![1.0, 0.2]))];
        assert_eq!(VectorRetriever::default().search(&docs, &[1.0, 0.0], 1).len(), 1);
    }
}
