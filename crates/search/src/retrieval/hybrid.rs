//! Hybrid retrieval combining vector and BM25 search
//!
//! Uses alpha-weighted score fusion to combine both signals. Falls back to
//! lexical-only ranking when hybrid mode is off or no query embedding exists.

use super::{fusion::ScoreFusion, vector::VectorRetriever, CorpusSnapshot, RetrievalMode};
use recallforge_common::db::models::{normalize_by_max, ScoredResult};

/// Candidate multiplier for each signal before fusion
const FUSION_EXPANSION: usize = 2;

/// Hybrid retriever over a corpus snapshot
#[derive(Debug, Clone)]
pub struct HybridRetriever {
    vector: VectorRetriever,
    fusion: ScoreFusion,
    use_hybrid: bool,
}

impl HybridRetriever {
    /// Create a new hybrid retriever
    pub fn new(vector_weight: f32, use_hybrid: bool) -> Self {
        Self {
            vector: VectorRetriever::default(),
            fusion: ScoreFusion::new(vector_weight),
            use_hybrid,
        }
    }

    /// Mode a query will run in, given whether it has an embedding
    pub fn mode(&self, has_embedding: bool) -> RetrievalMode {
        if self.use_hybrid && has_embedding {
            RetrievalMode::Hybrid
        } else {
            RetrievalMode::Lexical
        }
    }

    pub fn wants_embedding(&self) -> bool {
        self.use_hybrid
    }

    /// Ranked results with scores in [0, 1]
    pub fn retrieve(
        &self,
        snapshot: &CorpusSnapshot,
        query: &str,
        query_embedding: Option<&[f32]>,
        top_k: usize,
    ) -> Vec<ScoredResult> {
        match (self.mode(query_embedding.is_some()), query_embedding) {
            (RetrievalMode::Hybrid, Some(embedding)) => {
                // Fetch more results from each signal for better fusion
                let expanded = top_k.saturating_mul(FUSION_EXPANSION);
                let lexical = snapshot.lexical().search(query, expanded);
                let vector = self.vector.search(snapshot.documents(), embedding, expanded);

                tracing::debug!(
                    lexical = lexical.len(),
                    vector = vector.len(),
                    alpha = self.fusion.alpha,
                    "Fusing local signals"
                );

                let mut fused = self.fusion.fuse(vector, lexical);
                fused.truncate(top_k);
                fused
            }
            _ => {
                let mut lexical = snapshot.lexical().search(query, top_k);
                normalize_by_max(&mut lexical);
                lexical
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recallforge_common::config::Bm25Config;
    use recallforge_common::db::models::{Document, DocumentKind, ScoreSource};

    fn snapshot() -> CorpusSnapshot {
        CorpusSnapshot::build(
            vec![
                Document::with_id("1", "cats are great", DocumentKind::Knowledge).with_embedding(vec![1.0, 0.0]),
                Document::with_id("2", "dogs are loyal", DocumentKind::Knowledge).with_embedding(vec![0.0, 1.0]),
                Document::with_id("3", "cats and dogs coexist", DocumentKind::Knowledge)
                    .with_embedding(vec![0.7, 0.7]),
            ],
            &Bm25Config::default(),
        )
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn test_lexical_only_mode() {
        let retriever = HybridRetriever::new(0.6, false);
        let results = retriever.retrieve(&snapshot(), "cats", Some(&[0.0, 1.0]), 10);

        assert_eq!(ids(&results), vec!["1", "3"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results.iter().all(|r| r.source == ScoreSource::Lexical));
        assert_eq!(retriever.mode(true), RetrievalMode::Lexical);
    }

    #[test]
    fn test_hybrid_without_embedding_falls_back() {
        let retriever = HybridRetriever::new(0.6, true);
        assert_eq!(retriever.mode(false), RetrievalMode::Lexical);
        let results = retriever.retrieve(&snapshot(), "cats", None, 10);
        assert_eq!(ids(&results), vec!["1", "3"]);
    }

    #[test]
    fn test_hybrid_fuses_both_signals() {
        let retriever = HybridRetriever::new(0.6, true);
        let results = retriever.retrieve(&snapshot(), "cats", Some(&[1.0, 0.0]), 10);

        assert_eq!(results[0].id(), "1");
        assert!(results.iter().all(|r| r.source == ScoreSource::Fused));
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn test_vector_signal_can_surface_lexical_miss() {
        let retriever = HybridRetriever::new(0.9, true);
        let results = retriever.retrieve(&snapshot(), "puppies", Some(&[0.0, 1.0]), 10);
        assert_eq!(results[0].id(), "2");
    }
}
