//! Score fusion for combining vector and lexical results
//!
//! Each input list is min-max normalized on its own, then combined with an
//! alpha weight on the vector signal:
//! - in both lists: `alpha * v + (1 - alpha) * l`
//! - vector only: `alpha * v`
//! - lexical only: `(1 - alpha) * l`

use recallforge_common::db::models::{sort_by_score, Document, ScoreSource, ScoredResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Alpha-weighted score fusion
#[derive(Debug, Clone)]
pub struct ScoreFusion {
    /// Weight of the vector signal, in [0, 1]
    pub alpha: f32,
}

impl Default for ScoreFusion {
    fn default() -> Self {
        Self { alpha: 0.6 }
    }
}

#[derive(Default)]
struct FusionEntry {
    document: Option<Arc<Document>>,
    vector: Option<f32>,
    lexical: Option<f32>,
}

impl ScoreFusion {
    pub fn new(alpha: f32) -> Self {
        Self { alpha: alpha.clamp(0.0, 1.0) }
    }

    /// Fuse two ranked lists into one list with scores in [0, 1]
    pub fn fuse(&self, vector_results: Vec<ScoredResult>, lexical_results: Vec<ScoredResult>) -> Vec<ScoredResult> {
        let mut entries: HashMap<String, FusionEntry> = HashMap::new();

        let vector_scores = min_max_normalize(&vector_results);
        for (result, score) in vector_results.into_iter().zip(vector_scores) {
            let entry = entries.entry(result.id().to_string()).or_default();
            entry.vector = Some(entry.vector.map_or(score, |s| s.max(score)));
            entry.document.get_or_insert(result.document);
        }

        let lexical_scores = min_max_normalize(&lexical_results);
        for (result, score) in lexical_results.into_iter().zip(lexical_scores) {
            let entry = entries.entry(result.id().to_string()).or_default();
            entry.lexical = Some(entry.lexical.map_or(score, |s| s.max(score)));
            entry.document.get_or_insert(result.document);
        }

        let mut results: Vec<ScoredResult> = entries
            .into_values()
            .filter_map(|entry| {
                let document = entry.document?;
                let score = self.alpha * entry.vector.unwrap_or(0.0)
                    + (1.0 - self.alpha) * entry.lexical.unwrap_or(0.0);
                Some(ScoredResult::new(document, score.clamp(0.0, 1.0), ScoreSource::Fused))
            })
            .collect();

        sort_by_score(&mut results);
        results
    }
}

/// Min-max normalize scores in input order. A list whose scores are all
/// equal maps every entry to 1.0.
pub fn min_max_normalize(results: &[ScoredResult]) -> Vec<f32> {
    let min = results.iter().map(|r| r.score).fold(f32::INFINITY, f32::min);
    let max = results.iter().map(|r| r.score).fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    results
        .iter()
        .map(|r| if range > 0.0 { (r.score - min) / range } else { 1.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use recallforge_common::db::models::DocumentKind;

    fn make_result(id: &str, score: f32, source: ScoreSource) -> ScoredResult {
        ScoredResult::new(Arc::new(Document::with_id(id, id, DocumentKind::Knowledge)), score, source)
    }

    fn vector() -> Vec<ScoredResult> {
        vec![
            make_result("a", 0.9, ScoreSource::Vector),
            make_result("b", 0.5, ScoreSource::Vector),
            make_result("c", 0.2, ScoreSource::Vector),
        ]
    }

    fn lexical() -> Vec<ScoredResult> {
        vec![
            make_result("c", 7.5, ScoreSource::Lexical),
            make_result("b", 3.0, ScoreSource::Lexical),
            make_result("a", 1.0, ScoreSource::Lexical),
        ]
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn test_alpha_one_follows_vector_order() {
        let fused = ScoreFusion::new(1.0).fuse(vector(), lexical());
        assert_eq!(ids(&fused), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_alpha_zero_follows_lexical_order() {
        let fused = ScoreFusion::new(0.0).fuse(vector(), lexical());
        assert_eq!(ids(&fused), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_scores_in_unit_range() {
        for alpha in [0.0, 0.25, 0.5, 0.6, 1.0] {
            let mut lex = lexical();
            lex.push(make_result("d", 12.0, ScoreSource::Lexical));
            let fused = ScoreFusion::new(alpha).fuse(vector(), lex);
            assert_eq!(fused.len(), 4);
            assert!(fused.iter().all(|r| (0.0..=1.0).contains(&r.score)));
            assert!(fused.iter().all(|r| r.source == ScoreSource::Fused));
        }
    }

    #[test]
    fn test_document_in_both_lists_outranks_single_list() {
        // Vector: [A, B]; Lexical: [B, D]. B tops both normalized lists.
        let vector = vec![make_result("a", 0.9, ScoreSource::Vector), make_result("b", 0.9, ScoreSource::Vector)];
        let lexical = vec![make_result("b", 4.0, ScoreSource::Lexical), make_result("d", 2.0, ScoreSource::Lexical)];

        let fused = ScoreFusion::new(0.5).fuse(vector, lexical);
        assert_eq!(fused[0].id(), "b");
        assert!((fused[0].score - 1.0).abs() < 1e-6);
        // Single distinct vector score maps to 1.0
        let a = fused.iter().find(|r| r.id() == "a").unwrap();
        assert!((a.score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_inputs() {
        let fusion = ScoreFusion::default();
        assert!(fusion.fuse(Vec::new(), Vec::new()).is_empty());

        let fused = fusion.fuse(Vec::new(), lexical());
        assert_eq!(ids(&fused), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_min_max_normalize() {
        let results = vec![make_result("a", 2.0, ScoreSource::Lexical), make_result("b", 4.0, ScoreSource::Lexical)];
        assert_eq!(min_max_normalize(&results), vec![0.0, 1.0]);
        assert!(min_max_normalize(&[]).is_empty());
        assert_eq!(min_max_normalize(&results[..1]), vec![1.0]);
    }
}
