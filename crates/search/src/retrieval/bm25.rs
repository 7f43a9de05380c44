//! BM25 lexical search over an in-memory inverted index
//!
//! Provides keyword-based ranking:
//! - term -> postings of (document, term frequency)
//! - Okapi BM25 with the `ln(1 + ...)` IDF variant
//! - Runtime-tunable `k1` and `b`

use recallforge_common::config::Bm25Config;
use recallforge_common::db::models::{sort_by_score, Document, ScoreSource, ScoredResult};
use recallforge_common::text::tokenize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: usize,
    tf: u32,
}

/// In-memory BM25 index
#[derive(Debug, Clone)]
pub struct Bm25Index {
    k1: f32,
    b: f32,
    documents: Vec<Arc<Document>>,
    postings: HashMap<String, Vec<Posting>>,
    doc_lengths: Vec<usize>,
    avg_doc_length: f32,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new(&Bm25Config::default())
    }
}

impl Bm25Index {
    /// Create an empty index
    pub fn new(params: &Bm25Config) -> Self {
        Self {
            k1: params.k1,
            b: params.b,
            documents: Vec::new(),
            postings: HashMap::new(),
            doc_lengths: Vec::new(),
            avg_doc_length: 0.0,
        }
    }

    /// Replace the index contents
    pub fn index(&mut self, documents: Vec<Arc<Document>>) {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(documents.len());

        for (doc, document) in documents.iter().enumerate() {
            let tokens = tokenize(&document.content);
            doc_lengths.push(tokens.len());

            let mut frequencies: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *frequencies.entry(token).or_insert(0) += 1;
            }
            for (term, tf) in frequencies {
                postings.entry(term).or_default().push(Posting { doc, tf });
            }
        }

        let total: usize = doc_lengths.iter().sum();
        self.avg_doc_length = if documents.is_empty() {
            0.0
        } else {
            total as f32 / documents.len() as f32
        };
        self.postings = postings;
        self.doc_lengths = doc_lengths;
        self.documents = documents;

        tracing::debug!(
            documents = self.documents.len(),
            terms = self.postings.len(),
            avg_doc_length = self.avg_doc_length,
            "BM25 index rebuilt"
        );
    }

    pub fn params(&self) -> (f32, f32) {
        (self.k1, self.b)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Arc<Document>] {
        &self.documents
    }

    /// Raw BM25 scores, highest first. Documents sharing no term with the
    /// query are excluded.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<ScoredResult> {
        if self.documents.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let n = self.documents.len() as f32;
        let mut seen = HashSet::new();
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for term in tokenize(query) {
            if !seen.insert(term.clone()) {
                continue;
            }
            let Some(postings) = self.postings.get(&term) else {
                continue;
            };

            let df = postings.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for posting in postings {
                let tf = posting.tf as f32;
                let length_ratio = self.doc_lengths[posting.doc] as f32 / self.avg_doc_length;
                let denominator = tf + self.k1 * (1.0 - self.b + self.b * length_ratio);
                *scores.entry(posting.doc).or_insert(0.0) += idf * tf * (self.k1 + 1.0) / denominator;
            }
        }

        let mut results: Vec<ScoredResult> = scores
            .into_iter()
            .map(|(doc, score)| ScoredResult::new(self.documents[doc].clone(), score, ScoreSource::Lexical))
            .collect();

        sort_by_score(&mut results);
        results.truncate(top_k);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recallforge_common::db::models::DocumentKind;

    fn index_of(contents: &[(&str, &str)]) -> Bm25Index {
        let mut index = Bm25Index::default();
        index.index(
            contents
                .iter()
                .map(|(id, content)| Arc::new(Document::with_id(*id, *content, DocumentKind::Knowledge)))
                .collect(),
        );
        index
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn test_cats_and_dogs() {
        let index = index_of(&[
            ("1", "cats are great"),
            ("2", "dogs are loyal"),
            ("3", "cats and dogs coexist"),
        ]);
        let results = index.search("cats", 10);

        assert_eq!(results.len(), 2);
        assert!(!ids(&results).contains(&"2"));
        assert!(results.iter().all(|r| r.score > 0.0));
        assert!(results.iter().all(|r| r.source == ScoreSource::Lexical));
        // Shorter document ranks first at equal tf
        assert_eq!(ids(&results), vec!["1", "3"]);
    }

    #[test]
    fn test_monotonic_in_term_frequency() {
        let index = index_of(&[
            ("low", "rust tokio axum serde"),
            ("high", "rust rust axum serde"),
            ("other", "python django flask"),
        ]);
        let results = index.search("rust", 10);
        assert_eq!(ids(&results), vec!["high", "low"]);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_duplicate_query_terms_count_once() {
        let index = index_of(&[("a", "cats are great"), ("b", "dogs")]);
        let once = index.search("cats", 10);
        let twice = index.search("cats cats CATS", 10);
        assert_eq!(once.len(), 1);
        assert!((once[0].score - twice[0].score).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_id() {
        let index = index_of(&[("b", "same text"), ("a", "same text"), ("c", "other words")]);
        let results = index.search("same", 10);
        assert_eq!(ids(&results), vec!["a", "b"]);
    }

    #[test]
    fn test_top_k_and_empty_cases() {
        let index = index_of(&[("1", "cats"), ("2", "cats cats"), ("3", "cats cats cats")]);
        assert_eq!(index.search("cats", 2).len(), 2);
        assert!(index.search("", 10).is_empty());
        assert!(index.search("zebra", 10).is_empty());
        assert!(Bm25Index::default().search("cats", 10).is_empty());
    }

    #[test]
    fn test_params_change_length_normalization() {
        let mut index = Bm25Index::new(&Bm25Config { k1: 1.2, b: 0.0 });
        index.index(vec![
            Arc::new(Document::with_id("short", "cats", DocumentKind::Knowledge)),
            Arc::new(Document::with_id("long", "cats cats and many many other words here", DocumentKind::Knowledge)),
        ]);
        assert_eq!(index.params(), (1.2, 0.0));
        // Without length normalization, higher tf wins
        assert_eq!(index.search("cats", 10)[0].id(), "long");
    }

    #[test]
    fn test_reindex_replaces_contents() {
        let mut index = index_of(&[("1", "cats")]);
        index.index(vec![Arc::new(Document::with_id("2", "dogs", DocumentKind::Code))]);
        assert_eq!(index.len(), 1);
        assert!(index.search("cats", 10).is_empty());
        assert_eq!(index.search("dogs", 10)[0].id(), "2");
    }
}
