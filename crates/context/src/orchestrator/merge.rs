//! Stream merge
//!
//! Unions per-stream results by document id. Each contribution is the stream
//! score times the stream weight; contributions for the same document are
//! summed. When the largest merged score exceeds 1.0 every score is divided
//! by it, so a single stream at weight 1.0 passes through unchanged.

use recallforge_common::db::models::{sort_by_score, Document, ScoreSource, ScoredResult};
use recallforge_search::StreamResult;
use std::collections::BTreeMap;
use std::sync::Arc;

struct MergeEntry {
    document: Arc<Document>,
    score: f32,
    source: ScoreSource,
    streams: Vec<String>,
}

/// Merge successful stream results. Failed streams contribute nothing.
pub fn merge_streams(inputs: &[(&StreamResult, f32)]) -> Vec<ScoredResult> {
    let mut entries: BTreeMap<String, MergeEntry> = BTreeMap::new();

    for (stream, weight) in inputs {
        if !stream.is_ok() {
            continue;
        }
        for result in &stream.results {
            let contribution = result.score * weight;
            match entries.get_mut(result.id()) {
                Some(entry) => {
                    entry.score += contribution;
                    if entry.source != result.source {
                        entry.source = ScoreSource::Fused;
                    }
                    if !entry.streams.contains(&stream.source_name) {
                        entry.streams.push(stream.source_name.clone());
                    }
                }
                None => {
                    entries.insert(
                        result.id().to_string(),
                        MergeEntry {
                            document: result.document.clone(),
                            score: contribution,
                            source: result.source,
                            streams: vec![stream.source_name.clone()],
                        },
                    );
                }
            }
        }
    }

    let max = entries.values().map(|e| e.score).fold(0.0_f32, f32::max);
    let scale = if max > 1.0 { max } else { 1.0 };

    let mut merged: Vec<ScoredResult> = entries
        .into_values()
        .map(|entry| {
            let mut result = ScoredResult::new(entry.document, (entry.score / scale).clamp(0.0, 1.0), entry.source);
            result.streams = entry.streams;
            result
        })
        .collect();

    sort_by_score(&mut merged);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use recallforge_common::config::StreamKind;
    use recallforge_common::db::models::DocumentKind;

    fn result(id: &str, score: f32, source: ScoreSource) -> ScoredResult {
        ScoredResult::new(Arc::new(Document::with_id(id, id, DocumentKind::Knowledge)), score, source)
    }

    fn stream(name: &str, results: Vec<ScoredResult>) -> StreamResult {
        StreamResult::completed(name, StreamKind::Local, results, 1)
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn test_single_stream_round_trip() {
        let original = vec![
            result("a", 1.0, ScoreSource::Lexical),
            result("c", 0.6, ScoreSource::Lexical),
            result("b", 0.6, ScoreSource::Lexical),
            result("d", 0.1, ScoreSource::Lexical),
        ];
        let mut expected = original.clone();
        sort_by_score(&mut expected);

        let local = stream("local", original);
        let merged = merge_streams(&[(&local, 1.0)]);

        assert_eq!(ids(&merged), ids(&expected));
        for (m, e) in merged.iter().zip(&expected) {
            assert!((m.score - e.score).abs() < 1e-6);
            assert_eq!(m.source, e.source);
            assert_eq!(m.streams, vec!["local".to_string()]);
        }
    }

    #[test]
    fn test_sums_weighted_scores_and_renormalizes() {
        let local = stream("local", vec![result("a", 1.0, ScoreSource::Lexical), result("b", 0.5, ScoreSource::Lexical)]);
        let remote = stream("managed_index", vec![result("a", 1.0, ScoreSource::Remote), result("c", 1.0, ScoreSource::Remote)]);

        let merged = merge_streams(&[(&local, 1.0), (&remote, 0.8)]);

        assert_eq!(ids(&merged), vec!["a", "c", "b"]);
        // a = 1.8 before scaling
        assert!((merged[0].score - 1.0).abs() < 1e-6);
        assert!((merged[1].score - 0.8 / 1.8).abs() < 1e-6);
        assert!((merged[2].score - 0.5 / 1.8).abs() < 1e-6);
        assert_eq!(merged[0].source, ScoreSource::Fused);
        assert_eq!(merged[0].streams, vec!["local".to_string(), "managed_index".to_string()]);
        assert!(merged.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn test_failed_streams_contribute_nothing() {
        let ok = stream("local", vec![result("a", 0.9, ScoreSource::Lexical)]);
        let mut failed = stream("document_ai", vec![result("z", 1.0, ScoreSource::Remote)]);
        failed.error = Some("boom".to_string());

        let merged = merge_streams(&[(&ok, 1.0), (&failed, 1.0)]);
        assert_eq!(ids(&merged), vec!["a"]);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let s1 = stream("local", vec![result("a", 0.9, ScoreSource::Lexical), result("b", 0.4, ScoreSource::Lexical)]);
        let s2 = stream("document_ai", vec![result("b", 0.7, ScoreSource::Remote), result("c", 0.3, ScoreSource::Remote)]);

        let forward = merge_streams(&[(&s1, 0.7), (&s2, 0.5)]);
        let backward = merge_streams(&[(&s2, 0.5), (&s1, 0.7)]);

        assert_eq!(ids(&forward), ids(&backward));
        for (f, b) in forward.iter().zip(&backward) {
            assert!((f.score - b.score).abs() < 1e-6);
        }
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge_streams(&[]).is_empty());
    }
}
