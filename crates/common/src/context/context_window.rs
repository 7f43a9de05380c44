//! Context Window - policy-driven selection of the final document set
//!
//! Provides:
//! - Ordering policies (relevance, recency, diversity, balanced)
//! - Top-k and character budget enforcement
//! - Plain-text assembly of the selected documents

use crate::db::models::{sort_by_score, DocumentKind, ScoredResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Weight of the relevance rank in the balanced policy
const BALANCED_RELEVANCE_WEIGHT: f32 = 0.7;

/// Separator between documents in an assembled context
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Ordering policy applied before budgeting
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContextWindowStrategy {
    /// Merged score, highest first
    Relevance,
    /// Newest first
    Recency,
    /// Round-robin over document kinds
    Diversity,
    /// Blend of relevance rank and diversity rank
    #[default]
    Balanced,
}

impl ContextWindowStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextWindowStrategy::Relevance => "relevance",
            ContextWindowStrategy::Recency => "recency",
            ContextWindowStrategy::Diversity => "diversity",
            ContextWindowStrategy::Balanced => "balanced",
        }
    }
}

impl fmt::Display for ContextWindowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Documents chosen for the context window
#[derive(Debug, Clone, Default)]
pub struct ContextSelection {
    pub documents: Vec<ScoredResult>,
    /// Length of `assemble_context(&documents)`, in characters: content plus
    /// one separator between neighbours
    pub context_char_length: usize,
}

/// Context window selector
#[derive(Debug, Clone)]
pub struct ContextWindowSelector {
    strategy: ContextWindowStrategy,
    max_chars: usize,
}

impl ContextWindowSelector {
    pub fn new(strategy: ContextWindowStrategy, max_chars: usize) -> Self {
        Self { strategy, max_chars }
    }

    pub fn strategy(&self) -> ContextWindowStrategy {
        self.strategy
    }

    /// Order candidates by the active policy, then take documents while both
    /// `top_k` and the character budget allow. Separators between documents
    /// count against the budget. Selection stops at the first document that
    /// would overflow it.
    pub fn select(&self, candidates: Vec<ScoredResult>, top_k: usize) -> ContextSelection {
        let ordered = self.order(candidates);
        let separator_len = CONTEXT_SEPARATOR.chars().count();

        let mut selection = ContextSelection::default();
        for candidate in ordered {
            if selection.documents.len() >= top_k {
                break;
            }
            let separator = if selection.documents.is_empty() { 0 } else { separator_len };
            let len = separator + candidate.document.char_len();
            if selection.context_char_length + len > self.max_chars {
                tracing::debug!(
                    document_id = %candidate.id(),
                    document_chars = len,
                    used = selection.context_char_length,
                    budget = self.max_chars,
                    "Context budget reached"
                );
                break;
            }
            selection.context_char_length += len;
            selection.documents.push(candidate);
        }

        selection
    }

    fn order(&self, mut candidates: Vec<ScoredResult>) -> Vec<ScoredResult> {
        sort_by_score(&mut candidates);

        match self.strategy {
            ContextWindowStrategy::Relevance => candidates,
            ContextWindowStrategy::Recency => {
                candidates.sort_by(|a, b| {
                    b.document
                        .created_at
                        .cmp(&a.document.created_at)
                        .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
                        .then_with(|| a.id().cmp(b.id()))
                });
                candidates
            }
            ContextWindowStrategy::Diversity => {
                let order = diversity_order(&candidates);
                reorder(candidates, &order)
            }
            ContextWindowStrategy::Balanced => {
                let order = balanced_order(&candidates);
                reorder(candidates, &order)
            }
        }
    }
}

/// Join selected document contents into one context string
pub fn assemble_context(documents: &[ScoredResult]) -> String {
    documents
        .iter()
        .map(|r| r.document.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Indices of `ranked` (already in relevance order) such that each pick is
/// the best remaining document among the least-represented kinds.
fn diversity_order(ranked: &[ScoredResult]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..ranked.len()).collect();
    let mut counts: HashMap<DocumentKind, usize> = HashMap::new();
    let mut order = Vec::with_capacity(ranked.len());

    while !remaining.is_empty() {
        let count_of = |i: usize| counts.get(&ranked[i].document.kind).copied().unwrap_or(0);
        let min = remaining.iter().map(|&i| count_of(i)).min().unwrap_or(0);
        let pos = remaining.iter().position(|&i| count_of(i) == min).unwrap_or(0);

        let picked = remaining.remove(pos);
        *counts.entry(ranked[picked].document.kind).or_insert(0) += 1;
        order.push(picked);
    }

    order
}

/// Indices ordered by `0.7 * relevance_rank + 0.3 * diversity_rank`, where a
/// rank maps position `i` of `n` to `1 - i / (n - 1)`.
fn balanced_order(ranked: &[ScoredResult]) -> Vec<usize> {
    let n = ranked.len();
    let rank = |position: usize| -> f32 {
        if n <= 1 {
            1.0
        } else {
            1.0 - position as f32 / (n - 1) as f32
        }
    };

    let mut diversity_rank = vec![0.0_f32; n];
    for (position, index) in diversity_order(ranked).into_iter().enumerate() {
        diversity_rank[index] = rank(position);
    }

    let mut blended: Vec<(usize, f32)> = (0..n)
        .map(|i| {
            let score = BALANCED_RELEVANCE_WEIGHT * rank(i) + (1.0 - BALANCED_RELEVANCE_WEIGHT) * diversity_rank[i];
            (i, score)
        })
        .collect();

    blended.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    blended.into_iter().map(|(i, _)| i).collect()
}

fn reorder(items: Vec<ScoredResult>, order: &[usize]) -> Vec<ScoredResult> {
    let mut slots: Vec<Option<ScoredResult>> = items.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}
