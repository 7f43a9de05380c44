//! Entity Extractor - tags query spans with semantic types
//!
//! Provides:
//! - Pattern-driven entity recognition over the raw query
//! - Overlap resolution (higher confidence, then longer span wins)
//! - Append-only registration of custom patterns
//! - Idempotent query enhancement with an entity annotation suffix

use crate::errors::{AppError, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Marker that opens the annotation suffix written by `enhance_query`
const ANNOTATION_PREFIX: &str = " [entities: ";
const ANNOTATION_SUFFIX: char = ']';

/// Types of entities we can extract
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Date,
    Technology,
    Capability,
    Tool,
    AgentType,
    /// Registered at runtime
    Custom(String),
}

impl EntityType {
    pub fn label(&self) -> &str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Date => "date",
            EntityType::Technology => "technology",
            EntityType::Capability => "capability",
            EntityType::Tool => "tool",
            EntityType::AgentType => "agent_type",
            EntityType::Custom(name) => name,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Extracted entity from query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Entity text
    pub text: String,

    /// Entity type
    pub entity_type: EntityType,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    /// Byte offset where the span starts
    pub start: usize,

    /// Byte offset one past the end of the span
    pub end: usize,
}

impl Entity {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &Entity) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A registered matcher. When the pattern has a capture group, group 1 is the
/// entity span; otherwise the whole match is.
struct EntityPattern {
    regex: Regex,
    entity_type: EntityType,
    confidence: f32,
}

/// Candidate span before overlap resolution
struct Candidate {
    entity: Entity,
    order: usize,
}

const BUILTIN_PATTERNS: &[(&str, EntityType, f32)] = &[
    // Dates
    (r"\b\d{4}-\d{2}-\d{2}\b", EntityType::Date, 0.95),
    (
        r"(?i)\b(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?\b",
        EntityType::Date,
        0.9,
    ),
    (
        r"(?i)\b(?:yesterday|today|tomorrow|(?:last|next|this)\s+(?:week|month|quarter|year))\b",
        EntityType::Date,
        0.8,
    ),
    (r"\b(?:19|20)\d{2}\b", EntityType::Date, 0.6),
    // People
    (
        r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?",
        EntityType::Person,
        0.9,
    ),
    (r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\b", EntityType::Person, 0.5),
    // Organizations
    (
        r"\b[A-Z][A-Za-z0-9&]*(?:\s+[A-Z][A-Za-z0-9&]*)*\s+(?:Inc|Corp|Corporation|LLC|Ltd|Foundation|University|Institute|Labs)\b\.?",
        EntityType::Organization,
        0.9,
    ),
    (
        r"(?i)\b(?:google|microsoft|openai|anthropic|amazon|aws|meta|apple|github|mozilla|ibm|nvidia)\b",
        EntityType::Organization,
        0.8,
    ),
    // Locations
    (
        r"(?i)\b(?:london|paris|berlin|tokyo|new york|san francisco|seattle|singapore|sydney|toronto|amsterdam|bangalore)\b",
        EntityType::Location,
        0.85,
    ),
    (
        r"\b(?:in|at|near|from)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)",
        EntityType::Location,
        0.55,
    ),
    // Technology
    (
        r"(?i)\b(?:rust|python|typescript|javascript|golang|java|kotlin|kubernetes|docker|postgres(?:ql)?|mysql|redis|kafka|react|graphql|grpc|tokio|wasm|webassembly|firestore|elasticsearch|linux)\b",
        EntityType::Technology,
        0.8,
    ),
    // Tools
    (
        r"(?i)\b(?:git|cargo|npm|pip|jira|slack|grep|curl|vscode|terraform|jenkins)\b",
        EntityType::Tool,
        0.75,
    ),
    // Capabilities
    (
        r"(?i)\b(?:search|retrieval|summari[sz](?:e|ation)|translation|classification|code generation|reasoning|planning|embeddings?|transcription)\b",
        EntityType::Capability,
        0.6,
    ),
    // Agent types
    (
        r"(?i)\b(?:assistant|agent|planner|researcher|coder|reviewer|orchestrator|router)s?\b",
        EntityType::AgentType,
        0.7,
    ),
];

/// Pattern-driven entity extractor
pub struct EntityExtractor {
    patterns: Vec<EntityPattern>,
    builtin_count: usize,
}

impl EntityExtractor {
    /// Create an extractor with the built-in patterns
    pub fn new() -> Result<Self> {
        let mut patterns = Vec::with_capacity(BUILTIN_PATTERNS.len());
        for (pattern, entity_type, confidence) in BUILTIN_PATTERNS {
            patterns.push(EntityPattern {
                regex: compile(pattern)?,
                entity_type: entity_type.clone(),
                confidence: *confidence,
            });
        }

        Ok(Self {
            builtin_count: patterns.len(),
            patterns,
        })
    }

    /// Register a custom pattern. Evaluated after every earlier pattern.
    pub fn register(&mut self, pattern: &str, entity_type: EntityType, confidence: f32) -> Result<()> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(AppError::validation("confidence", format!("{} is outside [0, 1]", confidence)));
        }
        let regex = compile(pattern)?;

        tracing::debug!(pattern, entity_type = %entity_type, confidence, "Registered entity pattern");
        self.patterns.push(EntityPattern { regex, entity_type, confidence });
        Ok(())
    }

    pub fn custom_pattern_count(&self) -> usize {
        self.patterns.len() - self.builtin_count
    }

    /// Extract non-overlapping entities, ordered by span start.
    ///
    /// An annotation suffix previously written by `enhance_query` is ignored.
    pub fn extract(&self, query: &str) -> Vec<Entity> {
        let text = strip_annotations(query);

        let mut candidates = Vec::new();
        for (order, pattern) in self.patterns.iter().enumerate() {
            for caps in pattern.regex.captures_iter(text) {
                let Some(span) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                if span.start() == span.end() {
                    continue;
                }
                candidates.push(Candidate {
                    entity: Entity {
                        text: span.as_str().to_string(),
                        entity_type: pattern.entity_type.clone(),
                        confidence: pattern.confidence,
                        start: span.start(),
                        end: span.end(),
                    },
                    order,
                });
            }
        }

        resolve_overlaps(candidates)
    }

    /// Append recognized entities as a structured suffix.
    ///
    /// `enhance_query(enhance_query(q)) == enhance_query(q)`.
    pub fn enhance_query(&self, query: &str) -> String {
        let base = strip_annotations(query);
        let entities = self.extract(base);
        if entities.is_empty() {
            return base.to_string();
        }

        let mut seen = HashSet::new();
        let annotations: Vec<String> = entities
            .iter()
            .filter(|e| seen.insert((e.entity_type.clone(), e.text.to_lowercase())))
            .map(|e| format!("{}={}", e.entity_type, e.text))
            .collect();

        format!("{}{}{}{}", base, ANNOTATION_PREFIX, annotations.join("; "), ANNOTATION_SUFFIX)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AppError::validation("pattern", format!("invalid pattern '{}': {}", pattern, e)))
}

/// Remove an annotation suffix written by `enhance_query`, if present
fn strip_annotations(query: &str) -> &str {
    if query.ends_with(ANNOTATION_SUFFIX) {
        if let Some(pos) = query.rfind(ANNOTATION_PREFIX) {
            return &query[..pos];
        }
    }
    query
}

/// Greedy acceptance by (confidence desc, length desc); earlier start and
/// earlier registration break the remaining ties.
fn resolve_overlaps(mut candidates: Vec<Candidate>) -> Vec<Entity> {
    candidates.sort_by(|a, b| {
        b.entity
            .confidence
            .partial_cmp(&a.entity.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.entity.len().cmp(&a.entity.len()))
            .then_with(|| a.entity.start.cmp(&b.entity.start))
            .then_with(|| a.order.cmp(&b.order))
    });

    let mut accepted: Vec<Entity> = Vec::new();
    for candidate in candidates {
        if accepted.iter().all(|e| !e.overlaps(&candidate.entity)) {
            accepted.push(candidate.entity);
        }
    }

    accepted.sort_by_key(|e| e.start);
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new().unwrap()
    }

    fn find<'a>(entities: &'a [Entity], entity_type: &EntityType) -> Vec<&'a str> {
        entities
            .iter()
            .filter(|e| &e.entity_type == entity_type)
            .map(|e| e.text.as_str())
            .collect()
    }

    #[test]
    fn test_extracts_mixed_entities() {
        let query = "Dr. Alice Smith from Google deployed Rust services on 2024-05-01";
        let entities = extractor().extract(query);

        assert_eq!(find(&entities, &EntityType::Person), vec!["Dr. Alice Smith"]);
        assert_eq!(find(&entities, &EntityType::Organization), vec!["Google"]);
        assert_eq!(find(&entities, &EntityType::Technology), vec!["Rust"]);
        assert_eq!(find(&entities, &EntityType::Date), vec!["2024-05-01"]);

        for e in &entities {
            assert_eq!(&query[e.start..e.end], e.text);
        }
    }

    #[test]
    fn test_entities_never_overlap() {
        let queries = [
            "Dr. Alice Smith from Google deployed Rust services on 2024-05-01",
            "Ask the planner agent in Berlin about docker search in May 3, 2023",
            "Acme Robotics Inc shipped kubernetes retrieval tooling with git in 2021",
            "New York Times research assistant uses python and curl",
        ];
        let extractor = extractor();
        for query in queries {
            let entities = extractor.extract(query);
            for (i, a) in entities.iter().enumerate() {
                for b in entities.iter().skip(i + 1) {
                    assert!(!a.overlaps(b), "{:?} overlaps {:?} in {:?}", a, b, query);
                }
            }
        }
    }

    #[test]
    fn test_higher_confidence_wins_overlap() {
        // The full ISO date (0.95) beats the bare year (0.6) inside it
        let entities = extractor().extract("released 2024-05-01");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "2024-05-01");
    }

    #[test]
    fn test_longer_span_wins_on_equal_confidence() {
        let mut extractor = extractor();
        extractor.register(r"\bdeep\b", EntityType::Custom("concept".into()), 0.7).unwrap();
        extractor.register(r"\bdeep learning\b", EntityType::Custom("concept".into()), 0.7).unwrap();

        let entities = extractor.extract("intro to deep learning");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "deep learning");
        assert_eq!(extractor.custom_pattern_count(), 2);
    }

    #[test]
    fn test_location_uses_capture_group() {
        let entities = extractor().extract("meetups near Lisbon");
        assert_eq!(find(&entities, &EntityType::Location), vec!["Lisbon"]);
    }

    #[test]
    fn test_register_rejects_bad_input() {
        let mut extractor = extractor();
        assert!(extractor.register("(unclosed", EntityType::Tool, 0.5).is_err());
        assert!(extractor.register("ok", EntityType::Tool, 1.5).is_err());
        assert_eq!(extractor.custom_pattern_count(), 0);
    }

    #[test]
    fn test_enhance_query_appends_annotations() {
        let enhanced = extractor().enhance_query("rust retrieval agent");
        assert_eq!(
            enhanced,
            "rust retrieval agent [entities: technology=rust; capability=retrieval; agent_type=agent]"
        );
    }

    #[test]
    fn test_enhance_query_is_idempotent() {
        let extractor = extractor();
        let once = extractor.enhance_query("Deploy Rust on Kubernetes in Tokyo next week");
        let twice = extractor.enhance_query(&once);
        assert_eq!(once, twice);
        assert_eq!(once.matches("[entities:").count(), 1);
    }

    #[test]
    fn test_extract_ignores_existing_annotations() {
        let extractor = extractor();
        let query = "rust and redis";
        let enhanced = extractor.enhance_query(query);
        assert_eq!(extractor.extract(&enhanced), extractor.extract(query));
    }

    #[test]
    fn test_enhance_dedupes_repeated_values() {
        let enhanced = extractor().enhance_query("rust vs Rust");
        assert_eq!(enhanced, "rust vs Rust [entities: technology=rust]");
    }

    #[test]
    fn test_no_entities_leaves_query_unchanged() {
        assert_eq!(extractor().enhance_query("cats"), "cats");
    }
}
