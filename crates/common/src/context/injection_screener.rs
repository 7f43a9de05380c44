//! Injection Screener - rule-based prompt-injection detection
//!
//! Every query is evaluated against an ordered rule list. A rule whose
//! severity reaches the critical threshold ends evaluation immediately.
//! Otherwise the verdict is unsafe when any single finding exceeds the
//! unsafe threshold or the summed severity exceeds the aggregate threshold.
//!
//! Matched spans are replaced with a placeholder in `sanitized_query`, which
//! is what downstream recall streams see. A short-circuited verdict reports
//! only the critical finding, but its sanitized query still masks the spans
//! of every rule that matches.

use crate::config::SecurityConfig;
use crate::errors::{AppError, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Threat category of a screening rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    InstructionOverride,
    RoleManipulation,
    SystemPromptExtraction,
    DataExfiltration,
    CodeInjection,
    SqlInjection,
    DelimiterInjection,
    Custom,
}

impl ThreatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::InstructionOverride => "instruction_override",
            ThreatCategory::RoleManipulation => "role_manipulation",
            ThreatCategory::SystemPromptExtraction => "system_prompt_extraction",
            ThreatCategory::DataExfiltration => "data_exfiltration",
            ThreatCategory::CodeInjection => "code_injection",
            ThreatCategory::SqlInjection => "sql_injection",
            ThreatCategory::DelimiterInjection => "delimiter_injection",
            ThreatCategory::Custom => "custom",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One matched rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreatFinding {
    pub pattern_id: String,
    pub description: String,
    pub category: ThreatCategory,
    pub severity: f32,
    /// Byte range of the first match in the screened query
    pub matched_span: (usize, usize),
    pub matched_text: String,
}

/// Outcome of screening one query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityVerdict {
    pub is_safe: bool,
    pub findings: Vec<ThreatFinding>,
    pub sanitized_query: String,
    /// Rules evaluated before a verdict was reached
    pub rules_evaluated: usize,
    /// True when a critical finding ended evaluation early
    pub short_circuited: bool,
}

impl SecurityVerdict {
    /// Verdict for a query that was never screened
    pub fn unscreened(query: &str) -> Self {
        Self {
            is_safe: true,
            findings: Vec::new(),
            sanitized_query: query.to_string(),
            rules_evaluated: 0,
            short_circuited: false,
        }
    }

    pub fn aggregate_severity(&self) -> f32 {
        self.findings.iter().map(|f| f.severity).sum()
    }

    pub fn categories(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.findings.iter().map(|f| f.category.as_str())
    }
}

/// A compiled screening rule
pub struct ScreeningRule {
    pub id: String,
    pub category: ThreatCategory,
    pub description: String,
    pub severity: f32,
    regex: Regex,
}

impl ScreeningRule {
    pub fn new(
        id: impl Into<String>,
        category: ThreatCategory,
        pattern: &str,
        description: impl Into<String>,
        severity: f32,
    ) -> Result<Self> {
        if !severity.is_finite() || !(0.0..=1.0).contains(&severity) {
            return Err(AppError::validation("severity", format!("{} is outside [0, 1]", severity)));
        }
        let regex = Regex::new(pattern)
            .map_err(|e| AppError::validation("pattern", format!("invalid pattern '{}': {}", pattern, e)))?;

        Ok(Self {
            id: id.into(),
            category,
            description: description.into(),
            severity,
            regex,
        })
    }

    /// Byte spans of every non-empty match in `query`
    fn match_spans(&self, query: &str) -> Vec<(usize, usize)> {
        self.regex
            .find_iter(query)
            .filter(|m| m.start() < m.end())
            .map(|m| (m.start(), m.end()))
            .collect()
    }
}

const BUILTIN_RULES: &[(&str, ThreatCategory, &str, &str, f32)] = &[
    (
        "IO-001",
        ThreatCategory::InstructionOverride,
        r"(?i)\b(?:ignore|disregard|override|bypass)\s+(?:all\s+|any\s+|the\s+)?(?:previous|prior|above|earlier|preceding)\s+(?:instructions?|prompts?|rules|directions|context)",
        "Attempt to discard prior instructions",
        0.95,
    ),
    (
        "IO-002",
        ThreatCategory::InstructionOverride,
        r"(?i)\bforget\s+(?:everything|all\s+(?:previous|prior)|your\s+(?:instructions|rules))",
        "Attempt to reset instructions",
        0.85,
    ),
    (
        "IO-003",
        ThreatCategory::InstructionOverride,
        r"(?i)\b(?:new|updated)\s+instructions?\s*:",
        "Inline replacement instructions",
        0.7,
    ),
    (
        "RM-001",
        ThreatCategory::RoleManipulation,
        r"(?i)\byou\s+are\s+now\s+(?:a|an|the|in)\b",
        "Reassignment of the assistant role",
        0.8,
    ),
    (
        "RM-002",
        ThreatCategory::RoleManipulation,
        r"(?i)\b(?:pretend|imagine)\s+(?:to\s+be|you\s+are|that\s+you\s+are)\b",
        "Role-play framing",
        0.6,
    ),
    (
        "RM-003",
        ThreatCategory::RoleManipulation,
        r"(?i)\b(?:developer|god|dan|jailbreak|unrestricted)\s+mode\b",
        "Known jailbreak mode",
        0.9,
    ),
    (
        "RM-004",
        ThreatCategory::RoleManipulation,
        r"(?i)\bact\s+as\s+(?:if\s+you\s+(?:are|were)\s+)?(?:an?\s+)?(?:unfiltered|unrestricted|evil|different)\b",
        "Request to drop behavioural constraints",
        0.75,
    ),
    (
        "PE-001",
        ThreatCategory::SystemPromptExtraction,
        r"(?i)\b(?:reveal|show|print|display|repeat|output|leak)\s+(?:me\s+)?(?:your|the)\s+(?:system\s+|initial\s+|hidden\s+)?(?:prompt|instructions)",
        "Request to disclose the system prompt",
        0.9,
    ),
    (
        "PE-002",
        ThreatCategory::SystemPromptExtraction,
        r"(?i)\bwhat\s+(?:is|are|were)\s+your\s+(?:system\s+|initial\s+|original\s+)?(?:prompt|instructions)",
        "Question about the system prompt",
        0.75,
    ),
    (
        "DE-001",
        ThreatCategory::DataExfiltration,
        r"(?i)\b(?:send|post|upload|forward|exfiltrate|transmit)\b.{0,60}\b(?:to|into)\s+(?:https?://|[a-z0-9._%+-]+@[a-z0-9.-]+)",
        "Instruction to ship data to an external address",
        0.85,
    ),
    (
        "DE-002",
        ThreatCategory::DataExfiltration,
        r"(?i)\b(?:dump|list|reveal|leak|print)\s+(?:all\s+)?(?:the\s+)?(?:api\s*keys?|passwords?|secrets?|credentials|tokens|env(?:ironment)?\s+variables)",
        "Request for secrets",
        0.85,
    ),
    (
        "CI-001",
        ThreatCategory::CodeInjection,
        r"(?i)<\s*script\b",
        "Script tag",
        0.95,
    ),
    (
        "CI-002",
        ThreatCategory::CodeInjection,
        r"(?i)\b(?:eval|exec|system|os\.system|subprocess\.\w+)\s*\(",
        "Dynamic code execution call",
        0.8,
    ),
    (
        "CI-003",
        ThreatCategory::CodeInjection,
        r"(?i)\bjavascript\s*:",
        "javascript: URI",
        0.7,
    ),
    (
        "CI-004",
        ThreatCategory::CodeInjection,
        r"(?i)\bon(?:error|load|click|mouseover)\s*=",
        "Inline event handler",
        0.7,
    ),
    (
        "SQ-001",
        ThreatCategory::SqlInjection,
        r"(?i)\b(?:union\s+(?:all\s+)?select|drop\s+(?:table|database)|insert\s+into|delete\s+from|truncate\s+table)\b",
        "Destructive or union SQL statement",
        0.85,
    ),
    (
        "SQ-002",
        ThreatCategory::SqlInjection,
        r"(?i)'\s*or\s+'?\d+'?\s*=\s*'?\d+",
        "Tautology predicate",
        0.85,
    ),
    (
        "SQ-003",
        ThreatCategory::SqlInjection,
        r";\s*--",
        "Statement terminator followed by comment",
        0.5,
    ),
    (
        "DL-001",
        ThreatCategory::DelimiterInjection,
        r"(?i)</?\s*(?:system|context|instructions?|assistant|user)\s*>",
        "Chat role markup",
        0.85,
    ),
    (
        "DL-002",
        ThreatCategory::DelimiterInjection,
        r"(?i)```\s*(?:system|assistant|instructions?)\b",
        "Fenced role block",
        0.8,
    ),
    (
        "DL-003",
        ThreatCategory::DelimiterInjection,
        r"(?i)\[/?(?:INST|SYS)\]",
        "Instruction-tuning delimiters",
        0.8,
    ),
    (
        "DL-004",
        ThreatCategory::DelimiterInjection,
        r"(?i)(?:-{3,}|={3,}|#{3,})\s*(?:end|begin)\s+(?:of\s+)?(?:context|system|instructions|prompt)",
        "Fake section boundary",
        0.75,
    ),
];

/// Rule-based injection screener
pub struct InjectionScreener {
    rules: Vec<ScreeningRule>,
    unsafe_threshold: f32,
    critical_threshold: f32,
    aggregate_threshold: f32,
    placeholder: String,
}

impl InjectionScreener {
    /// Create a screener with the built-in rules
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let mut rules = Vec::with_capacity(BUILTIN_RULES.len());
        for (id, category, pattern, description, severity) in BUILTIN_RULES {
            rules.push(ScreeningRule::new(*id, *category, pattern, *description, *severity)?);
        }

        Ok(Self {
            rules,
            unsafe_threshold: config.unsafe_threshold,
            critical_threshold: config.critical_threshold,
            aggregate_threshold: config.aggregate_threshold,
            placeholder: config.placeholder.clone(),
        })
    }

    /// Append a rule; it is evaluated after all existing rules
    pub fn add_rule(&mut self, rule: ScreeningRule) {
        tracing::debug!(rule_id = %rule.id, category = %rule.category, "Added screening rule");
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Screen a query
    pub fn validate(&self, query: &str) -> SecurityVerdict {
        let mut findings = Vec::new();
        let mut spans = Vec::new();

        for (index, rule) in self.rules.iter().enumerate() {
            let matches = rule.match_spans(query);
            let Some(&first) = matches.first() else {
                continue;
            };

            let finding = ThreatFinding {
                pattern_id: rule.id.clone(),
                description: rule.description.clone(),
                category: rule.category,
                severity: rule.severity,
                matched_span: first,
                matched_text: query[first.0..first.1].to_string(),
            };

            if rule.severity >= self.critical_threshold {
                tracing::warn!(
                    rule_id = %rule.id,
                    category = %rule.category,
                    severity = rule.severity,
                    "Critical injection pattern, short-circuiting"
                );
                spans.extend(matches);
                for later in &self.rules[index + 1..] {
                    spans.extend(later.match_spans(query));
                }
                return SecurityVerdict {
                    is_safe: false,
                    findings: vec![finding],
                    sanitized_query: self.sanitize(query, spans),
                    rules_evaluated: index + 1,
                    short_circuited: true,
                };
            }

            findings.push(finding);
            spans.extend(matches);
        }

        let aggregate: f32 = findings.iter().map(|f| f.severity).sum();
        let is_safe = !findings.iter().any(|f| f.severity > self.unsafe_threshold)
            && aggregate <= self.aggregate_threshold;

        if !findings.is_empty() {
            tracing::info!(
                findings = findings.len(),
                aggregate_severity = aggregate,
                is_safe,
                "Injection screening produced findings"
            );
        }

        SecurityVerdict {
            is_safe,
            findings,
            sanitized_query: self.sanitize(query, spans),
            rules_evaluated: self.rules.len(),
            short_circuited: false,
        }
    }

    /// Replace merged match spans with the placeholder
    fn sanitize(&self, query: &str, mut spans: Vec<(usize, usize)>) -> String {
        if spans.is_empty() {
            return query.to_string();
        }
        spans.sort_unstable();

        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        let mut out = String::with_capacity(query.len());
        let mut cursor = 0;
        for (start, end) in merged {
            out.push_str(&query[cursor..start]);
            out.push_str(&self.placeholder);
            cursor = end;
        }
        out.push_str(&query[cursor..]);
        out
    }
}
