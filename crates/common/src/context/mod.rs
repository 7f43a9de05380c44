//! Context Engine Core Components
//!
//! Query-side processing shared by every retrieval:
//! - Prompt-injection screening
//! - Entity recognition and query enhancement
//! - Context window selection

mod context_window;
mod entity_extractor;
mod injection_screener;

pub use context_window::{assemble_context, ContextSelection, ContextWindowSelector, ContextWindowStrategy, CONTEXT_SEPARATOR};
pub use entity_extractor::{Entity, EntityExtractor, EntityType};
pub use injection_screener::{InjectionScreener, ScreeningRule, SecurityVerdict, ThreatCategory, ThreatFinding};
