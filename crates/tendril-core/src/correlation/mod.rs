//! Correlation of query events against the probe registry.

mod engine;
mod types;

pub use engine::{CorrelationConfig, CorrelationEngine};
pub use types::{MatchResult, QueryEvent, QueryOutcome, QueryRequest, TAGS_KEY};
