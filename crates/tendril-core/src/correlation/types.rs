//! Query events and match results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::convergence::ConvergenceEvent;
use crate::probe::normalize_tags;
use crate::scoring::{MatchTier, ScoreBreakdown, ScoredMatch};

/// Metadata key holding query tags.
pub const TAGS_KEY: &str = "tags";

/// One text submitted for matching. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEvent {
    pub id: Uuid,
    pub text: String,
    /// Where the text came from (e.g. "direct", "feed")
    pub source_type: String,
    pub timestamp: DateTime<Utc>,
    /// Finer-grained origin (e.g. feed id)
    pub source_tag: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl QueryEvent {
    /// Create a direct query event stamped now.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            source_type: "direct".to_string(),
            timestamp: Utc::now(),
            source_tag: "api".to_string(),
            metadata: HashMap::new(),
        }
    }

    /// Builder method to set the source
    pub fn with_source(mut self, source_type: impl Into<String>, source_tag: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self.source_tag = source_tag.into();
        self
    }

    /// Builder method to set the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder method to replace metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Builder method to set `metadata.tags`
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<serde_json::Value> = tags
            .into_iter()
            .map(|t| serde_json::Value::String(t.into()))
            .collect();
        self.metadata
            .insert(TAGS_KEY.to_string(), serde_json::Value::Array(tags));
        self
    }

    /// Normalized tags from `metadata.tags`; non-string entries are ignored.
    pub fn tags(&self) -> BTreeSet<String> {
        match self.metadata.get(TAGS_KEY) {
            Some(serde_json::Value::Array(values)) => {
                normalize_tags(values.iter().filter_map(|v| v.as_str()))
            }
            _ => BTreeSet::new(),
        }
    }
}

/// Caller-facing query submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_source_type() -> String {
    "direct".to_string()
}

fn default_source_tag() -> String {
    "api".to_string()
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_type: default_source_type(),
            source_tag: default_source_tag(),
            metadata: HashMap::new(),
        }
    }

    /// Stamp the request into an immutable query event.
    pub fn into_event(self) -> QueryEvent {
        QueryEvent::new(self.text)
            .with_source(self.source_type, self.source_tag)
            .with_metadata(self.metadata)
    }
}

/// One probe's score against one query event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub probe_id: Uuid,
    pub strength: f32,
    pub tier: MatchTier,
    pub breakdown: ScoreBreakdown,
    pub timestamp: DateTime<Utc>,
}

impl MatchResult {
    pub fn new(probe_id: Uuid, scored: ScoredMatch, timestamp: DateTime<Utc>) -> Self {
        Self {
            probe_id,
            strength: scored.strength,
            tier: scored.tier,
            breakdown: scored.breakdown,
            timestamp,
        }
    }
}

/// Everything produced by processing one query event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query_event_id: Uuid,
    /// Matches at or above the minimum signal, strongest first
    pub matches: Vec<MatchResult>,
    /// Highest strength seen, including discarded results
    pub peak_strength: f32,
    /// Probes skipped because their records were malformed
    pub skipped_probes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceEvent>,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_tags_from_metadata() {
        let event = QueryEvent::new("text").with_tags(["Research", "AI", "research"]);
        let tags = event.tags();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("ai"));

        let mut metadata = HashMap::new();
        metadata.insert("tags".to_string(), json!(["ok", 7, null]));
        let event = QueryEvent::new("text").with_metadata(metadata);
        assert_eq!(event.tags().len(), 1);

        let mut metadata = HashMap::new();
        metadata.insert("tags".to_string(), json!("not-a-list"));
        assert!(QueryEvent::new("text").with_metadata(metadata).tags().is_empty());
    }

    #[test]
    fn test_request_defaults() {
        let req: QueryRequest = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        let event = req.into_event();
        assert_eq!(event.source_type, "direct");
        assert_eq!(event.source_tag, "api");
        assert_eq!(event.text, "hello");
    }
}
