//! Correlation engine: fans a query event out over all active probes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::types::{MatchResult, QueryEvent, QueryOutcome};
use crate::convergence::ConvergenceDetector;
use crate::events::{EngineEvent, EventBus, QueryProcessedEvent};
use crate::probe::{ProbeRegistry, QueryRecord};
use crate::scoring::SimilarityScorer;

/// Configuration for the correlation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Results below this strength are dropped from the outcome. Default: 0.1
    pub min_signal: f32,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self { min_signal: 0.1 }
    }
}

impl CorrelationConfig {
    /// Validate configuration values are in valid ranges.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(0.0..=1.0).contains(&self.min_signal) {
            return Err("min_signal must be between 0.0 and 1.0");
        }
        Ok(())
    }
}

/// Scores query events against the registry and reports agreements.
pub struct CorrelationEngine {
    registry: Arc<ProbeRegistry>,
    scorer: SimilarityScorer,
    detector: ConvergenceDetector,
    bus: Arc<EventBus>,
    config: CorrelationConfig,
}

impl CorrelationEngine {
    pub fn new(
        registry: Arc<ProbeRegistry>,
        scorer: SimilarityScorer,
        detector: ConvergenceDetector,
        bus: Arc<EventBus>,
        config: CorrelationConfig,
    ) -> Self {
        Self {
            registry,
            scorer,
            detector,
            bus,
            config,
        }
    }

    /// Get the scorer.
    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    /// Process one query event.
    ///
    /// Never fails: malformed probes are skipped and registry write failures
    /// are logged. The event timestamp is the reference time for recency.
    pub fn process(&self, event: &QueryEvent) -> QueryOutcome {
        let now = event.timestamp;
        let probes = match self.registry.active() {
            Ok(probes) => probes,
            Err(err) => {
                error!(query_event_id = %event.id, error = %err, "Could not read active probes");
                Vec::new()
            }
        };
        let query_tags = event.tags();

        let mut matches = Vec::new();
        let mut peak_strength = 0.0f32;
        let mut skipped_probes = 0;

        for probe in &probes {
            match self.scorer.score(&event.text, &query_tags, probe, now) {
                Ok(scored) => {
                    peak_strength = peak_strength.max(scored.strength);
                    if scored.strength >= self.config.min_signal {
                        matches.push(MatchResult::new(probe.id, scored, now));
                    }
                }
                Err(err) => {
                    skipped_probes += 1;
                    warn!(probe_id = %probe.id, error = %err, "Skipping malformed probe");
                }
            }
        }

        // Stable sort keeps creation order among equal strengths
        matches.sort_by(|a, b| b.strength.total_cmp(&a.strength));

        let connect_threshold = self.registry.config().connect_threshold;
        for m in matches.iter().filter(|m| m.strength >= connect_threshold) {
            if let Err(err) = self.registry.record_match(m.probe_id, now, m.strength) {
                warn!(probe_id = %m.probe_id, error = %err, "Failed to record match");
            }
        }

        debug!(
            query_event_id = %event.id,
            scored = probes.len() - skipped_probes,
            kept = matches.len(),
            peak = peak_strength,
            "Query processed"
        );

        self.bus
            .publish(EngineEvent::QueryProcessed(QueryProcessedEvent {
                event_id: Uuid::new_v4(),
                query_event_id: event.id,
                source_type: event.source_type.clone(),
                source_tag: event.source_tag.clone(),
                matches: matches.clone(),
                peak_strength,
                timestamp: Utc::now(),
            }));

        let convergence = self.detector.detect(event, &matches);

        let outcome = QueryOutcome {
            query_event_id: event.id,
            matches,
            peak_strength,
            skipped_probes,
            convergence,
            processed_at: Utc::now(),
        };

        if let Err(err) = self.registry.record_query(QueryRecord::from_outcome(&outcome)) {
            warn!(query_event_id = %event.id, error = %err, "Failed to record query history");
        }
        outcome
    }
}
