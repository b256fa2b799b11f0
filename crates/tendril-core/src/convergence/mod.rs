//! Convergence detection.
//!
//! A convergence is a query event on which several probes score at or above
//! the strong threshold. Its aggregate strength is the mean of the qualifying
//! strengths plus a capped participation bonus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::info;
use uuid::Uuid;

use crate::correlation::{MatchResult, QueryEvent};
use crate::events::{ConvergenceDetectedEvent, EngineEvent, EventBus, PreservationRequestedEvent};
use crate::preservation::PreservationRecord;
use crate::scoring::TierThresholds;

/// Configuration for convergence detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Minimum strength for a match to take part. Must be at least the
    /// scorer's strong tier. Default: 0.6
    pub strong_threshold: f32,
    /// Qualifying matches required. Default: 2
    pub min_participants: usize,
    /// Bonus per participant beyond the first. Default: 0.1
    pub per_participant_bonus: f32,
    /// Cap on the participation bonus. Default: 0.3
    pub participation_bonus_cap: f32,
    /// Aggregate strength for `High` priority. Default: 0.75
    pub high_threshold: f32,
    /// Aggregate strength for `Sacred` priority. Default: 0.75
    pub preservation_threshold: f32,
    /// Participants required for `Sacred` priority. Default: 3
    pub sacred_min_participants: usize,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            strong_threshold: 0.6,
            min_participants: 2,
            per_participant_bonus: 0.1,
            participation_bonus_cap: 0.3,
            high_threshold: 0.75,
            preservation_threshold: 0.75,
            sacred_min_participants: 3,
        }
    }
}

impl ConvergenceConfig {
    /// Validate against the scorer's tier thresholds.
    pub fn validate(&self, tiers: &TierThresholds) -> Result<(), &'static str> {
        if !(0.0..=1.0).contains(&self.strong_threshold) {
            return Err("strong_threshold must be between 0.0 and 1.0");
        }
        if self.strong_threshold < tiers.strong {
            return Err("strong_threshold must not be below the strong tier");
        }
        if self.min_participants < 2 {
            return Err("min_participants must be at least 2");
        }
        if !self.per_participant_bonus.is_finite() || !self.participation_bonus_cap.is_finite() {
            return Err("participation bonuses must be finite numbers");
        }
        if self.per_participant_bonus < 0.0 || self.participation_bonus_cap < 0.0 {
            return Err("participation bonuses must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.high_threshold)
            || !(0.0..=1.0).contains(&self.preservation_threshold)
        {
            return Err("priority thresholds must be between 0.0 and 1.0");
        }
        Ok(())
    }
}

/// Priority of a convergence; anything above `Normal` is preserved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConvergencePriority {
    Normal,
    High,
    Sacred,
}

impl ConvergencePriority {
    /// Whether this priority is forwarded to preservation sinks.
    pub fn needs_preservation(self) -> bool {
        self != ConvergencePriority::Normal
    }
}

/// A query event on which multiple probes agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceEvent {
    pub query_event_id: Uuid,
    /// Qualifying matches, at least two
    pub matches: Vec<MatchResult>,
    pub aggregate_strength: f32,
    pub priority: ConvergencePriority,
    pub timestamp: DateTime<Utc>,
}

impl ConvergenceEvent {
    /// Ids of the participating probes.
    pub fn probe_ids(&self) -> Vec<Uuid> {
        self.matches.iter().map(|m| m.probe_id).collect()
    }
}

/// Detects convergences and publishes them.
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
    bus: Arc<EventBus>,
}

impl ConvergenceDetector {
    pub fn new(config: ConvergenceConfig, bus: Arc<EventBus>) -> Self {
        Self { config, bus }
    }

    /// Get the detector configuration.
    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// Inspect the matches of a processed query.
    ///
    /// Publishes `ConvergenceDetected` for every convergence and, for
    /// non-normal priority, `PreservationRequested`.
    pub fn detect(&self, event: &QueryEvent, matches: &[MatchResult]) -> Option<ConvergenceEvent> {
        let convergence = self.evaluate(event.id, matches, Utc::now())?;

        info!(
            query_event_id = %convergence.query_event_id,
            participants = convergence.matches.len(),
            aggregate = convergence.aggregate_strength,
            priority = %convergence.priority,
            "Convergence detected"
        );

        self.bus.publish(EngineEvent::ConvergenceDetected(
            ConvergenceDetectedEvent::new(convergence.clone()),
        ));
        if convergence.priority.needs_preservation() {
            self.bus.publish(EngineEvent::PreservationRequested(
                PreservationRequestedEvent::new(PreservationRecord::from_convergence(&convergence)),
            ));
        }
        Some(convergence)
    }

    /// Pure evaluation without publishing.
    pub fn evaluate(
        &self,
        query_event_id: Uuid,
        matches: &[MatchResult],
        timestamp: DateTime<Utc>,
    ) -> Option<ConvergenceEvent> {
        let qualifying: Vec<MatchResult> = matches
            .iter()
            .filter(|m| m.strength >= self.config.strong_threshold)
            .cloned()
            .collect();
        if qualifying.len() < self.config.min_participants {
            return None;
        }

        let aggregate_strength = self.aggregate(&qualifying);
        let priority = self.priority(aggregate_strength, qualifying.len());

        Some(ConvergenceEvent {
            query_event_id,
            matches: qualifying,
            aggregate_strength,
            priority,
            timestamp,
        })
    }

    /// mean + min(cap, (n - 1) * per_participant_bonus), clamped to [0, 1]
    fn aggregate(&self, qualifying: &[MatchResult]) -> f32 {
        let n = qualifying.len();
        let mean = qualifying.iter().map(|m| m.strength).sum::<f32>() / n as f32;
        let bonus = ((n - 1) as f32 * self.config.per_participant_bonus)
            .min(self.config.participation_bonus_cap);
        (mean + bonus).clamp(0.0, 1.0)
    }

    fn priority(&self, aggregate: f32, participants: usize) -> ConvergencePriority {
        if aggregate >= self.config.preservation_threshold
            && participants >= self.config.sacred_min_participants
        {
            ConvergencePriority::Sacred
        } else if aggregate >= self.config.high_threshold {
            ConvergencePriority::High
        } else {
            ConvergencePriority::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::scoring::{MatchTier, ScoreBreakdown};

    fn result(strength: f32) -> MatchResult {
        MatchResult {
            probe_id: Uuid::new_v4(),
            strength,
            tier: TierThresholds::default().classify(strength),
            breakdown: ScoreBreakdown {
                base_similarity: strength,
                trigram_overlap: strength,
                word_overlap: 0.0,
                charge_multiplier: 1.0,
                tag_bonus: 0.0,
                recency_bonus: 0.0,
                top_shingles: Vec::new(),
            },
            timestamp: Utc::now(),
        }
    }

    fn detector() -> (ConvergenceDetector, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        (
            ConvergenceDetector::new(ConvergenceConfig::default(), bus.clone()),
            bus,
        )
    }

    #[test]
    fn test_only_strong_matches_participate() {
        let (detector, _) = detector();
        let matches = vec![result(0.65), result(0.7), result(0.3)];

        let convergence = detector
            .evaluate(Uuid::new_v4(), &matches, Utc::now())
            .unwrap();

        let ids = convergence.probe_ids();
        assert_eq!(ids, vec![matches[0].probe_id, matches[1].probe_id]);
        // mean 0.675 + one extra participant * 0.1
        assert!((convergence.aggregate_strength - 0.775).abs() < 1e-5);
        assert_eq!(convergence.priority, ConvergencePriority::High);
    }

    #[test]
    fn test_single_strong_match_is_not_a_convergence() {
        let (detector, _) = detector();
        let matches = vec![result(0.95), result(0.59)];
        assert!(detector
            .evaluate(Uuid::new_v4(), &matches, Utc::now())
            .is_none());
        assert!(detector.evaluate(Uuid::new_v4(), &[], Utc::now()).is_none());
    }

    #[test]
    fn test_participation_bonus_is_capped_and_clamped() {
        let (detector, _) = detector();
        let matches: Vec<MatchResult> = (0..6).map(|_| result(0.9)).collect();
        let convergence = detector
            .evaluate(Uuid::new_v4(), &matches, Utc::now())
            .unwrap();
        assert_eq!(convergence.aggregate_strength, 1.0);
        assert_eq!(convergence.priority, ConvergencePriority::Sacred);
    }

    #[test]
    fn test_priority_levels() {
        let (detector, _) = detector();
        // mean 0.6 + 0.1 = 0.7
        let normal = detector
            .evaluate(Uuid::new_v4(), &[result(0.6), result(0.6)], Utc::now())
            .unwrap();
        assert_eq!(normal.priority, ConvergencePriority::Normal);

        // mean 0.6 + 0.2 = 0.8 with three participants
        let sacred = detector
            .evaluate(
                Uuid::new_v4(),
                &[result(0.6), result(0.6), result(0.6)],
                Utc::now(),
            )
            .unwrap();
        assert_eq!(sacred.priority, ConvergencePriority::Sacred);
        assert!(sacred.matches.iter().all(|m| m.tier >= MatchTier::Strong));
    }

    #[test]
    fn test_detect_publishes_preservation_for_high_priority() {
        let (detector, bus) = detector();
        let query = QueryEvent::new("anything");

        let normal = detector.detect(&query, &[result(0.6), result(0.6)]).unwrap();
        assert_eq!(normal.priority, ConvergencePriority::Normal);
        assert_eq!(bus.recent(10, Some(EventTopic::ConvergenceDetected)).len(), 1);
        assert!(bus
            .recent(10, Some(EventTopic::PreservationRequested))
            .is_empty());

        detector.detect(&query, &[result(0.9), result(0.8)]).unwrap();
        let preserved = bus.recent(10, Some(EventTopic::PreservationRequested));
        assert_eq!(preserved.len(), 1);
        match &preserved[0].event {
            EngineEvent::PreservationRequested(e) => {
                assert_eq!(e.record.query_event_id, query.id);
                assert_eq!(e.record.priority, ConvergencePriority::High);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_config_must_not_undercut_strong_tier() {
        let tiers = TierThresholds::default();
        assert!(ConvergenceConfig::default().validate(&tiers).is_ok());

        let loose = ConvergenceConfig {
            strong_threshold: 0.5,
            ..Default::default()
        };
        assert!(loose.validate(&tiers).is_err());

        let unbounded = ConvergenceConfig {
            participation_bonus_cap: f32::INFINITY,
            ..Default::default()
        };
        assert!(unbounded.validate(&tiers).is_err());
    }
}
