//! Similarity scorer: turns a query text and a probe into a relevance strength.
//!
//! strength = clamp(base * charge_multiplier + tag_bonus + recency_bonus, 0, 1)
//!
//! The scorer is stateless and pure. The current time is passed in so the
//! recency term is a function of `now - last_matched_at` only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::config::{MatchTier, ScoringConfig, TierThresholds};
use super::shingles;
use crate::error::TendrilResult;
use crate::probe::Probe;

/// Components that produced a strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Weighted blend of trigram and word overlap, capped at 1.
    pub base_similarity: f32,
    /// Jaccard overlap of character trigrams.
    pub trigram_overlap: f32,
    /// Fraction of probe words found in the query.
    pub word_overlap: f32,
    /// Multiplier applied for the probe's charge.
    pub charge_multiplier: f32,
    /// Additive bonus for shared tags.
    pub tag_bonus: f32,
    /// Additive bonus for a recent previous match.
    pub recency_bonus: f32,
    /// Shared trigrams, lexicographically ordered.
    pub top_shingles: Vec<String>,
}

/// A strength, its tier, and the breakdown behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub strength: f32,
    pub tier: MatchTier,
    pub breakdown: ScoreBreakdown,
}

/// Scores query text against probes.
#[derive(Debug, Clone, Default)]
pub struct SimilarityScorer {
    config: ScoringConfig,
    tiers: TierThresholds,
}

impl SimilarityScorer {
    /// Create a scorer with the given weights and tier thresholds.
    pub fn new(config: ScoringConfig, tiers: TierThresholds) -> Self {
        Self { config, tiers }
    }

    /// Get the scoring configuration.
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Get the tier thresholds.
    pub fn tiers(&self) -> &TierThresholds {
        &self.tiers
    }

    /// Score `query_text` (with normalized `query_tags`) against `probe` at `now`.
    ///
    /// Fails only when the probe record itself is unusable.
    pub fn score(
        &self,
        query_text: &str,
        query_tags: &BTreeSet<String>,
        probe: &Probe,
        now: DateTime<Utc>,
    ) -> TendrilResult<ScoredMatch> {
        probe.check_integrity()?;

        let query_grams = shingles::trigrams(query_text);
        let probe_grams = shingles::trigrams(&probe.text);
        let trigram_overlap = shingles::jaccard(&query_grams, &probe_grams);

        let word_overlap = shingles::word_overlap(
            &shingles::words(query_text, self.config.min_word_len),
            &shingles::words(&probe.text, self.config.min_word_len),
        );

        let base_similarity = (self.config.trigram_weight * trigram_overlap
            + self.config.word_weight * word_overlap)
            .clamp(0.0, 1.0);

        let charge_multiplier = self.charge_multiplier(probe.charge);
        let tag_bonus = self.tag_bonus(query_tags, &probe.tags);
        let recency_bonus = self.recency_bonus(probe.last_matched_at, now);

        let strength =
            (base_similarity * charge_multiplier + tag_bonus + recency_bonus).clamp(0.0, 1.0);

        let top_shingles = query_grams
            .intersection(&probe_grams)
            .take(self.config.top_shingles)
            .cloned()
            .collect();

        Ok(ScoredMatch {
            strength,
            tier: self.tiers.classify(strength),
            breakdown: ScoreBreakdown {
                base_similarity,
                trigram_overlap,
                word_overlap,
                charge_multiplier,
                tag_bonus,
                recency_bonus,
                top_shingles,
            },
        })
    }

    /// min(max_multiplier, 1 + charge * amplification_factor)
    pub fn charge_multiplier(&self, charge: f32) -> f32 {
        (1.0 + charge * self.config.amplification_factor).min(self.config.max_charge_multiplier)
    }

    /// min(max_tag_bonus, shared_tags * per_tag_bonus)
    pub fn tag_bonus(&self, query_tags: &BTreeSet<String>, probe_tags: &BTreeSet<String>) -> f32 {
        let shared = query_tags.intersection(probe_tags).count() as f32;
        (shared * self.config.per_tag_bonus).min(self.config.max_tag_bonus)
    }

    /// Linear decay from `recency_bonus` at elapsed 0 to zero at the window edge.
    ///
    /// A match timestamp after `now` counts as elapsed 0.
    pub fn recency_bonus(&self, last_matched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f32 {
        let Some(last) = last_matched_at else {
            return 0.0;
        };
        let window = self.config.recency_window_secs as f64;
        if window <= 0.0 {
            return 0.0;
        }
        let elapsed = ((now - last).num_milliseconds() as f64 / 1000.0).max(0.0);
        if elapsed >= window {
            return 0.0;
        }
        (self.config.recency_bonus as f64 * (1.0 - elapsed / window)) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{normalize_tags, ProbeStatus};
    use chrono::Duration;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn probe(text: &str, charge: f32, tags: &[&str]) -> Probe {
        Probe {
            id: Uuid::new_v4(),
            owner: "human".to_string(),
            text: text.to_string(),
            tags: normalize_tags(tags.iter().copied()),
            charge,
            created_at: Utc::now(),
            last_matched_at: None,
            status: ProbeStatus::Seeking,
            match_count: 0,
            metadata: HashMap::new(),
        }
    }

    fn no_tags() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[test]
    fn test_strength_is_bounded() {
        let scorer = SimilarityScorer::default();
        let now = Utc::now();
        let mut p = probe("rust async runtime", 1.0, &["rust", "async", "tokio"]);
        p.last_matched_at = Some(now);
        let tags = normalize_tags(["rust", "async", "tokio"]);

        for query in ["rust async runtime", "", "completely unrelated", "r"] {
            let scored = scorer.score(query, &tags, &p, now).unwrap();
            assert!((0.0..=1.0).contains(&scored.strength), "{query}: {}", scored.strength);
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let scorer = SimilarityScorer::default();
        let now = Utc::now();
        let mut p = probe("find consciousness collaborators", 0.9, &["research"]);
        p.last_matched_at = Some(now - Duration::hours(3));
        let tags = normalize_tags(["research"]);

        let a = scorer.score("consciousness research", &tags, &p, now).unwrap();
        let b = scorer.score("consciousness research", &tags, &p, now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_tag_never_decreases_strength() {
        let scorer = SimilarityScorer::default();
        let now = Utc::now();
        let p = probe("distributed tracing", 0.5, &["observability", "rust"]);

        let without = scorer.score("tracing spans", &no_tags(), &p, now).unwrap();
        let with = scorer
            .score("tracing spans", &normalize_tags(["rust"]), &p, now)
            .unwrap();
        assert!(with.strength >= without.strength);
        assert!((with.breakdown.tag_bonus - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_tag_bonus_is_capped() {
        let scorer = SimilarityScorer::default();
        let tags = normalize_tags(["a", "b", "c", "d", "e"]);
        assert!((scorer.tag_bonus(&tags, &tags) - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_recency_bonus_decays_to_window_edge() {
        let scorer = SimilarityScorer::default();
        let now = Utc::now();
        let window = Duration::hours(24);
        let p = probe("weekly planning notes", 0.5, &[]);

        let at = |last: Option<DateTime<Utc>>| {
            let mut probe = p.clone();
            probe.last_matched_at = last;
            scorer.score("planning notes", &no_tags(), &probe, now).unwrap().strength
        };

        let fresh = at(Some(now));
        let almost_expired = at(Some(now - window + Duration::seconds(1)));
        let expired = at(Some(now - window));
        let never = at(None);

        assert!(fresh >= almost_expired);
        assert!(almost_expired >= expired);
        assert_eq!(expired, never);
        assert!((scorer.recency_bonus(Some(now), now) - 0.1).abs() < 1e-6);
        assert!((scorer.recency_bonus(Some(now - Duration::hours(12)), now) - 0.05).abs() < 1e-4);
        assert!((scorer.recency_bonus(Some(now + Duration::hours(1)), now) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_charge_multiplier() {
        let scorer = SimilarityScorer::default();
        assert!((scorer.charge_multiplier(0.0) - 1.0).abs() < 1e-6);
        assert!((scorer.charge_multiplier(0.9) - 1.18).abs() < 1e-6);
        assert!((scorer.charge_multiplier(5.0) - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_higher_charge_scores_higher() {
        let scorer = SimilarityScorer::default();
        let now = Utc::now();
        let high = probe("find consciousness collaborators", 0.9, &[]);
        let low = probe("find consciousness collaborators", 0.1, &[]);

        let query = "looking for consciousness researchers";
        let h = scorer.score(query, &no_tags(), &high, now).unwrap();
        let l = scorer.score(query, &no_tags(), &low, now).unwrap();
        assert!(h.strength > l.strength);
        assert_eq!(h.breakdown.base_similarity, l.breakdown.base_similarity);
    }

    #[test]
    fn test_reference_scenario_lands_in_subtle_tier() {
        let scorer = SimilarityScorer::default();
        let p = probe("find consciousness collaborators", 0.9, &["research"]);

        let scored = scorer
            .score("looking for consciousness researchers", &no_tags(), &p, Utc::now())
            .unwrap();

        assert_eq!(scored.breakdown.tag_bonus, 0.0);
        assert!((scored.breakdown.charge_multiplier - 1.18).abs() < 1e-6);
        assert!(scored.breakdown.trigram_overlap > 0.2);
        assert!(scored.breakdown.top_shingles.iter().all(|s| s.chars().count() == 3));
        assert_eq!(scored.tier, MatchTier::Subtle);
    }

    #[test]
    fn test_malformed_probe_is_rejected() {
        let scorer = SimilarityScorer::default();
        let mut p = probe("valid text", 0.5, &[]);
        p.charge = f32::INFINITY;
        assert!(scorer.score("valid", &no_tags(), &p, Utc::now()).is_err());
    }

    #[test]
    fn test_identical_text_has_full_base_similarity() {
        let scorer = SimilarityScorer::default();
        let p = probe("Event Sourcing Patterns", 0.0, &[]);
        let scored = scorer
            .score("event   sourcing patterns", &no_tags(), &p, Utc::now())
            .unwrap();
        assert!((scored.breakdown.base_similarity - 1.0).abs() < 1e-6);
        assert_eq!(scored.tier, MatchTier::Convergent);
    }
}
