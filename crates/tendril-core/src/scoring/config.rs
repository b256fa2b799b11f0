//! Configuration for similarity scoring and tier classification.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Weights and bonuses used by the similarity scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of the trigram Jaccard overlap (dominant signal).
    /// Default: 1.0
    pub trigram_weight: f32,

    /// Weight of whole-word overlap, roughly a third of the trigram weight.
    /// Default: 0.35
    pub word_weight: f32,

    /// Charge amplification: multiplier = 1 + charge * amplification_factor.
    /// Default: 0.2
    pub amplification_factor: f32,

    /// Upper bound of the charge multiplier. Default: 1.2
    pub max_charge_multiplier: f32,

    /// Additive bonus per tag shared by query and probe. Default: 0.05
    pub per_tag_bonus: f32,

    /// Cap on the total tag bonus. Default: 0.15
    pub max_tag_bonus: f32,

    /// Recency window in seconds; the bonus decays linearly to zero across it.
    /// Default: 86400 (24h)
    pub recency_window_secs: u64,

    /// Recency bonus applied immediately after a match. Default: 0.1
    pub recency_bonus: f32,

    /// Words shorter than this are ignored by word overlap. Default: 3
    pub min_word_len: usize,

    /// Shared shingles reported in a breakdown. Default: 5
    pub top_shingles: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            trigram_weight: 1.0,
            word_weight: 0.35,
            amplification_factor: 0.2,
            max_charge_multiplier: 1.2,
            per_tag_bonus: 0.05,
            max_tag_bonus: 0.15,
            recency_window_secs: 86_400,
            recency_bonus: 0.1,
            min_word_len: 3,
            top_shingles: 5,
        }
    }
}

impl ScoringConfig {
    /// Validate configuration values are in valid ranges.
    pub fn validate(&self) -> Result<(), &'static str> {
        let fields = [
            self.trigram_weight,
            self.word_weight,
            self.amplification_factor,
            self.max_charge_multiplier,
            self.per_tag_bonus,
            self.max_tag_bonus,
            self.recency_bonus,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err("scoring weights and bonuses must be finite numbers");
        }
        if self.trigram_weight < 0.0 || self.word_weight < 0.0 {
            return Err("similarity weights must be non-negative");
        }
        if self.trigram_weight + self.word_weight <= 0.0 {
            return Err("at least one similarity weight must be positive");
        }
        if self.amplification_factor < 0.0 {
            return Err("amplification_factor must be non-negative");
        }
        if self.max_charge_multiplier < 1.0 {
            return Err("max_charge_multiplier must be at least 1.0");
        }
        if self.per_tag_bonus < 0.0 || self.max_tag_bonus < 0.0 {
            return Err("tag bonuses must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.recency_bonus) {
            return Err("recency_bonus must be between 0.0 and 1.0");
        }
        Ok(())
    }
}

/// Classification label of a match strength.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchTier {
    Faint,
    Subtle,
    Strong,
    /// Eligible for full convergence.
    Convergent,
}

/// Strength thresholds separating the tiers, descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    /// Default: 0.8
    pub convergent: f32,
    /// Default: 0.6
    pub strong: f32,
    /// Default: 0.4
    pub subtle: f32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            convergent: 0.8,
            strong: 0.6,
            subtle: 0.4,
        }
    }
}

impl TierThresholds {
    /// Classify a strength.
    pub fn classify(&self, strength: f32) -> MatchTier {
        if strength >= self.convergent {
            MatchTier::Convergent
        } else if strength >= self.strong {
            MatchTier::Strong
        } else if strength >= self.subtle {
            MatchTier::Subtle
        } else {
            MatchTier::Faint
        }
    }

    /// Validate that thresholds lie in [0, 1] and strictly descend.
    pub fn validate(&self) -> Result<(), &'static str> {
        for t in [self.convergent, self.strong, self.subtle] {
            if !(0.0..=1.0).contains(&t) {
                return Err("tier thresholds must be between 0.0 and 1.0");
            }
        }
        if !(self.convergent > self.strong && self.strong > self.subtle) {
            return Err("tier thresholds must be strictly descending");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let tiers = TierThresholds::default();
        assert_eq!(tiers.classify(0.8), MatchTier::Convergent);
        assert_eq!(tiers.classify(0.79), MatchTier::Strong);
        assert_eq!(tiers.classify(0.6), MatchTier::Strong);
        assert_eq!(tiers.classify(0.4), MatchTier::Subtle);
        assert_eq!(tiers.classify(0.39), MatchTier::Faint);
        assert_eq!(tiers.classify(0.0), MatchTier::Faint);
    }

    #[test]
    fn test_tier_validation() {
        assert!(TierThresholds::default().validate().is_ok());

        let overlapping = TierThresholds {
            convergent: 0.6,
            strong: 0.6,
            subtle: 0.4,
        };
        assert!(overlapping.validate().is_err());
    }

    #[test]
    fn test_scoring_config_validation() {
        assert!(ScoringConfig::default().validate().is_ok());

        let bad = ScoringConfig {
            max_charge_multiplier: 0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_non_finite_scoring_values_are_rejected() {
        let config: ScoringConfig = toml::from_str("trigram_weight = nan").unwrap();
        assert!(config.trigram_weight.is_nan());
        assert!(config.validate().is_err());

        let config: ScoringConfig = toml::from_str("amplification_factor = inf").unwrap();
        assert!(config.validate().is_err());

        let bad = ScoringConfig {
            per_tag_bonus: f32::NAN,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_tier_names() {
        assert_eq!(MatchTier::Convergent.to_string(), "convergent");
        assert_eq!("subtle".parse::<MatchTier>().unwrap(), MatchTier::Subtle);
    }
}
