//! Similarity scoring.
//!
//! Character-trigram Jaccard overlap is the dominant signal; whole-word
//! overlap, probe charge, shared tags and recency adjust it.

mod config;
mod scorer;
pub mod shingles;

pub use config::{MatchTier, ScoringConfig, TierThresholds};
pub use scorer::{ScoreBreakdown, ScoredMatch, SimilarityScorer};
