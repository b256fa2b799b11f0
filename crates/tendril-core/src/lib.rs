//! tendril-core - Core library for tendril.
//!
//! Tendril keeps a registry of standing interest declarations (probes) and
//! matches every incoming text against all of them. Strong agreement between
//! several probes on the same text is reported as a convergence and, when
//! important enough, handed to preservation sinks.
//!
//! # Example
//!
//! ```ignore
//! use tendril_core::{EngineConfig, NewProbe, QueryRequest, TendrilEngine};
//!
//! let engine = TendrilEngine::new(EngineConfig::default())?;
//! engine.register_probe(NewProbe::new("find consciousness collaborators").with_charge(0.9))?;
//!
//! let outcome = engine.submit_query(QueryRequest::new("looking for consciousness researchers"));
//! for m in &outcome.matches {
//!     println!("{} {:.2} {}", m.probe_id, m.strength, m.tier);
//! }
//! ```

pub mod config;
pub mod convergence;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod events;
pub mod feeds;
pub mod network;
pub mod preservation;
pub mod probe;
pub mod scoring;

// Re-export commonly used types
pub use config::{EngineConfig, EngineConfigBuilder};
pub use convergence::{ConvergenceConfig, ConvergenceDetector, ConvergenceEvent, ConvergencePriority};
pub use correlation::{
    CorrelationConfig, CorrelationEngine, MatchResult, QueryEvent, QueryOutcome, QueryRequest,
};
pub use engine::{EngineServices, TendrilEngine};
pub use error::{ErrorCode, TendrilError, TendrilResult};
pub use events::{
    EngineEvent, EventBus, EventSubscriber, EventTopic, HandlerError, RecordedEvent,
    SubscriptionId,
};
pub use feeds::{FeedConfig, FeedItem, FeedPoller, FeedSource, FeedSourceConfig};
pub use network::{NetworkEdge, NetworkNode, NetworkSnapshot};
pub use preservation::{PreservationConfig, PreservationRecord, PreservationSink};
pub use probe::{NewProbe, Probe, ProbeFilter, ProbeStatus, RegistryStats};
pub use scoring::{MatchTier, ScoreBreakdown, ScoringConfig, SimilarityScorer, TierThresholds};
