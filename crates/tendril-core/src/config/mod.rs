//! Configuration system for tendril.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::convergence::ConvergenceConfig;
use crate::correlation::CorrelationConfig;
use crate::error::{TendrilError, TendrilResult};
use crate::events::EventBusConfig;
use crate::feeds::FeedConfig;
use crate::preservation::PreservationConfig;
use crate::probe::RegistryConfig;
use crate::scoring::{ScoringConfig, TierThresholds};

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Similarity weights and bonuses.
    pub scoring: ScoringConfig,
    /// Strength tier boundaries.
    pub tiers: TierThresholds,
    /// Probe bounds and history size.
    pub registry: RegistryConfig,
    /// Minimum signal kept per query.
    pub correlation: CorrelationConfig,
    /// Convergence thresholds and priorities.
    pub convergence: ConvergenceConfig,
    /// Event history and stream capacities.
    pub events: EventBusConfig,
    /// Sinks for high-priority convergences.
    pub preservation: PreservationConfig,
    /// Feeds polled on a schedule.
    pub feeds: Vec<FeedConfig>,
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> TendrilResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| TendrilError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| TendrilError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| TendrilError::Configuration(e.to_string())),
            _ => Err(TendrilError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> TendrilResult<Self> {
        Self::default().with_env()
    }

    /// Apply `TENDRIL_*` environment overrides.
    pub fn with_env(self) -> TendrilResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> TendrilResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "TENDRIL_CONNECT_THRESHOLD")? {
            self.registry.connect_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "TENDRIL_STRONG_THRESHOLD")? {
            // One threshold drives both the tier and convergence participation
            self.tiers.strong = v;
            self.convergence.strong_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "TENDRIL_PRESERVATION_THRESHOLD")? {
            self.convergence.preservation_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "TENDRIL_AMPLIFICATION_FACTOR")? {
            self.scoring.amplification_factor = v;
        }
        if let Some(v) = parse_var(&lookup, "TENDRIL_MAX_TAG_BONUS")? {
            self.scoring.max_tag_bonus = v;
        }
        if let Some(v) = parse_var(&lookup, "TENDRIL_RECENCY_WINDOW_SECS")? {
            self.scoring.recency_window_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TENDRIL_RECENCY_BONUS")? {
            self.scoring.recency_bonus = v;
        }
        if let Some(v) = parse_var(&lookup, "TENDRIL_MIN_SIGNAL")? {
            self.correlation.min_signal = v;
        }
        if let Some(v) = parse_var(&lookup, "TENDRIL_EVENT_HISTORY")? {
            self.events.history_capacity = v;
        }
        if let Some(path) = lookup("TENDRIL_PRESERVATION_PATH") {
            self.preservation.jsonl_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate every section and their cross-section constraints.
    pub fn validate(&self) -> TendrilResult<()> {
        let section = |name: &str, result: Result<(), &'static str>| {
            result.map_err(|e| TendrilError::Configuration(format!("{}: {}", name, e)))
        };
        section("scoring", self.scoring.validate())?;
        section("tiers", self.tiers.validate())?;
        section("registry", self.registry.validate())?;
        section("correlation", self.correlation.validate())?;
        section("convergence", self.convergence.validate(&self.tiers))?;
        section("preservation", self.preservation.validate())?;
        for feed in &self.feeds {
            section("feeds", feed.validate())?;
        }
        let mut ids: Vec<&str> = self.feeds.iter().map(|f| f.id.as_str()).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(TendrilError::Configuration(
                "feeds: feed ids must be unique".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> TendrilResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            TendrilError::Configuration(format!("{} has an invalid value: {:?}", key, raw))
        }),
    }
}

/// Builder for EngineConfig.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set scoring configuration.
    pub fn scoring(mut self, config: ScoringConfig) -> Self {
        self.config.scoring = config;
        self
    }

    /// Set tier thresholds.
    pub fn tiers(mut self, tiers: TierThresholds) -> Self {
        self.config.tiers = tiers;
        self
    }

    /// Set registry configuration.
    pub fn registry(mut self, config: RegistryConfig) -> Self {
        self.config.registry = config;
        self
    }

    /// Set correlation configuration.
    pub fn correlation(mut self, config: CorrelationConfig) -> Self {
        self.config.correlation = config;
        self
    }

    /// Set convergence configuration.
    pub fn convergence(mut self, config: ConvergenceConfig) -> Self {
        self.config.convergence = config;
        self
    }

    /// Set event bus configuration.
    pub fn events(mut self, config: EventBusConfig) -> Self {
        self.config.events = config;
        self
    }

    /// Set preservation configuration.
    pub fn preservation(mut self, config: PreservationConfig) -> Self {
        self.config.preservation = config;
        self
    }

    /// Add a feed.
    pub fn feed(mut self, feed: FeedConfig) -> Self {
        self.config.feeds.push(feed);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
