//! Probe registry.
//!
//! Probes are standing interest declarations. The registry owns them, is the
//! only writer of their mutable state, and derives statistics from a bounded
//! history of processed queries.

mod history;
mod registry;
mod types;

pub use history::{QueryRecord, RegistryStats};
pub use registry::{ProbeRegistry, RegistryConfig, RestoreReport};
pub use types::{normalize_tags, NewProbe, Probe, ProbeFilter, ProbeStatus};
