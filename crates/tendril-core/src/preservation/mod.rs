//! Preservation of high-priority convergences
//!
//! This module provides:
//! - The `PreservationSink` trait and the record sinks receive
//! - A JSON Lines file sink and a signed webhook sink
//! - A dispatcher delivering `preservation.requested` events off the publishing thread

mod dispatcher;
mod jsonl;
mod sink;
mod webhook;

pub use dispatcher::PreservationDispatcher;
pub use jsonl::JsonlSink;
pub use sink::{PreservationRecord, PreservationSink, SinkError, CONVERGENCE_RECORD};
pub use webhook::{
    sign_payload, verify_signature, RetryPolicy, WebhookConfig, WebhookSink, DELIVERY_HEADER,
    PRIORITY_HEADER, SIGNATURE_HEADER,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Sinks created when the engine starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreservationConfig {
    /// Append records to this JSON Lines file
    pub jsonl_path: Option<PathBuf>,
    /// POST records to these endpoints
    pub webhooks: Vec<WebhookConfig>,
}

impl PreservationConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.webhooks.iter().any(|w| w.url.trim().is_empty()) {
            return Err("webhook url must not be empty");
        }
        if let Some(path) = &self.jsonl_path {
            if path.as_os_str().is_empty() {
                return Err("jsonl_path must not be empty");
            }
        }
        Ok(())
    }

    /// Instantiate the configured sinks.
    pub fn build_sinks(&self) -> Result<Vec<Arc<dyn PreservationSink>>, SinkError> {
        let mut sinks: Vec<Arc<dyn PreservationSink>> = Vec::new();
        if let Some(path) = &self.jsonl_path {
            sinks.push(Arc::new(JsonlSink::new(path.clone())));
        }
        for webhook in self.webhooks.iter().filter(|w| w.enabled) {
            sinks.push(Arc::new(WebhookSink::new(webhook.clone())?));
        }
        Ok(sinks)
    }
}
