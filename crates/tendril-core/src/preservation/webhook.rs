//! Webhook preservation sink
//!
//! POSTs preservation records to an external endpoint with:
//! - HMAC-SHA256 payload signing for verification
//! - Exponential backoff retry on transient failures
//! - Priority filtering

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashSet;
use std::time::Duration;

use super::sink::{PreservationRecord, PreservationSink, SinkError};
use crate::convergence::ConvergencePriority;

/// Header carrying the `sha256=<hex>` payload signature.
pub const SIGNATURE_HEADER: &str = "X-Tendril-Signature";
/// Header carrying the convergence priority.
pub const PRIORITY_HEADER: &str = "X-Tendril-Priority";
/// Header carrying a unique delivery id.
pub const DELIVERY_HEADER: &str = "X-Tendril-Delivery";

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            multiplier: 2.0_f32,
        }
    }
}

/// Webhook endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Unique identifier for this webhook
    pub id: String,
    /// Webhook endpoint URL
    pub url: String,
    /// Secret for HMAC signing (optional but recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Priorities to deliver; empty means every preserved priority
    #[serde(default)]
    pub priorities: HashSet<ConvergencePriority>,
    /// Retry policy
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Whether this webhook is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

impl WebhookConfig {
    /// Create a new webhook config
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            secret: None,
            priorities: HashSet::new(),
            retry_policy: RetryPolicy::default(),
            timeout_secs: default_timeout(),
            enabled: true,
        }
    }

    /// Builder: set secret for signing
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Builder: deliver only the given priorities
    pub fn with_priorities(mut self, priorities: Vec<ConvergencePriority>) -> Self {
        self.priorities = priorities.into_iter().collect();
        self
    }

    /// Builder: set retry policy
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Check if this webhook should receive a record of the given priority
    pub fn should_receive(&self, priority: ConvergencePriority) -> bool {
        self.enabled && (self.priorities.is_empty() || self.priorities.contains(&priority))
    }
}

/// Preservation sink that POSTs records to a webhook.
#[derive(Clone)]
pub struct WebhookSink {
    client: Client,
    config: WebhookConfig,
    name: String,
}

impl WebhookSink {
    /// Create a new webhook sink
    pub fn new(config: WebhookConfig) -> Result<Self, SinkError> {
        if config.url.trim().is_empty() {
            return Err(SinkError::Config("webhook url must not be empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SinkError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            name: format!("webhook:{}", config.id),
            config,
        })
    }

    /// Get the webhook config
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    async fn post_once(&self, payload: &str, signature: &str, priority: &str) -> Result<(), SinkError> {
        let mut request = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header(PRIORITY_HEADER, priority)
            .header(DELIVERY_HEADER, uuid::Uuid::new_v4().to_string())
            .body(payload.to_string());
        if !signature.is_empty() {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Transient(format!("Network error: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            // 5xx: transient, should retry
            Err(SinkError::Transient(format!("Server error: {}", status)))
        } else {
            // 4xx: permanent, don't retry
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::Permanent(format!("Client error {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl PreservationSink for WebhookSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn preserve(&self, record: &PreservationRecord) -> Result<(), SinkError> {
        if !self.config.should_receive(record.priority) {
            return Ok(());
        }

        let payload = serde_json::to_string(record)?;
        let signature = match &self.config.secret {
            Some(secret) => sign_payload(&payload, secret)?,
            None => String::new(),
        };
        let priority = record.priority.to_string();

        let policy = &self.config.retry_policy;
        (|| self.post_once(&payload, &signature, &priority))
            .retry(
                ExponentialBuilder::default()
                    .with_max_times(policy.max_retries as usize)
                    .with_min_delay(Duration::from_millis(policy.initial_delay_ms))
                    .with_max_delay(Duration::from_millis(policy.max_delay_ms))
                    .with_factor(policy.multiplier),
            )
            .when(SinkError::is_transient)
            .notify(|err, dur| {
                tracing::warn!(
                    url = %self.config.url,
                    retry_in = ?dur,
                    error = %err,
                    "Webhook delivery failed, retrying"
                );
            })
            .await
    }
}

/// Sign payload with HMAC-SHA256, formatted as `sha256=<hex>`
pub fn sign_payload(payload: &str, secret: &str) -> Result<String, SinkError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| SinkError::Config(format!("Invalid signing key: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a webhook signature
///
/// Used by receivers to verify the payload was sent by a tendril engine
pub fn verify_signature(payload: &str, secret: &str, signature: &str) -> bool {
    match sign_payload(payload, secret) {
        Ok(expected) => constant_time_eq(expected.as_bytes(), signature.as_bytes()),
        Err(_) => false,
    }
}

/// Constant-time equality comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
