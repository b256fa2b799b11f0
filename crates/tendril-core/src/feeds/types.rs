//! Feed configuration, items and errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::correlation::{QueryRequest, TAGS_KEY};
use crate::error::TendrilError;

/// `source_type` stamped on queries that came from a feed.
pub const FEED_SOURCE_TYPE: &str = "feed";

/// One entry pulled from an external feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

impl FeedItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            content: None,
            url: None,
            published_at: None,
            source: None,
        }
    }

    /// Builder method to set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builder method to set the content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Text to match: the content, or the title when content is absent or blank.
    pub fn query_text(&self) -> Option<&str> {
        non_blank(&self.content).or_else(|| non_blank(&self.title))
    }

    /// Turn the item into a query submission, or `None` if it has no text.
    pub fn to_query(&self, feed: &FeedConfig) -> Option<QueryRequest> {
        let text = self.query_text()?;
        let mut metadata = HashMap::new();
        metadata.insert("feed_item_id".to_string(), serde_json::json!(self.id));
        if let Some(url) = &self.url {
            metadata.insert("url".to_string(), serde_json::json!(url));
        }
        if let Some(published_at) = &self.published_at {
            metadata.insert("published_at".to_string(), serde_json::json!(published_at));
        }
        if let Some(source) = &self.source {
            metadata.insert("source".to_string(), serde_json::json!(source));
        }
        if !feed.tags.is_empty() {
            metadata.insert(TAGS_KEY.to_string(), serde_json::json!(feed.tags));
        }

        Some(QueryRequest {
            text: text.to_string(),
            source_type: FEED_SOURCE_TYPE.to_string(),
            source_tag: feed.source_tag().to_string(),
            metadata,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|t| !t.trim().is_empty())
}

/// Where a feed reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedSourceConfig {
    /// GET a JSON array of items
    Http { url: String },
    /// Tail a JSON Lines file
    File { path: PathBuf },
}

/// Retry behaviour for a single poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedRetry {
    /// Retries after the first attempt. Default: 3
    pub max_retries: usize,
    /// Constant delay between attempts in milliseconds. Default: 1000
    pub delay_ms: u64,
}

impl Default for FeedRetry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1000,
        }
    }
}

/// One periodically polled feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub id: String,
    pub source: FeedSourceConfig,
    /// Seconds between polls. Default: 300
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Per-attempt timeout in seconds. Default: 30
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: FeedRetry,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// `source_tag` for submitted queries; defaults to the feed id
    #[serde(default)]
    pub source_tag: Option<String>,
    /// Tags attached to every submitted query
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_interval() -> u64 {
    300
}

fn default_timeout() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

impl FeedConfig {
    pub fn new(id: impl Into<String>, source: FeedSourceConfig) -> Self {
        Self {
            id: id.into(),
            source,
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
            retry: FeedRetry::default(),
            enabled: true,
            source_tag: None,
            tags: Vec::new(),
        }
    }

    /// Builder method to set the poll interval
    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Builder method to set the per-attempt timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Builder method to set the retry policy
    pub fn with_retry(mut self, max_retries: usize, delay_ms: u64) -> Self {
        self.retry = FeedRetry {
            max_retries,
            delay_ms,
        };
        self
    }

    /// Builder method to set the query tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn source_tag(&self) -> &str {
        self.source_tag.as_deref().unwrap_or(&self.id)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate configuration values are in valid ranges.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.id.trim().is_empty() {
            return Err("feed id must not be empty");
        }
        if self.interval_secs == 0 {
            return Err("feed interval_secs must be at least 1");
        }
        if self.timeout_secs == 0 {
            return Err("feed timeout_secs must be at least 1");
        }
        match &self.source {
            FeedSourceConfig::Http { url } if url.trim().is_empty() => {
                Err("feed url must not be empty")
            }
            FeedSourceConfig::File { path } if path.as_os_str().is_empty() => {
                Err("feed path must not be empty")
            }
            _ => Ok(()),
        }
    }
}

/// Error returned by a feed source.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// Network failure, 5xx or IO hiccup; worth retrying
    #[error("Transient error: {0}")]
    Transient(String),
    /// Attempt exceeded its timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// Unparseable payload or 4xx; retrying will not help
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl FeedError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::Transient(_) | FeedError::Timeout(_))
    }

    /// Lift into the crate error, naming the feed.
    pub fn into_tendril(self, feed_id: &str) -> TendrilError {
        TendrilError::feed(feed_id, self.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Transient(format!("IO error: {}", err))
    }
}
