//! Feed sources: where feed items come from.

use async_trait::async_trait;
use reqwest::Client;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::types::{FeedConfig, FeedError, FeedItem, FeedSourceConfig};

/// Something that can be polled for new feed items.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the items currently available. Sources may return items that
    /// were already returned before; the poller deduplicates by id.
    async fn fetch(&self) -> Result<Vec<FeedItem>, FeedError>;
}

/// Build the source described by a feed config.
pub fn build_source(config: &FeedConfig) -> Result<Arc<dyn FeedSource>, FeedError> {
    match &config.source {
        FeedSourceConfig::Http { url } => Ok(Arc::new(HttpJsonFeed::new(url, config.timeout())?)),
        FeedSourceConfig::File { path } => Ok(Arc::new(FileFeed::new(path))),
    }
}

/// Parse one JSON value into a feed item, logging and dropping malformed ones.
fn parse_item(value: serde_json::Value, origin: &str) -> Option<FeedItem> {
    match serde_json::from_value::<FeedItem>(value) {
        Ok(item) => Some(item),
        Err(e) => {
            tracing::warn!(origin, error = %e, "Skipping malformed feed item");
            None
        }
    }
}

/// GETs a JSON array of feed items.
pub struct HttpJsonFeed {
    client: Client,
    url: String,
}

impl HttpJsonFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Permanent(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedSource for HttpJsonFeed {
    async fn fetch(&self) -> Result<Vec<FeedItem>, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FeedError::Transient(format!("Network error: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FeedError::Transient(format!("Server error: {}", status)));
        }
        if !status.is_success() {
            return Err(FeedError::Permanent(format!("Client error: {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FeedError::Permanent(format!("Invalid JSON: {}", e)))?;
        let serde_json::Value::Array(values) = body else {
            return Err(FeedError::Permanent(
                "Expected a JSON array of items".to_string(),
            ));
        };

        Ok(values
            .into_iter()
            .filter_map(|v| parse_item(v, &self.url))
            .collect())
    }
}

/// Tails a JSON Lines file, returning only lines appended since the last fetch.
///
/// A partially written final line is left for the next fetch. If the file
/// shrinks (rotated or truncated) reading restarts from the beginning.
pub struct FileFeed {
    path: PathBuf,
    offset: Mutex<u64>,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: Mutex::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset the next fetch starts from.
    pub async fn offset(&self) -> u64 {
        *self.offset.lock().await
    }
}

#[async_trait]
impl FeedSource for FileFeed {
    async fn fetch(&self) -> Result<Vec<FeedItem>, FeedError> {
        let mut offset = self.offset.lock().await;

        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Feed file does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        if len < *offset {
            tracing::info!(path = %self.path.display(), "Feed file shrank, reading from start");
            *offset = 0;
        }

        file.seek(SeekFrom::Start(*offset)).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;

        // Only consume complete lines
        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &buf[..=last_newline];
        *offset += complete.len() as u64;

        let origin = self.path.display().to_string();
        let items = String::from_utf8_lossy(complete)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) => parse_item(value, &origin),
                Err(e) => {
                    tracing::warn!(origin = %origin, error = %e, "Skipping unparseable feed line");
                    None
                }
            })
            .collect();
        Ok(items)
    }
}
