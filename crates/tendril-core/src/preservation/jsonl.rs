//! JSON Lines preservation sink.
//!
//! Appends one JSON object per line, so the archive can be tailed, grepped or
//! piped through `jq` while the engine is running.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::sink::{PreservationRecord, PreservationSink, SinkError};

/// Appends records to a JSON Lines file, creating it if needed.
pub struct JsonlSink {
    path: PathBuf,
    // Serializes appends from concurrent deliveries
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the archive path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PreservationSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn preserve(&self, record: &PreservationRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(
            path = %self.path.display(),
            query_event_id = %record.query_event_id,
            "Preserved convergence"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::ConvergencePriority;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(priority: ConvergencePriority) -> PreservationRecord {
        PreservationRecord {
            record_type: "convergence".to_string(),
            query_event_id: Uuid::new_v4(),
            matches: Vec::new(),
            priority,
            aggregate_strength: 0.8,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive").join("sacred.jsonl");
        let sink = JsonlSink::new(&path);

        let first = record(ConvergencePriority::High);
        let second = record(ConvergencePriority::Sacred);
        sink.preserve(&first).await.unwrap();
        sink.preserve(&second).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: PreservationRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.query_event_id, second.query_event_id);
        assert_eq!(parsed.priority, ConvergencePriority::Sacred);
    }

    #[tokio::test]
    async fn test_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let sink = JsonlSink::new(dir.path());
        assert!(sink.preserve(&record(ConvergencePriority::High)).await.is_err());
    }
}
