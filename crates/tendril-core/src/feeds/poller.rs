//! Periodic feed polling.
//!
//! Uses tokio-cron-scheduler with one repeated job per feed. Every poll runs
//! its own timeout and bounded retry, so a slow feed only delays itself.

use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use super::source::{build_source, FeedSource};
use super::types::{FeedConfig, FeedError, FeedItem};
use crate::correlation::CorrelationEngine;
use crate::error::{TendrilError, TendrilResult};

/// Feed item ids remembered per feed for deduplication.
pub const SEEN_ID_CAPACITY: usize = 10_000;

/// What one poll did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    /// Items returned by the source
    pub fetched: usize,
    /// Items turned into query events
    pub submitted: usize,
    /// Items skipped because their id was already seen
    pub duplicates: usize,
    /// Items with neither content nor title
    pub malformed: usize,
    /// Items dropped because the feed was disabled mid-poll
    pub discarded: usize,
    /// The feed was disabled and not polled
    pub skipped: bool,
}

/// Bounded FIFO memory of seen item ids.
struct SeenIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Remember `id`. Returns false if it was already known.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

struct FeedState {
    config: FeedConfig,
    source: Arc<dyn FeedSource>,
    enabled: AtomicBool,
    seen: Mutex<SeenIds>,
}

impl FeedState {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn fetch_with_retry(&self) -> Result<Vec<FeedItem>, FeedError> {
        let timeout = self.config.timeout();
        let attempt = || async {
            match tokio::time::timeout(timeout, self.source.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(FeedError::Timeout(timeout)),
            }
        };

        attempt
            .retry(
                ConstantBuilder::default()
                    .with_delay(Duration::from_millis(self.config.retry.delay_ms))
                    .with_max_times(self.config.retry.max_retries),
            )
            .when(FeedError::is_transient)
            .notify(|err, dur| {
                tracing::warn!(
                    feed_id = %self.config.id,
                    retry_in = ?dur,
                    error = %err,
                    "Feed fetch failed, retrying"
                );
            })
            .await
    }

    async fn poll(&self, engine: &Arc<CorrelationEngine>) -> Result<PollReport, FeedError> {
        let mut report = PollReport::default();
        if !self.is_enabled() {
            report.skipped = true;
            return Ok(report);
        }

        let items = self.fetch_with_retry().await?;
        report.fetched = items.len();

        if !self.is_enabled() {
            report.discarded = items.len();
            tracing::debug!(feed_id = %self.config.id, discarded = items.len(), "Feed disabled during fetch");
            return Ok(report);
        }

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            let fresh = self
                .seen
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(&item.id);
            if !fresh {
                report.duplicates += 1;
                continue;
            }
            match item.to_query(&self.config) {
                Some(request) => events.push(request.into_event()),
                None => {
                    report.malformed += 1;
                    tracing::warn!(feed_id = %self.config.id, item_id = %item.id, "Feed item has no text");
                }
            }
        }

        // Scoring is CPU bound over the whole probe set; keep it off the
        // runtime workers that drive the other feeds' timers
        if !events.is_empty() {
            report.submitted = events.len();
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || {
                for event in &events {
                    engine.process(event);
                }
            })
            .await
            .map_err(|e| FeedError::Permanent(format!("Query task failed: {}", e)))?;
        }

        tracing::debug!(
            feed_id = %self.config.id,
            fetched = report.fetched,
            submitted = report.submitted,
            duplicates = report.duplicates,
            "Feed polled"
        );
        Ok(report)
    }
}

/// Schedules and runs feed polls, submitting new items to the correlation engine.
pub struct FeedPoller {
    scheduler: JobScheduler,
    engine: Arc<CorrelationEngine>,
    /// Map of feed id to state.
    feeds: RwLock<HashMap<String, Arc<FeedState>>>,
    /// Map of feed id to job UUID.
    job_map: RwLock<HashMap<String, Uuid>>,
    running: RwLock<bool>,
}

impl FeedPoller {
    /// Create a poller with no feeds.
    pub async fn new(engine: Arc<CorrelationEngine>) -> TendrilResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| TendrilError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            engine,
            feeds: RwLock::new(HashMap::new()),
            job_map: RwLock::new(HashMap::new()),
            running: RwLock::new(false),
        })
    }

    /// Start the scheduler.
    pub async fn start(&self) -> TendrilResult<()> {
        let mut running = self.running.write().await;
        if !*running {
            self.scheduler
                .start()
                .await
                .map_err(|e| TendrilError::internal(format!("Failed to start scheduler: {}", e)))?;
            *running = true;
        }
        Ok(())
    }

    /// Stop the scheduler.
    pub async fn shutdown(&mut self) -> TendrilResult<()> {
        let mut running = self.running.write().await;
        if *running {
            self.scheduler
                .shutdown()
                .await
                .map_err(|e| TendrilError::internal(format!("Failed to shutdown scheduler: {}", e)))?;
            *running = false;
        }
        Ok(())
    }

    /// Check if scheduler is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Add a feed, building its source from the config.
    pub async fn add_feed(&self, config: FeedConfig) -> TendrilResult<()> {
        config
            .validate()
            .map_err(|e| TendrilError::feed(&config.id, e))?;
        let source = build_source(&config).map_err(|e| e.into_tendril(&config.id))?;
        self.add_source(config, source).await
    }

    /// Add a feed with an explicit source.
    pub async fn add_source(&self, config: FeedConfig, source: Arc<dyn FeedSource>) -> TendrilResult<()> {
        config
            .validate()
            .map_err(|e| TendrilError::feed(&config.id, e))?;
        let feed_id = config.id.clone();
        // Held until the feed is recorded so concurrent adds of one id cannot both schedule
        let mut feeds = self.feeds.write().await;
        if feeds.contains_key(&feed_id) {
            return Err(TendrilError::feed(&feed_id, "feed already registered"));
        }

        let interval = config.interval();
        let state = Arc::new(FeedState {
            enabled: AtomicBool::new(config.enabled),
            config,
            source,
            seen: Mutex::new(SeenIds::new(SEEN_ID_CAPACITY)),
        });

        let job_state = state.clone();
        let engine = self.engine.clone();
        let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let state = job_state.clone();
            let engine = engine.clone();
            Box::pin(async move {
                if let Err(e) = state.poll(&engine).await {
                    tracing::error!(feed_id = %state.config.id, error = %e, "Feed poll failed");
                }
            })
        })
        .map_err(|e| TendrilError::internal(format!("Failed to create repeated job: {}", e)))?;

        let job_id = job.guid();
        self.scheduler
            .add(job)
            .await
            .map_err(|e| TendrilError::internal(format!("Failed to add job: {}", e)))?;

        feeds.insert(feed_id.clone(), state);
        self.job_map.write().await.insert(feed_id.clone(), job_id);
        tracing::info!(feed_id = %feed_id, interval_secs = interval.as_secs(), "Feed scheduled");
        Ok(())
    }

    /// Remove a feed and its job. Returns false if unknown.
    pub async fn remove_feed(&self, feed_id: &str) -> TendrilResult<bool> {
        let removed = self.feeds.write().await.remove(feed_id).is_some();
        if let Some(job_id) = self.job_map.write().await.remove(feed_id) {
            self.scheduler
                .remove(&job_id)
                .await
                .map_err(|e| TendrilError::internal(format!("Failed to remove job: {}", e)))?;
        }
        Ok(removed)
    }

    /// Resume polling a feed.
    pub async fn enable(&self, feed_id: &str) -> TendrilResult<()> {
        self.set_enabled(feed_id, true).await
    }

    /// Stop polling a feed. Items from an in-flight fetch are discarded.
    pub async fn disable(&self, feed_id: &str) -> TendrilResult<()> {
        self.set_enabled(feed_id, false).await
    }

    async fn set_enabled(&self, feed_id: &str, enabled: bool) -> TendrilResult<()> {
        let state = self.state(feed_id).await?;
        state.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(feed_id, enabled, "Feed toggled");
        Ok(())
    }

    /// Whether a feed is currently enabled.
    pub async fn is_enabled(&self, feed_id: &str) -> TendrilResult<bool> {
        Ok(self.state(feed_id).await?.is_enabled())
    }

    /// Poll a feed now, outside its schedule.
    pub async fn poll_once(&self, feed_id: &str) -> TendrilResult<PollReport> {
        let state = self.state(feed_id).await?;
        state
            .poll(&self.engine)
            .await
            .map_err(|e| e.into_tendril(feed_id))
    }

    /// Ids of all registered feeds, sorted.
    pub async fn feed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.feeds.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get the number of scheduled jobs.
    pub async fn job_count(&self) -> usize {
        self.job_map.read().await.len()
    }

    async fn state(&self, feed_id: &str) -> TendrilResult<Arc<FeedState>> {
        self.feeds
            .read()
            .await
            .get(feed_id)
            .cloned()
            .ok_or_else(|| TendrilError::feed(feed_id, "unknown feed"))
    }
}
