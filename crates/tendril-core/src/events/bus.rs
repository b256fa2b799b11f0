//! In-process event bus.
//!
//! Handlers subscribed to a topic are invoked synchronously, once, in
//! registration order. A handler that fails or panics is isolated and logged;
//! the remaining handlers still run. Every published event is appended to a
//! bounded history ring (oldest evicted first) and forwarded to a tokio
//! broadcast channel for async consumers that need to defer slow work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::events::{EngineEvent, EventTopic};

/// Failure reported by a subscriber.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Synchronous subscriber callback.
pub type EventHandler = Arc<dyn Fn(&EngineEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Events retained in the history ring. Default: 1000
    pub history_capacity: usize,
    /// Capacity of the async broadcast channel. Default: 1024
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            channel_capacity: 1024,
        }
    }
}

/// An event as retained in the history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Monotonic publish sequence number
    pub sequence: u64,
    pub topic: EventTopic,
    pub recorded_at: DateTime<Utc>,
    pub event: EngineEvent,
}

/// Outcome of a publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers that returned `Ok`
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked
    pub failed: usize,
}

struct Subscriber {
    id: SubscriptionId,
    topic: Option<EventTopic>,
    handler: EventHandler,
}

struct History {
    entries: VecDeque<RecordedEvent>,
    next_sequence: u64,
}

/// Event bus for engine events.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    history: Mutex<History>,
    capacity: usize,
    sender: broadcast::Sender<EngineEvent>,
    next_subscription: AtomicU64,
    handler_failures: AtomicU64,
}

impl EventBus {
    /// Create a new event bus with default capacities
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom capacities
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: Mutex::new(History {
                entries: VecDeque::with_capacity(config.history_capacity.min(4096)),
                next_sequence: 0,
            }),
            capacity: config.history_capacity,
            sender,
            next_subscription: AtomicU64::new(1),
            handler_failures: AtomicU64::new(0),
        }
    }

    /// Subscribe a handler to one topic.
    pub fn subscribe<F>(&self, topic: EventTopic, handler: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.add_subscriber(Some(topic), Arc::new(handler))
    }

    /// Subscribe a handler to every topic.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.add_subscriber(None, Arc::new(handler))
    }

    fn add_subscriber(&self, topic: Option<EventTopic>, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.push(Subscriber { id, topic, handler });
        tracing::debug!(subscription = id.0, topic = ?topic, "Subscriber added");
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Publish an event.
    ///
    /// Appends to history, invokes matching handlers in registration order,
    /// then forwards to async streams. Never fails.
    pub fn publish(&self, event: EngineEvent) -> PublishReport {
        let topic = event.topic();
        self.record(topic, &event);

        // Handlers run without holding the subscriber lock so they may
        // subscribe, unsubscribe or read history themselves.
        let handlers: Vec<(SubscriptionId, EventHandler)> = {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            subscribers
                .iter()
                .filter(|s| s.topic.map_or(true, |t| t == topic))
                .map(|s| (s.id, s.handler.clone()))
                .collect()
        };

        let mut report = PublishReport::default();
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    tracing::warn!(subscription = id.0, topic = %topic, error = %err, "Event handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(subscription = id.0, topic = %topic, "Event handler panicked");
                }
            }
        }
        if report.failed > 0 {
            self.handler_failures
                .fetch_add(report.failed as u64, Ordering::Relaxed);
        }

        // Fire and forget: no async subscribers is not an error
        let _ = self.sender.send(event);
        report
    }

    fn record(&self, topic: EventTopic, event: &EngineEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sequence = history.next_sequence;
        history.next_sequence += 1;
        history.entries.push_back(RecordedEvent {
            sequence,
            topic,
            recorded_at: Utc::now(),
            event: event.clone(),
        });
        while history.entries.len() > self.capacity {
            history.entries.pop_front();
        }
    }

    /// Most recent events, newest first, optionally restricted to a topic.
    pub fn recent(&self, count: usize, topic: Option<EventTopic>) -> Vec<RecordedEvent> {
        let history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history
            .entries
            .iter()
            .rev()
            .filter(|e| topic.map_or(true, |t| e.topic == t))
            .take(count)
            .cloned()
            .collect()
    }

    /// Number of events currently retained.
    pub fn history_len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .len()
    }

    /// History ring capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of synchronous subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Total handler failures since creation.
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Subscribe to an async stream of all events published from now on.
    ///
    /// If the receiver falls behind, it will miss events (lagged).
    pub fn stream(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Async subscriber to the event bus
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EngineEvent>,
}

impl EventSubscriber {
    /// Receive the next event
    ///
    /// Returns None if the bus was dropped.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event subscriber lagged by {} events", n);
                    continue;
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.receiver.try_recv().ok()
    }
}
