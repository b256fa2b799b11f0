//! Background delivery of preservation requests to sinks.

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::sink::{PreservationRecord, PreservationSink};
use crate::events::{EngineEvent, EventBus};

/// Fans `PreservationRequested` events out to every registered sink.
///
/// Delivery happens on a spawned task reading the bus stream, so publishing
/// never waits on a sink. Failures are logged and dropped.
pub struct PreservationDispatcher {
    sinks: Arc<RwLock<Vec<Arc<dyn PreservationSink>>>>,
    bus: Arc<EventBus>,
}

impl PreservationDispatcher {
    /// Create a dispatcher with no sinks
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            sinks: Arc::new(RwLock::new(Vec::new())),
            bus,
        }
    }

    /// Add a sink
    pub async fn add_sink(&self, sink: Arc<dyn PreservationSink>) {
        let mut sinks = self.sinks.write().await;
        tracing::info!(sink = sink.name(), "Preservation sink added");
        sinks.push(sink);
    }

    /// Remove a sink by name. Returns false if none matched.
    pub async fn remove_sink(&self, name: &str) -> bool {
        let mut sinks = self.sinks.write().await;
        let before = sinks.len();
        sinks.retain(|s| s.name() != name);
        sinks.len() != before
    }

    /// Names of the registered sinks
    pub async fn sink_names(&self) -> Vec<String> {
        let sinks = self.sinks.read().await;
        sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Deliver one record to all sinks in parallel. Returns the number of
    /// sinks that accepted it.
    pub async fn dispatch(&self, record: &PreservationRecord) -> usize {
        let sinks = self.sinks.read().await.clone();
        deliver_all(&sinks, record).await
    }

    /// Start the delivery background task
    ///
    /// Returns a handle that can be used to stop delivery
    pub fn start(&self) -> JoinHandle<()> {
        let sinks = self.sinks.clone();
        let mut subscriber = self.bus.stream();

        tokio::spawn(async move {
            while let Some(event) = subscriber.recv().await {
                let EngineEvent::PreservationRequested(request) = event else {
                    continue;
                };
                let sinks = sinks.read().await.clone();
                deliver_all(&sinks, &request.record).await;
            }
            tracing::debug!("Preservation dispatcher stopped: event bus closed");
        })
    }
}

async fn deliver_all(sinks: &[Arc<dyn PreservationSink>], record: &PreservationRecord) -> usize {
    let futures: Vec<_> = sinks
        .iter()
        .map(|sink| async move {
            match sink.preserve(record).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        sink = sink.name(),
                        query_event_id = %record.query_event_id,
                        error = %e,
                        "Preservation delivery failed"
                    );
                    false
                }
            }
        })
        .collect();

    futures::future::join_all(futures)
        .await
        .into_iter()
        .filter(|ok| *ok)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::ConvergencePriority;
    use crate::events::PreservationRequestedEvent;
    use crate::preservation::SinkError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct ChannelSink {
        tx: mpsc::UnboundedSender<PreservationRecord>,
    }

    #[async_trait]
    impl PreservationSink for ChannelSink {
        fn name(&self) -> &str {
            "channel"
        }

        async fn preserve(&self, record: &PreservationRecord) -> Result<(), SinkError> {
            self.tx
                .send(record.clone())
                .map_err(|e| SinkError::Permanent(e.to_string()))
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl PreservationSink for BrokenSink {
        fn name(&self) -> &str {
            "broken"
        }

        async fn preserve(&self, _record: &PreservationRecord) -> Result<(), SinkError> {
            Err(SinkError::Permanent("always fails".to_string()))
        }
    }

    fn record() -> PreservationRecord {
        PreservationRecord {
            record_type: "convergence".to_string(),
            query_event_id: Uuid::new_v4(),
            matches: Vec::new(),
            priority: ConvergencePriority::Sacred,
            aggregate_strength: 0.95,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_isolates_failing_sink() {
        let bus = Arc::new(EventBus::new());
        let dispatcher = PreservationDispatcher::new(bus);
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.add_sink(Arc::new(BrokenSink)).await;
        dispatcher.add_sink(Arc::new(ChannelSink { tx })).await;

        let r = record();
        assert_eq!(dispatcher.dispatch(&r).await, 1);
        assert_eq!(rx.recv().await.unwrap().query_event_id, r.query_event_id);
    }

    #[tokio::test]
    async fn test_background_task_delivers_published_requests() {
        let bus = Arc::new(EventBus::new());
        let dispatcher = PreservationDispatcher::new(bus.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.add_sink(Arc::new(ChannelSink { tx })).await;
        let handle = dispatcher.start();

        let r = record();
        bus.publish(EngineEvent::PreservationRequested(
            PreservationRequestedEvent::new(r.clone()),
        ));

        let delivered = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered, r);
        handle.abort();
    }

    #[tokio::test]
    async fn test_remove_sink() {
        let dispatcher = PreservationDispatcher::new(Arc::new(EventBus::new()));
        dispatcher.add_sink(Arc::new(BrokenSink)).await;
        assert_eq!(dispatcher.sink_names().await, vec!["broken".to_string()]);
        assert!(dispatcher.remove_sink("broken").await);
        assert!(!dispatcher.remove_sink("broken").await);
        assert_eq!(dispatcher.dispatch(&record()).await, 0);
    }
}
