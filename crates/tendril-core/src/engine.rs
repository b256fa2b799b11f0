//! The engine facade wiring registry, scoring, correlation, events and the
//! network view together.

use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::convergence::ConvergenceDetector;
use crate::correlation::{CorrelationEngine, QueryEvent, QueryOutcome, QueryRequest};
use crate::error::{TendrilError, TendrilResult};
use crate::events::{
    EngineEvent, EventBus, EventSubscriber, EventTopic, HandlerError, RecordedEvent,
    SubscriptionId,
};
use crate::feeds::FeedPoller;
use crate::network::{NetworkSnapshot, NetworkTracker};
use crate::preservation::PreservationDispatcher;
use crate::probe::{NewProbe, Probe, ProbeFilter, ProbeRegistry, RegistryStats, RestoreReport};
use crate::scoring::SimilarityScorer;

/// Main engine struct - the entry point of tendril.
///
/// All operations are synchronous and safe to call from many threads; share
/// the engine through an `Arc`. Background work (feeds and preservation) is
/// started separately with [`TendrilEngine::start_services`].
pub struct TendrilEngine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    registry: Arc<ProbeRegistry>,
    correlation: Arc<CorrelationEngine>,
    network: Arc<NetworkTracker>,
}

impl TendrilEngine {
    /// Create an engine from a validated configuration.
    pub fn new(config: EngineConfig) -> TendrilResult<Self> {
        config.validate()?;

        let bus = Arc::new(EventBus::with_config(config.events.clone()));
        let registry = Arc::new(ProbeRegistry::new(config.registry.clone(), bus.clone()));
        let scorer = SimilarityScorer::new(config.scoring.clone(), config.tiers.clone());
        let detector = ConvergenceDetector::new(config.convergence.clone(), bus.clone());
        let correlation = Arc::new(CorrelationEngine::new(
            registry.clone(),
            scorer,
            detector,
            bus.clone(),
            config.correlation.clone(),
        ));

        let network = Arc::new(NetworkTracker::new());
        let tracker = network.clone();
        bus.subscribe(EventTopic::ConvergenceDetected, move |event| match event {
            EngineEvent::ConvergenceDetected(e) => {
                tracker.record_convergence(&e.convergence);
                Ok(())
            }
            other => Err(HandlerError::new(format!(
                "network view received {}",
                other.topic()
            ))),
        });

        tracing::debug!("Tendril engine initialized");
        Ok(Self {
            config,
            bus,
            registry,
            correlation,
            network,
        })
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Get the probe registry.
    pub fn registry(&self) -> &Arc<ProbeRegistry> {
        &self.registry
    }

    /// Get the correlation engine.
    pub fn correlation(&self) -> &Arc<CorrelationEngine> {
        &self.correlation
    }

    /// Register a probe.
    pub fn register_probe(&self, probe: NewProbe) -> TendrilResult<Probe> {
        self.registry.register(probe)
    }

    /// Match a text against every active probe. Never fails.
    pub fn submit_query(&self, request: QueryRequest) -> QueryOutcome {
        self.correlation.process(&request.into_event())
    }

    /// Match an already stamped query event.
    pub fn submit_event(&self, event: &QueryEvent) -> QueryOutcome {
        self.correlation.process(event)
    }

    /// Get a probe by id.
    pub fn get_probe(&self, id: Uuid) -> TendrilResult<Probe> {
        self.registry.get(id)
    }

    /// List probes in creation order.
    pub fn list_probes(&self, filter: &ProbeFilter) -> TendrilResult<Vec<Probe>> {
        self.registry.list(filter)
    }

    /// Archive a probe. Returns false if it was already archived.
    pub fn archive_probe(&self, id: Uuid) -> TendrilResult<bool> {
        self.registry.archive(id)
    }

    /// Change a probe's charge.
    pub fn update_charge(&self, id: Uuid, charge: f32) -> TendrilResult<Probe> {
        self.registry.update_charge(id, charge)
    }

    /// Aggregate statistics over the retained query history.
    pub fn get_stats(&self) -> TendrilResult<RegistryStats> {
        self.registry.stats()
    }

    /// Active probes and the convergence links between them.
    pub fn get_visualization(&self) -> TendrilResult<NetworkSnapshot> {
        let probes = self.registry.snapshot()?;
        Ok(self.network.snapshot(&probes))
    }

    /// Subscribe a handler to one topic.
    pub fn subscribe<F>(&self, topic: EventTopic, handler: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.bus.subscribe(topic, handler)
    }

    /// Subscribe a handler to every topic.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.bus.subscribe_all(handler)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Most recent events, newest first.
    pub fn get_recent_events(&self, count: usize, topic: Option<EventTopic>) -> Vec<RecordedEvent> {
        self.bus.recent(count, topic)
    }

    /// Async stream of events published from now on.
    pub fn event_stream(&self) -> EventSubscriber {
        self.bus.stream()
    }

    /// Export every probe for backup.
    pub fn export_probes(&self) -> TendrilResult<Vec<Probe>> {
        self.registry.snapshot()
    }

    /// Import probes from a backup, skipping invalid or duplicate records.
    pub fn import_probes(&self, probes: Vec<Probe>) -> TendrilResult<RestoreReport> {
        self.registry.restore(probes)
    }

    /// Start preservation delivery and feed polling as configured.
    pub async fn start_services(&self) -> TendrilResult<EngineServices> {
        let dispatcher = PreservationDispatcher::new(self.bus.clone());
        let sinks = self
            .config
            .preservation
            .build_sinks()
            .map_err(|e| e.into_tendril("preservation"))?;
        for sink in sinks {
            dispatcher.add_sink(sink).await;
        }
        let dispatcher_task = dispatcher.start();

        let poller = FeedPoller::new(self.correlation.clone()).await?;
        for feed in &self.config.feeds {
            poller.add_feed(feed.clone()).await?;
        }
        poller.start().await?;

        let sink_count = dispatcher.sink_names().await.len();
        tracing::info!(
            sinks = sink_count,
            feeds = self.config.feeds.len(),
            "Engine services started"
        );
        Ok(EngineServices {
            dispatcher,
            dispatcher_task,
            poller,
        })
    }
}

/// Background services owned by a running engine.
pub struct EngineServices {
    dispatcher: PreservationDispatcher,
    dispatcher_task: JoinHandle<()>,
    poller: FeedPoller,
}

impl EngineServices {
    /// Get the preservation dispatcher.
    pub fn dispatcher(&self) -> &PreservationDispatcher {
        &self.dispatcher
    }

    /// Get the feed poller.
    pub fn poller(&self) -> &FeedPoller {
        &self.poller
    }

    /// Stop feed polling and preservation delivery.
    pub async fn shutdown(mut self) -> TendrilResult<()> {
        self.poller.shutdown().await?;
        self.dispatcher_task.abort();
        match self.dispatcher_task.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(TendrilError::internal(format!(
                "Preservation task failed: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::ConvergencePriority;
    use crate::preservation::{PreservationConfig, PreservationRecord};
    use std::time::Duration;

    fn engine() -> TendrilEngine {
        TendrilEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.tiers.strong = 0.9;
        assert!(TendrilEngine::new(config).is_err());
    }

    #[test]
    fn test_convergence_feeds_network_view() {
        let engine = engine();
        let a = engine
            .register_probe(NewProbe::new("stream processing"))
            .unwrap();
        let b = engine
            .register_probe(NewProbe::new("stream processing engines"))
            .unwrap();
        engine
            .register_probe(NewProbe::new("knitting patterns"))
            .unwrap();

        let outcome = engine.submit_query(QueryRequest::new("stream processing"));
        assert!(outcome.convergence.is_some());

        let view = engine.get_visualization().unwrap();
        assert_eq!(view.nodes.len(), 3);
        assert_eq!(view.edges.len(), 1);
        let edge = &view.edges[0];
        assert!([a.id, b.id].contains(&edge.from));
        assert!([a.id, b.id].contains(&edge.to));
        assert!((view.density - 1.0 / 3.0).abs() < 1e-6);

        engine.archive_probe(a.id).unwrap();
        let view = engine.get_visualization().unwrap();
        assert_eq!(view.nodes.len(), 2);
        assert!(view.edges.is_empty());
    }

    #[test]
    fn test_subscribe_and_recent_events() {
        let engine = engine();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = engine.subscribe(EventTopic::ProbeRegistered, move |event| {
            sink.lock().unwrap().push(event.event_id());
            Ok(())
        });

        engine.register_probe(NewProbe::new("first")).unwrap();
        assert!(engine.unsubscribe(id));
        engine.register_probe(NewProbe::new("second")).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        let recent = engine.get_recent_events(10, Some(EventTopic::ProbeRegistered));
        assert_eq!(recent.len(), 2);
        assert!(recent[0].sequence > recent[1].sequence);
    }

    #[test]
    fn test_export_import_round_trip() {
        let source = engine();
        source.register_probe(NewProbe::new("one")).unwrap();
        source.register_probe(NewProbe::new("two")).unwrap();
        let exported = source.export_probes().unwrap();

        let target = engine();
        let report = target.import_probes(exported.clone()).unwrap();
        assert_eq!(report.restored, 2);
        assert_eq!(target.list_probes(&ProbeFilter::default()).unwrap(), exported);
    }

    #[tokio::test]
    async fn test_services_preserve_sacred_convergences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preserved.jsonl");
        let config = EngineConfig::builder()
            .preservation(PreservationConfig {
                jsonl_path: Some(path.clone()),
                webhooks: Vec::new(),
            })
            .build();
        let engine = TendrilEngine::new(config).unwrap();
        let services = engine.start_services().await.unwrap();
        assert_eq!(services.dispatcher().sink_names().await, vec!["jsonl"]);

        for text in ["stream processing", "stream processing", "stream processing!"] {
            engine.register_probe(NewProbe::new(text)).unwrap();
        }
        let outcome = engine.submit_query(QueryRequest::new("stream processing"));
        let convergence = outcome.convergence.unwrap();
        assert_eq!(convergence.priority, ConvergencePriority::Sacred);

        let mut preserved = None;
        for _ in 0..50 {
            if let Ok(contents) = tokio::fs::read_to_string(&path).await {
                if let Some(line) = contents.lines().next().filter(|_| contents.ends_with('\n')) {
                    preserved = Some(serde_json::from_str::<PreservationRecord>(line).unwrap());
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let preserved = preserved.expect("record was not preserved");
        assert_eq!(preserved.query_event_id, outcome.query_event_id);
        assert_eq!(preserved.matches.len(), 3);

        services.shutdown().await.unwrap();
    }
}
