//! End-to-end tests for the tendril engine facade.
//!
//! These drive the public API only: registration, matching, convergence,
//! the event bus and feed polling.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;

use tendril_core::feeds::{FeedPoller, FileFeed};
use tendril_core::{
    ConvergencePriority, EngineConfig, EngineEvent, ErrorCode, EventTopic, FeedConfig,
    FeedSourceConfig, HandlerError, MatchTier, NewProbe, ProbeFilter, ProbeStatus, QueryRequest,
    TendrilEngine, TendrilError,
};

fn engine() -> TendrilEngine {
    TendrilEngine::new(EngineConfig::default()).unwrap()
}

/// A charged research probe picks up a loosely related query as a subtle match.
#[test]
fn test_reference_scenario() {
    let engine = engine();
    let probe = engine
        .register_probe(
            NewProbe::new("find consciousness collaborators")
                .with_charge(0.9)
                .with_tags(["research"]),
        )
        .unwrap();

    let outcome = engine.submit_query(QueryRequest::new("looking for consciousness researchers"));

    assert_eq!(outcome.matches.len(), 1);
    let m = &outcome.matches[0];
    assert_eq!(m.probe_id, probe.id);
    assert_eq!(m.tier, MatchTier::Subtle);
    assert!(m.strength >= 0.4 && m.strength < 0.6);
    assert!((m.breakdown.charge_multiplier - 1.18).abs() < 1e-6);
    assert!(outcome.convergence.is_none());

    // Subtle matches never connect a probe
    let stored = engine.get_probe(probe.id).unwrap();
    assert_eq!(stored.status, ProbeStatus::Seeking);
}

/// Higher charge on the same text produces a higher strength and ranks first.
#[test]
fn test_charge_orders_matches() {
    let engine = engine();
    let low = engine
        .register_probe(NewProbe::new("find consciousness collaborators").with_charge(0.1))
        .unwrap();
    let high = engine
        .register_probe(NewProbe::new("find consciousness collaborators").with_charge(0.9))
        .unwrap();

    let outcome = engine.submit_query(QueryRequest::new("looking for consciousness researchers"));

    assert_eq!(outcome.matches.len(), 2);
    assert_eq!(outcome.matches[0].probe_id, high.id);
    assert_eq!(outcome.matches[1].probe_id, low.id);
    assert!(outcome.matches[0].strength > outcome.matches[1].strength);
    assert_eq!(outcome.peak_strength, outcome.matches[0].strength);
}

/// Archived probes are never scored and cannot be recharged.
#[test]
fn test_archived_probe_is_excluded() {
    let engine = engine();
    let probe = engine
        .register_probe(NewProbe::new("distributed consensus protocols"))
        .unwrap();
    assert!(engine.archive_probe(probe.id).unwrap());
    assert!(!engine.archive_probe(probe.id).unwrap());

    let outcome = engine.submit_query(QueryRequest::new("distributed consensus protocols"));
    assert!(outcome.matches.is_empty());
    assert_eq!(outcome.peak_strength, 0.0);

    let err = engine.update_charge(probe.id, 0.5).unwrap_err();
    assert!(err.is_validation());

    let active = engine.list_probes(&ProbeFilter::active()).unwrap();
    assert!(active.is_empty());
    assert_eq!(engine.list_probes(&ProbeFilter::default()).unwrap().len(), 1);
}

/// Validation failures name the offending field and carry stable codes.
#[test]
fn test_validation_errors() {
    let engine = engine();

    let err = engine
        .register_probe(NewProbe::new("anything").with_charge(1.5))
        .unwrap_err();
    assert!(matches!(err, TendrilError::InvalidCharge { .. }));
    assert_eq!(err.field(), Some("charge"));
    assert_eq!(err.code(), ErrorCode::ValInvalidCharge);
    assert_eq!(err.code().as_str(), "VAL_001");

    let err = engine.register_probe(NewProbe::new("   ")).unwrap_err();
    assert!(matches!(err, TendrilError::EmptyIntent { .. }));
    assert_eq!(err.field(), Some("text"));

    let err = engine.update_charge(uuid::Uuid::new_v4(), 0.5).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PrbNotFound);
    assert!(!err.is_validation());

    assert!(engine.list_probes(&ProbeFilter::default()).unwrap().is_empty());
}

/// Identical probes agreeing on a query form a sacred convergence that
/// shows up in stats, events and the network view.
#[test]
fn test_convergence_end_to_end() {
    let engine = engine();
    let ids: Vec<_> = ["event sourcing", "event sourcing", "event sourcing systems"]
        .into_iter()
        .map(|text| engine.register_probe(NewProbe::new(text)).unwrap().id)
        .collect();
    engine
        .register_probe(NewProbe::new("sourdough baking"))
        .unwrap();

    let outcome = engine.submit_query(QueryRequest::new("event sourcing"));
    let convergence = outcome.convergence.expect("expected convergence");
    assert_eq!(convergence.matches.len(), 3);
    assert_eq!(convergence.priority, ConvergencePriority::Sacred);
    // mean 0.97 plus a 0.2 participation bonus, clamped
    assert_eq!(convergence.aggregate_strength, 1.0);
    for id in &ids {
        assert!(convergence.probe_ids().contains(id));
    }

    let stats = engine.get_stats().unwrap();
    assert_eq!(stats.total_probes, 4);
    assert_eq!(stats.active_probes, 4);
    assert_eq!(stats.convergence_count, 1);
    assert!(stats.strong_matches >= 3);
    assert_eq!(stats.queries_retained, 1);

    let preserved = engine.get_recent_events(10, Some(EventTopic::PreservationRequested));
    assert_eq!(preserved.len(), 1);

    let view = engine.get_visualization().unwrap();
    assert_eq!(view.nodes.len(), 4);
    assert_eq!(view.edges.len(), 3);
}

/// A single strong match is not a convergence.
#[test]
fn test_single_strong_match_does_not_converge() {
    let engine = engine();
    let probe = engine
        .register_probe(NewProbe::new("vector clocks"))
        .unwrap();

    let outcome = engine.submit_query(QueryRequest::new("vector clocks"));
    assert_eq!(outcome.matches.len(), 1);
    assert!(outcome.convergence.is_none());

    // But a convergent-strength match connects the probe
    let stored = engine.get_probe(probe.id).unwrap();
    assert_eq!(stored.status, ProbeStatus::Connected);
    assert!(engine
        .get_recent_events(10, Some(EventTopic::ConvergenceDetected))
        .is_empty());
}

/// A failing or panicking subscriber does not stop the query or other handlers.
#[test]
fn test_subscriber_failures_are_isolated() {
    let engine = engine();
    let delivered = Arc::new(Mutex::new(Vec::new()));

    engine.subscribe(EventTopic::QueryProcessed, |_| {
        Err(HandlerError::new("downstream unavailable"))
    });
    engine.subscribe(EventTopic::QueryProcessed, |_| panic!("handler bug"));
    let sink = delivered.clone();
    engine.subscribe_all(move |event| {
        if let EngineEvent::QueryProcessed(e) = event {
            sink.lock().unwrap().push(e.query_event_id);
        }
        Ok(())
    });

    let outcome = engine.submit_query(QueryRequest::new("anything at all"));

    assert_eq!(*delivered.lock().unwrap(), vec![outcome.query_event_id]);
    assert_eq!(engine.bus().handler_failures(), 2);
}

/// Feed items written to a JSON Lines file are matched once each.
#[tokio::test]
async fn test_file_feed_submits_queries() {
    let engine = Arc::new(engine());
    engine
        .register_probe(NewProbe::new("kernel scheduling"))
        .unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"id":"a","title":"kernel scheduling","content":"deep dive"}}"#).unwrap();
    writeln!(file, r#"{{"id":"b","content":"gardening tips"}}"#).unwrap();
    file.flush().unwrap();

    let config = FeedConfig::new(
        "notes",
        FeedSourceConfig::File {
            path: file.path().to_path_buf(),
        },
    );
    let poller = FeedPoller::new(engine.correlation().clone()).await.unwrap();
    poller
        .add_source(config, Arc::new(FileFeed::new(file.path())))
        .await
        .unwrap();

    let report = tokio_test::assert_ok!(poller.poll_once("notes").await);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.submitted, 2);

    let processed = engine.get_recent_events(10, Some(EventTopic::QueryProcessed));
    assert_eq!(processed.len(), 2);

    // Nothing new appended, nothing resubmitted
    let report = poller.poll_once("notes").await.unwrap();
    assert_eq!(report.submitted, 0);
    assert_eq!(engine.get_stats().unwrap().queries_retained, 2);
}

/// Queries submitted from many threads are each recorded exactly once, and
/// the event history keeps a single total order.
#[test]
fn test_concurrent_queries_share_one_engine() {
    const THREADS: usize = 4;
    const QUERIES_PER_THREAD: usize = 25;
    const TOTAL: usize = THREADS * QUERIES_PER_THREAD;

    let engine = Arc::new(engine());
    let ids: Vec<_> = ["event sourcing", "event sourcing", "event sourcing systems"]
        .into_iter()
        .map(|text| engine.register_probe(NewProbe::new(text)).unwrap().id)
        .collect();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..QUERIES_PER_THREAD {
                    let outcome = engine.submit_query(QueryRequest::new("event sourcing"));
                    assert!(outcome.convergence.is_some());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = engine.get_stats().unwrap();
    assert_eq!(stats.queries_retained, TOTAL);
    assert_eq!(stats.convergence_count, TOTAL);

    // Every qualifying match was recorded against its registration
    for id in &ids {
        assert_eq!(engine.get_probe(*id).unwrap().match_count as usize, TOTAL);
    }

    let view = engine.get_visualization().unwrap();
    assert_eq!(view.edges.len(), 3);
    assert!(view.edges.iter().all(|e| e.count as usize == TOTAL));

    // 3 registrations, then processed + convergence + preservation per query
    let recent = engine.get_recent_events(usize::MAX, None);
    assert_eq!(recent.len(), 3 + 3 * TOTAL);
    assert!(recent.windows(2).all(|w| w[0].sequence > w[1].sequence));
    assert_eq!(
        engine
            .get_recent_events(usize::MAX, Some(EventTopic::ConvergenceDetected))
            .len(),
        TOTAL
    );
}
