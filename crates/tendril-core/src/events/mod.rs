//! Event system for engine notifications
//!
//! This module provides:
//! - Event types for probe, query, convergence and preservation notifications
//! - Event bus with synchronous topic handlers, a bounded history ring, and
//!   an async stream for deferred consumers

mod bus;
mod event;

pub use bus::{
    EventBus, EventBusConfig, EventHandler, EventSubscriber, HandlerError, PublishReport,
    RecordedEvent, SubscriptionId,
};
pub use event::{
    ConvergenceDetectedEvent, EngineEvent, EventTopic, PreservationRequestedEvent,
    ProbeArchivedEvent, ProbeRegisteredEvent, QueryProcessedEvent,
};
