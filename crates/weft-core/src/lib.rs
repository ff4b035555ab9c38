//! Local-first event-sourcing kernel.
//!
//! State is an append-only log of immutable events; everything the
//! application reads is a projection rebuilt by replaying that log. The
//! kernel provides the causal [`clock::LogicalClock`], the [`event`] data
//! model, the fan-out [`log::EventLog`], the stamping
//! [`store::EventStore`] with grouped undo, and the [`aggregate`]
//! projections, plus traits for the durable-storage and sync collaborators
//! it deliberately does not implement.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod log;
pub mod persist;
pub mod replica;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use aggregate::{IndexedAggregator, ListAggregator, ObjectAggregator};
pub use clock::LogicalClock;
pub use error::{CodecError, FaultKind};
pub use event::{
    Entity, Event, EventKind, EventMeta, FieldRegistry, FieldSetEvent, Lifecycle, ListAction,
    ListChangeEvent, Role, RouteKey, UndoMode,
};
pub use log::{EventLog, SharedSubscriber, Subscriber, SubscriberCtx, SubscriptionId};
pub use persist::{FileLogStore, LogStore, PersistError};
pub use replica::ReplicaContext;
pub use store::{EventStore, LocalUndoStack, UndoHost, UndoStep, UndoableEventStore};
pub use sync::{pull_into_store, push_store, SyncError, SyncTransport};
pub use telemetry::{CollectingTelemetry, SharedTelemetry, TelemetrySink, TracingTelemetry};
