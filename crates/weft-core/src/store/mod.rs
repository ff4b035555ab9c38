//! Event store: the authoritative append path.
//!
//! The store owns the replica identity, the live [`LogicalClock`] and the
//! [`EventLog`]. Every event enters history through [`EventStore::append`],
//! which assigns the causal stamp:
//!
//! - an unstamped event gets the next tick of the local clock,
//! - an already-stamped event (arriving from sync or durable replay) keeps
//!   its stamp; if that stamp causally dominates the local clock, the local
//!   clock fast-forwards to it.
//!
//! The store never interprets events. Projections subscribe to the log and
//! derive state; see [`crate::aggregate`].

pub mod undo;

pub use undo::{LocalUndoStack, UndoHost, UndoStep, UndoableEventStore};

use tracing::debug;
use uuid::Uuid;

use crate::clock::LogicalClock;
use crate::event::{Entity, Event, Role, RouteKey};
use crate::log::{EventLog, SharedSubscriber, SubscriptionId};
use crate::replica::ReplicaContext;
use crate::telemetry::{default_sink, SharedTelemetry};

/// Append path plus clock ownership for one replica.
pub struct EventStore<E, R> {
    replica: ReplicaContext,
    clock: LogicalClock,
    log: EventLog<E, R>,
    /// Most recently appended event, if any.
    current: Option<Event<E, R>>,
    telemetry: SharedTelemetry,
}

impl<E: Entity, R: Role> EventStore<E, R> {
    #[must_use]
    pub fn new(replica: ReplicaContext) -> Self {
        Self::with_telemetry(replica, default_sink())
    }

    #[must_use]
    pub fn with_telemetry(replica: ReplicaContext, telemetry: SharedTelemetry) -> Self {
        Self {
            replica,
            clock: LogicalClock::new(),
            log: EventLog::new(),
            current: None,
            telemetry,
        }
    }

    #[must_use]
    pub const fn replica(&self) -> &ReplicaContext {
        &self.replica
    }

    /// The clock as of the last append.
    #[must_use]
    pub const fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    #[must_use]
    pub const fn current(&self) -> Option<&Event<E, R>> {
        self.current.as_ref()
    }

    /// Shared handle to the fault sink, for collaborators reporting into
    /// the same stream.
    #[must_use]
    pub fn telemetry(&self) -> SharedTelemetry {
        self.telemetry.clone()
    }

    // -- log pass-throughs ---------------------------------------------------

    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.log.contains(id)
    }

    #[must_use]
    pub fn events(&self) -> &[Event<E, R>] {
        self.log.events()
    }

    pub fn subscribe(&mut self, subscriber: SharedSubscriber<E, R>) -> SubscriptionId {
        self.log.subscribe(subscriber)
    }

    pub fn subscribe_keyed(
        &mut self,
        keys: impl IntoIterator<Item = RouteKey<R>>,
        subscriber: SharedSubscriber<E, R>,
    ) -> SubscriptionId {
        self.log.subscribe_keyed(keys, subscriber)
    }

    pub fn cancel(&mut self, subscription: SubscriptionId) {
        self.log.cancel(subscription);
    }

    // -- append --------------------------------------------------------------

    /// Stamp `event`, append it to the log, and fan it out to subscribers.
    /// Returns the stamped event; duplicate event ids (already in the log)
    /// are dropped and return `None`.
    pub fn append(&mut self, mut event: Event<E, R>) -> Option<Event<E, R>> {
        if self.log.contains(event.id()) {
            debug!(event = %event, "duplicate append dropped");
            return None;
        }
        match event.stamp() {
            Some(stamp) => {
                if stamp.happened_after(&self.clock) {
                    self.clock = stamp.clone();
                }
            }
            None => {
                self.clock = self.clock.next(self.replica.replica());
                event.meta_mut().stamp = Some(self.clock.clone());
            }
        }
        self.current = Some(event.clone());
        self.log.append(event);
        self.current.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
