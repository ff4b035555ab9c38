//! Undoable append path.
//!
//! [`UndoableEventStore`] wraps an [`EventStore`] and records every user
//! change with an [`UndoHost`] so it can later be reversed. Undo never
//! deletes history: undoing a change appends its semantic inverse, so the
//! log stays append-only and replicas that already synced the original stay
//! consistent.
//!
//! Changes group into *steps*. Outside a batch every append is its own step;
//! inside, all appends between the outermost `begin_batch` and its matching
//! `end_batch` collapse into one step, however deeply batches nest. Each
//! `undo()`/`redo()` replays one whole step and registers the replayed
//! inverse as a single step on the opposite stack, so a multi-event undo is
//! itself re-undoable as a unit.

use tracing::warn;
use uuid::Uuid;

use crate::event::{Entity, Event, Role, RouteKey, UndoMode};
use crate::log::{SharedSubscriber, SubscriptionId};
use crate::replica::ReplicaContext;
use crate::store::EventStore;
use crate::error::FaultKind;

// ---------------------------------------------------------------------------
// Undo host
// ---------------------------------------------------------------------------

/// One undoable unit: the events of a single change or a collapsed batch,
/// in append order.
#[derive(Debug, Clone)]
pub struct UndoStep<E, R> {
    pub events: Vec<Event<E, R>>,
}

/// Where undo state lives. The store drives it; the host only holds the
/// stacks. An application embedding the kernel in a platform undo system
/// implements this against that system; [`LocalUndoStack`] is the
/// self-contained default.
pub trait UndoHost<E, R> {
    fn register_undo(&mut self, step: UndoStep<E, R>);
    fn register_redo(&mut self, step: UndoStep<E, R>);
    fn pop_undo(&mut self) -> Option<UndoStep<E, R>>;
    fn pop_redo(&mut self) -> Option<UndoStep<E, R>>;
    /// A fresh user change invalidates the redo future.
    fn clear_redo(&mut self);
    /// Called around a collapsed batch registration; hosts mapping onto a
    /// platform undo manager can open/close native groups here.
    fn begin_group(&mut self) {}
    fn end_group(&mut self) {}
}

/// In-memory undo/redo stacks.
#[derive(Debug)]
pub struct LocalUndoStack<E, R> {
    undo: Vec<UndoStep<E, R>>,
    redo: Vec<UndoStep<E, R>>,
}

impl<E, R> LocalUndoStack<E, R> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

impl<E, R> Default for LocalUndoStack<E, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, R> UndoHost<E, R> for LocalUndoStack<E, R> {
    fn register_undo(&mut self, step: UndoStep<E, R>) {
        self.undo.push(step);
    }

    fn register_redo(&mut self, step: UndoStep<E, R>) {
        self.redo.push(step);
    }

    fn pop_undo(&mut self) -> Option<UndoStep<E, R>> {
        self.undo.pop()
    }

    fn pop_redo(&mut self) -> Option<UndoStep<E, R>> {
        self.redo.pop()
    }

    fn clear_redo(&mut self) {
        self.redo.clear();
    }
}

// ---------------------------------------------------------------------------
// UndoableEventStore
// ---------------------------------------------------------------------------

/// Which stack a replayed step's inverse should land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    None,
    Undo,
    Redo,
}

/// An [`EventStore`] whose appends are undoable.
pub struct UndoableEventStore<E, R, H = LocalUndoStack<E, R>> {
    store: EventStore<E, R>,
    host: H,
    /// Open batch ids, outermost first.
    batches: Vec<Uuid>,
    /// Events appended while a batch is open, awaiting collapse.
    buffer: Vec<Event<E, R>>,
    replay: Replay,
}

impl<E: Entity, R: Role> UndoableEventStore<E, R> {
    #[must_use]
    pub fn new(replica: ReplicaContext) -> Self {
        Self::with_host(replica, LocalUndoStack::new())
    }
}

impl<E: Entity, R: Role, H: UndoHost<E, R>> UndoableEventStore<E, R, H> {
    #[must_use]
    pub fn with_host(replica: ReplicaContext, host: H) -> Self {
        Self::with_store(EventStore::new(replica), host)
    }

    /// Wrap an already-configured store, e.g. one carrying a custom
    /// telemetry sink.
    #[must_use]
    pub fn with_store(store: EventStore<E, R>, host: H) -> Self {
        Self {
            store,
            host,
            batches: Vec::new(),
            buffer: Vec::new(),
            replay: Replay::None,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &EventStore<E, R> {
        &self.store
    }

    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    // -- store pass-throughs -------------------------------------------------

    pub fn subscribe(&mut self, subscriber: SharedSubscriber<E, R>) -> SubscriptionId {
        self.store.subscribe(subscriber)
    }

    pub fn subscribe_keyed(
        &mut self,
        keys: impl IntoIterator<Item = RouteKey<R>>,
        subscriber: SharedSubscriber<E, R>,
    ) -> SubscriptionId {
        self.store.subscribe_keyed(keys, subscriber)
    }

    pub fn cancel(&mut self, subscription: SubscriptionId) {
        self.store.cancel(subscription);
    }

    #[must_use]
    pub fn events(&self) -> &[Event<E, R>] {
        self.store.events()
    }

    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.store.contains(id)
    }

    // -- appending -----------------------------------------------------------

    /// Append a user change. The event's mode is forced to
    /// [`UndoMode::Change`] and its inverse becomes undoable; any pending
    /// redo future is discarded.
    pub fn append(&mut self, mut event: Event<E, R>) {
        event.meta_mut().undo_mode = UndoMode::Change;
        self.host.clear_redo();
        self.append_recorded(event);
    }

    /// Append an event without touching undo state. Used for events arriving
    /// from durable replay or sync, which must not become undoable here.
    pub fn replay(&mut self, event: Event<E, R>) {
        self.store.append(event);
    }

    fn append_recorded(&mut self, event: Event<E, R>) {
        let Some(appended) = self.store.append(event) else {
            return;
        };
        if appended.stamp().is_none() {
            self.store.telemetry().report(
                FaultKind::MissingStamp,
                "appended event left unstamped",
                &appended.id().to_string(),
            );
            return;
        }
        if self.batches.is_empty() {
            self.register(UndoStep {
                events: vec![appended],
            });
        } else {
            self.buffer.push(appended);
        }
    }

    fn register(&mut self, step: UndoStep<E, R>) {
        match self.replay {
            Replay::None | Replay::Redo => self.host.register_undo(step),
            Replay::Undo => self.host.register_redo(step),
        }
    }

    // -- batching ------------------------------------------------------------

    /// Open a named batch. Nested batches collapse into the outermost one.
    pub fn begin_batch(&mut self, batch: Uuid) {
        if self.batches.is_empty() {
            self.host.begin_group();
        }
        self.batches.push(batch);
    }

    /// Close the batch named `batch`. When the outermost batch closes, all
    /// events appended inside register as one undo step.
    ///
    /// A close with no open batch, or naming a batch other than the
    /// innermost open one, is a reported fault and leaves all undo state
    /// untouched.
    pub fn end_batch(&mut self, batch: Uuid) {
        match self.batches.last() {
            None => {
                self.store.telemetry().report(
                    FaultKind::UnbalancedBatch,
                    "end_batch with no open batch",
                    &batch.to_string(),
                );
            }
            Some(top) if *top != batch => {
                self.store.telemetry().report(
                    FaultKind::BatchIdMismatch,
                    "end_batch does not match innermost open batch",
                    &format!("got {batch}, open {top}"),
                );
            }
            Some(_) => {
                self.batches.pop();
                if self.batches.is_empty() {
                    if !self.buffer.is_empty() {
                        let step = UndoStep {
                            events: std::mem::take(&mut self.buffer),
                        };
                        self.register(step);
                    }
                    self.host.end_group();
                }
            }
        }
    }

    // -- undo / redo ---------------------------------------------------------

    /// Reverse the most recent undo step by appending inverse events.
    /// Returns `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(step) = self.host.pop_undo() else {
            return false;
        };
        self.replay_step(step, Replay::Undo);
        true
    }

    /// Reapply the most recently undone step. Returns `false` when there is
    /// nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(step) = self.host.pop_redo() else {
            return false;
        };
        self.replay_step(step, Replay::Redo);
        true
    }

    fn replay_step(&mut self, step: UndoStep<E, R>, direction: Replay) {
        self.replay = direction;
        // Outer batch makes the replayed inverse one atomic step on the
        // opposite stack, regardless of how many events it holds.
        let wrapper = Uuid::new_v4();
        self.begin_batch(wrapper);
        for event in &step.events {
            let mut inverse = event.reverse();
            inverse.meta_mut().undo_mode = event.meta().undo_mode.inverted();
            self.append_recorded(inverse);
        }
        self.end_batch(wrapper);
        self.replay = Replay::None;
        warn_if_unbalanced(&self.batches);
    }
}

fn warn_if_unbalanced(batches: &[Uuid]) {
    if !batches.is_empty() {
        warn!(open = batches.len(), "undo replay finished with open batches");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
