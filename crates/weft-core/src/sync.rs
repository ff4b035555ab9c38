//! Replica-to-replica synchronization.
//!
//! The kernel does no network I/O. A [`SyncTransport`] moves events to and
//! from a shared backend, namespaced by project; pushing the same event
//! twice must be harmless, so replicas can retry freely. Pulled events flow
//! into the local store through [`pull_into_store`], which dedups by event
//! id and relies on the store's stamping rules to fast-forward the clock
//! past foreign history.

use tracing::debug;
use uuid::Uuid;

use crate::error::FaultKind;
use crate::event::{Entity, Event, Lifecycle, Role};
use crate::store::{UndoHost, UndoableEventStore};

/// Failure talking to the sync backend.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The backend rejected or dropped the request.
    #[error("sync transport failure: {0}")]
    Transport(String),
    #[error(transparent)]
    Codec(#[from] crate::error::CodecError),
}

/// Transport to a shared event backend.
///
/// Push must be idempotent per event id: re-pushing an event the backend
/// already holds is a successful no-op.
pub trait SyncTransport<E, R> {
    /// Make sure the backend has a namespace for `project`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the backend is unreachable or refuses.
    fn ensure_namespace(&mut self, project: Uuid) -> Result<(), SyncError>;

    /// Upload events into the project's namespace.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on backend failure; the caller may retry the
    /// same batch.
    fn push(&mut self, project: Uuid, events: &[Event<E, R>]) -> Result<(), SyncError>;

    /// Download every event in the project's namespace.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on backend failure.
    fn pull(&mut self, project: Uuid) -> Result<Vec<Event<E, R>>, SyncError>;
}

/// Push the store's full history for `project` to the backend.
///
/// # Errors
///
/// Returns [`SyncError`] when the transport fails.
pub fn push_store<E: Entity, R: Role, H: UndoHost<E, R>>(
    store: &UndoableEventStore<E, R, H>,
    transport: &mut impl SyncTransport<E, R>,
    project: Uuid,
) -> Result<usize, SyncError> {
    transport.ensure_namespace(project)?;
    let events: Vec<Event<E, R>> = store
        .events()
        .iter()
        .filter(|e| e.project() == project)
        .cloned()
        .collect();
    transport.push(project, &events)?;
    Ok(events.len())
}

/// Pull the project's events and merge the ones not yet in the local log.
///
/// Pulled events replay without undo registration and are marked
/// [`Lifecycle::Persisted`]; events the log already holds, and events that
/// arrive without a stamp, are skipped (the latter with a reported fault).
/// Returns the number of events applied.
///
/// # Errors
///
/// Returns [`SyncError`] when the transport fails.
pub fn pull_into_store<E: Entity, R: Role, H: UndoHost<E, R>>(
    store: &mut UndoableEventStore<E, R, H>,
    transport: &mut impl SyncTransport<E, R>,
    project: Uuid,
) -> Result<usize, SyncError> {
    transport.ensure_namespace(project)?;
    let mut applied = 0;
    for mut event in transport.pull(project)? {
        if store.contains(event.id()) {
            continue;
        }
        if event.stamp().is_none() {
            store.store().telemetry().report(
                FaultKind::MissingStamp,
                "pulled event has no stamp",
                &event.id().to_string(),
            );
            continue;
        }
        event.meta_mut().lifecycle = Lifecycle::Persisted;
        store.replay(event);
        applied += 1;
    }
    debug!(%project, applied, "pull merged");
    Ok(applied)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
