//! Durable event storage.
//!
//! The log lives in memory; durability is a collaborator behind the
//! [`LogStore`] trait. [`FileLogStore`] is the bundled implementation: one
//! JSON-encoded event per line in an append-only file. Events are promoted
//! to [`Lifecycle::Cached`] as they are written, so a replayed history is
//! distinguishable from freshly authored changes.
//!
//! Restoring a store happens through the normal append path
//! ([`FileLogStore::replay_into`]), which re-stamps nothing: cached events
//! keep their stamps, the clock fast-forwards, and projections rebuild by
//! ordinary dispatch. A corrupt line is reported and skipped rather than
//! failing the whole restore.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{CodecError, FaultKind};
use crate::event::{Entity, Event, Lifecycle, Role};
use crate::store::{UndoHost, UndoableEventStore};
use crate::telemetry::{default_sink, SharedTelemetry};

/// Failure talking to durable storage.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("log store io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Durable sink and source for events.
pub trait LogStore<E, R> {
    /// Durably append `events`, promoting each to [`Lifecycle::Cached`].
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] when the batch could not be written; the
    /// store must not be left with a partially visible batch on `read_all`.
    fn append_batch(&mut self, events: &[Event<E, R>]) -> Result<(), PersistError>;

    /// Every durably stored event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] when storage cannot be read at all.
    fn read_all(&mut self) -> Result<Vec<Event<E, R>>, PersistError>;
}

/// JSON-lines log store: one event per line, append-only.
pub struct FileLogStore {
    path: PathBuf,
    telemetry: SharedTelemetry,
}

impl FileLogStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_telemetry(path, default_sink())
    }

    #[must_use]
    pub fn with_telemetry(path: impl Into<PathBuf>, telemetry: SharedTelemetry) -> Self {
        Self {
            path: path.into(),
            telemetry,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the durable history and feed it through `store`'s replay path.
    /// Replayed events register no undo steps. Returns the number of events
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] when the file cannot be read.
    pub fn replay_into<E: Entity, R: Role, H: UndoHost<E, R>>(
        &mut self,
        store: &mut UndoableEventStore<E, R, H>,
    ) -> Result<usize, PersistError> {
        let events: Vec<Event<E, R>> = self.read_all()?;
        let count = events.len();
        for event in events {
            store.replay(event);
        }
        Ok(count)
    }
}

impl<E: Entity, R: Role> LogStore<E, R> for FileLogStore {
    fn append_batch(&mut self, events: &[Event<E, R>]) -> Result<(), PersistError> {
        if events.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            let mut cached = event.clone();
            if cached.meta().lifecycle < Lifecycle::Cached {
                cached.meta_mut().lifecycle = Lifecycle::Cached;
            }
            writer.write_all(&cached.encode()?)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<Event<E, R>>, PersistError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match Event::<E, R>::decode(line.as_bytes()) {
                Ok(event) => events.push(event),
                Err(err) => {
                    self.telemetry.report(
                        FaultKind::DecodeFailed,
                        "skipping undecodable stored event",
                        &err.to_string(),
                    );
                }
            }
        }
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
