//! Event data model.
//!
//! Every state change in the system is an immutable, serializable event.
//! Aggregates are never mutated directly; they are projections obtained by
//! replaying the event stream. The kernel is generic over one application
//! entity type `E` and one list-role type `R` per store; applications with
//! heterogeneous entities compose `E` as their own enum.
//!
//! Two event families cover the kernel's needs:
//!
//! - [`FieldSetEvent`]: generic point mutation through a symbolic field
//!   selector (see [`field::FieldRegistry`]),
//! - [`ListChangeEvent`]: ordered-collection insert/remove/move expressed
//!   by predecessor id rather than numeric index, which is what makes
//!   concurrent inserts from different replicas mergeable.
//!
//! Events are dispatched as a closed enum matched exhaustively; the codec is
//! canonical JSON with an internal `kind` tag driving typed deserialization.

pub mod field;
pub mod list;

pub use field::{FieldRegistry, FieldSetEvent};
pub use list::{ListAction, ListChangeEvent};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

use crate::clock::LogicalClock;
use crate::error::CodecError;

// ---------------------------------------------------------------------------
// Entity / Role capability traits
// ---------------------------------------------------------------------------

/// An application entity that can live in projections and travel in events.
pub trait Entity:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + 'static
{
    /// Immutable identity; this is the event `subject` addressing the entity.
    fn entity_id(&self) -> Uuid;
}

/// A scoping tag distinguishing multiple lists under one parent.
pub trait Role: Clone + Eq + Hash + fmt::Debug + Serialize + DeserializeOwned + 'static {}

impl<T> Role for T where T: Clone + Eq + Hash + fmt::Debug + Serialize + DeserializeOwned + 'static {}

// ---------------------------------------------------------------------------
// Event metadata
// ---------------------------------------------------------------------------

/// Where an event sits in its journey from creation to durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Created, not yet handed to a store.
    New,
    /// Appended to the in-memory event log.
    Queued,
    /// Written to local durable storage.
    Cached,
    /// Acknowledged by the remote sync backend.
    Persisted,
}

/// Whether an event is a normal change or part of an undo/redo replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoMode {
    /// A normal change.
    Change,
    /// Reverses a prior change.
    Undo,
    /// Reapplies a previously undone change.
    Redo,
}

impl UndoMode {
    /// Advance along the `Change → Undo → Redo → Undo → …` cycle.
    #[must_use]
    pub const fn inverted(self) -> Self {
        match self {
            Self::Change | Self::Redo => Self::Undo,
            Self::Undo => Self::Redo,
        }
    }
}

/// Fields common to every event family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    /// Unique identity; regenerated on every [`Event::reverse`].
    pub id: Uuid,
    /// Causal stamp, assigned at append time. `None` before the event has
    /// been through a store.
    pub stamp: Option<LogicalClock>,
    /// Aggregate-root namespace the event belongs to.
    pub project: Uuid,
    /// The entity the event addresses.
    pub subject: Uuid,
    pub lifecycle: Lifecycle,
    pub undo_mode: UndoMode,
}

impl EventMeta {
    /// Fresh metadata for a newly authored event.
    #[must_use]
    pub fn new(project: Uuid, subject: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            stamp: None,
            project,
            subject,
            lifecycle: Lifecycle::New,
            undo_mode: UndoMode::Change,
        }
    }

    /// Regenerate identity and clear the stamp, as required after reversal.
    pub(crate) fn reset_identity(&mut self) {
        self.id = Uuid::new_v4();
        self.stamp = None;
    }
}

// ---------------------------------------------------------------------------
// Routing keys
// ---------------------------------------------------------------------------

/// Derived tag used to deliver events only to interested subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteKey<R> {
    /// Events addressing one entity.
    Subject(Uuid),
    /// Events mutating the list scoped by `(parent, role)`.
    List { parent: Option<Uuid>, role: R },
}

// ---------------------------------------------------------------------------
// The event enum
// ---------------------------------------------------------------------------

/// Discriminant for the two event families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FieldSet,
    ListChange,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FieldSet => "field.set",
            Self::ListChange => "list.change",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event<E, R> {
    FieldSet(FieldSetEvent<E>),
    ListChange(ListChangeEvent<E, R>),
}

impl<E: Entity, R: Role> Event<E, R> {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::FieldSet(_) => EventKind::FieldSet,
            Self::ListChange(_) => EventKind::ListChange,
        }
    }

    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::FieldSet(e) => &e.meta,
            Self::ListChange(e) => &e.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut EventMeta {
        match self {
            Self::FieldSet(e) => &mut e.meta,
            Self::ListChange(e) => &mut e.meta,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.meta().id
    }

    #[must_use]
    pub const fn subject(&self) -> Uuid {
        self.meta().subject
    }

    #[must_use]
    pub const fn project(&self) -> Uuid {
        self.meta().project
    }

    #[must_use]
    pub fn stamp(&self) -> Option<&LogicalClock> {
        self.meta().stamp.as_ref()
    }

    /// Keys under which this event is dispatched to keyed subscribers.
    #[must_use]
    pub fn routing_keys(&self) -> Vec<RouteKey<R>> {
        match self {
            Self::FieldSet(e) => vec![RouteKey::Subject(e.meta.subject)],
            Self::ListChange(e) => vec![
                RouteKey::Subject(e.meta.subject),
                RouteKey::List {
                    parent: e.parent,
                    role: e.role.clone(),
                },
            ],
        }
    }

    /// The semantic inverse of this event, with a fresh id and no stamp.
    ///
    /// `reverse(reverse(e))` equals `e` in every field except `id` and
    /// `stamp`, which regenerate each time.
    #[must_use]
    pub fn reverse(&self) -> Self {
        match self {
            Self::FieldSet(e) => Self::FieldSet(e.reverse()),
            Self::ListChange(e) => Self::ListChange(e.reverse()),
        }
    }

    /// Serialize to the canonical byte representation.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the payload cannot be represented as JSON.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the canonical byte representation.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] on malformed or mistyped input.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<E: Entity, R: Role> fmt::Display for Event<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\tsubject={}",
            self.kind(),
            self.id(),
            self.subject()
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Card {
        id: Uuid,
        title: String,
    }

    impl Entity for Card {
        fn entity_id(&self) -> Uuid {
            self.id
        }
    }

    type TestEvent = Event<Card, String>;

    fn card(title: &str) -> Card {
        Card {
            id: Uuid::new_v4(),
            title: title.into(),
        }
    }

    fn field_event() -> TestEvent {
        let subject = Uuid::new_v4();
        Event::FieldSet(
            FieldSetEvent::set(Uuid::new_v4(), subject, "title", &"new", &"old")
                .expect("encodable values"),
        )
    }

    fn list_event() -> TestEvent {
        let obj = card("hello");
        Event::ListChange(ListChangeEvent::create(
            Uuid::new_v4(),
            None,
            "lanes".to_string(),
            None,
            obj,
        ))
    }

    #[test]
    fn meta_starts_unstamped_and_new() {
        let e = field_event();
        assert!(e.stamp().is_none());
        assert_eq!(e.meta().lifecycle, Lifecycle::New);
        assert_eq!(e.meta().undo_mode, UndoMode::Change);
    }

    #[test]
    fn undo_mode_cycle() {
        assert_eq!(UndoMode::Change.inverted(), UndoMode::Undo);
        assert_eq!(UndoMode::Undo.inverted(), UndoMode::Redo);
        assert_eq!(UndoMode::Redo.inverted(), UndoMode::Undo);
    }

    #[test]
    fn field_event_routes_by_subject_only() {
        let e = field_event();
        assert_eq!(e.routing_keys(), vec![RouteKey::Subject(e.subject())]);
    }

    #[test]
    fn list_event_routes_by_subject_and_scope() {
        let e = list_event();
        let keys = e.routing_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&RouteKey::Subject(e.subject())));
        assert!(keys.contains(&RouteKey::List {
            parent: None,
            role: "lanes".to_string()
        }));
    }

    #[test]
    fn reverse_regenerates_id_and_clears_stamp() {
        let mut e = field_event();
        e.meta_mut().stamp = Some(crate::clock::LogicalClock::new().next(Uuid::new_v4()));
        let rev = e.reverse();
        assert_ne!(rev.id(), e.id());
        assert!(rev.stamp().is_none());
        assert_eq!(rev.subject(), e.subject());
    }

    #[test]
    fn reverse_is_involution_up_to_identity() {
        let e = field_event();
        let back = e.reverse().reverse();
        let (Event::FieldSet(orig), Event::FieldSet(twice)) = (&e, &back) else {
            panic!("expected field events");
        };
        assert_eq!(orig.field, twice.field);
        assert_eq!(orig.value, twice.value);
        assert_eq!(orig.prior, twice.prior);
        assert_ne!(orig.meta.id, twice.meta.id);
    }

    #[test]
    fn codec_roundtrip_field_event() {
        let e = field_event();
        let bytes = e.encode().expect("encode");
        let back = TestEvent::decode(&bytes).expect("decode");
        assert_eq!(e, back);
    }

    #[test]
    fn codec_roundtrip_list_event() {
        let e = list_event();
        let bytes = e.encode().expect("encode");
        let back = TestEvent::decode(&bytes).expect("decode");
        assert_eq!(e, back);
    }

    #[test]
    fn codec_roundtrip_preserves_stamp() {
        let mut e = list_event();
        e.meta_mut().stamp = Some(crate::clock::LogicalClock::new().next(Uuid::new_v4()));
        let back = TestEvent::decode(&e.encode().expect("encode")).expect("decode");
        assert_eq!(e.stamp(), back.stamp());
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let raw = json!({"kind": "no.such.kind"}).to_string();
        assert!(TestEvent::decode(raw.as_bytes()).is_err());
    }

    #[test]
    fn display_names_kind_and_subject() {
        let e = list_event();
        let s = e.to_string();
        assert!(s.contains("list.change"));
        assert!(s.contains(&e.subject().to_string()));
    }
}
