//! Ordered-collection mutation events.
//!
//! List order is expressed by **predecessor id** ("insert after X"), never
//! by numeric index. Two replicas that concurrently insert "after X" both
//! produce events that remain applicable after merging; the entries may
//! interleave differently per replica, but none is lost or duplicated.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, EventMeta, Role};

/// The three structural mutations of an ordered collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ListAction<E> {
    /// Insert `obj` immediately after `after` (head of list when `None`).
    Create { after: Option<Uuid>, obj: E },
    /// Remove the subject entity. `after` records its predecessor at
    /// deletion time so the event is invertible; `obj` is the removed
    /// snapshot for the same reason.
    Delete { after: Option<Uuid>, obj: E },
    /// Reposition `from` immediately after `after`. `was_after` is carried
    /// only to make the event invertible; forward application ignores it.
    Move {
        from: Uuid,
        after: Option<Uuid>,
        was_after: Option<Uuid>,
    },
}

/// An insert/remove/move in the list scoped by `(parent, role)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListChangeEvent<E, R> {
    pub meta: EventMeta,
    /// Owning entity of the list, `None` for a root-level list.
    pub parent: Option<Uuid>,
    /// Which of the parent's lists this event belongs to.
    pub role: R,
    pub action: ListAction<E>,
}

impl<E: Entity, R: Role> ListChangeEvent<E, R> {
    /// Author an insert of `obj` after `after`.
    #[must_use]
    pub fn create(
        project: Uuid,
        parent: Option<Uuid>,
        role: R,
        after: Option<Uuid>,
        obj: E,
    ) -> Self {
        Self {
            meta: EventMeta::new(project, obj.entity_id()),
            parent,
            role,
            action: ListAction::Create { after, obj },
        }
    }

    /// Author a removal of `obj`, recording its current predecessor.
    #[must_use]
    pub fn delete(
        project: Uuid,
        parent: Option<Uuid>,
        role: R,
        after: Option<Uuid>,
        obj: E,
    ) -> Self {
        Self {
            meta: EventMeta::new(project, obj.entity_id()),
            parent,
            role,
            action: ListAction::Delete { after, obj },
        }
    }

    /// Author a reposition of `from` to just after `after`, recording the
    /// current predecessor in `was_after`.
    #[must_use]
    pub fn reposition(
        project: Uuid,
        parent: Option<Uuid>,
        role: R,
        from: Uuid,
        after: Option<Uuid>,
        was_after: Option<Uuid>,
    ) -> Self {
        Self {
            meta: EventMeta::new(project, from),
            parent,
            role,
            action: ListAction::Move {
                from,
                after,
                was_after,
            },
        }
    }

    /// Semantic inverse: Create↔Delete swap, Move swaps `after`/`was_after`.
    /// Fresh id, stamp cleared.
    #[must_use]
    pub fn reverse(&self) -> Self {
        let mut e = self.clone();
        e.meta.reset_identity();
        e.action = match &self.action {
            ListAction::Create { after, obj } => ListAction::Delete {
                after: *after,
                obj: obj.clone(),
            },
            ListAction::Delete { after, obj } => ListAction::Create {
                after: *after,
                obj: obj.clone(),
            },
            ListAction::Move {
                from,
                after,
                was_after,
            } => ListAction::Move {
                from: *from,
                after: *was_after,
                was_after: *after,
            },
        };
        e
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
