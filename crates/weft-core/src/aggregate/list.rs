//! Ordered-collection projection.
//!
//! A [`ListAggregator`] projects every [`ListChangeEvent`] scoped by its
//! `(parent, role)` pair into an ordered set of member entities. Each member
//! gets an owned [`ObjectAggregator`]; the list asks the log (through its
//! [`SubscriberCtx`]) to route that member's subject-addressed events to it
//! and forwards them to the child, so member field edits update the
//! materialized snapshot without a separate registration per member.
//!
//! Ordering is by predecessor id. An insert lands right after its named
//! predecessor; a missing or absent predecessor falls back to the head.
//! Concurrent inserts naming the same predecessor are ordered by the causal
//! stamp's tiebreak key, so replicas that saw the inserts in different
//! orders still converge on the same sequence.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::trace;
use uuid::Uuid;

use crate::aggregate::ObjectAggregator;
use crate::event::{Entity, Event, FieldRegistry, ListAction, ListChangeEvent, Role, RouteKey};
use crate::log::{Subscriber, SubscriberCtx};
use crate::telemetry::SharedTelemetry;

struct Member<E, R> {
    aggregator: ObjectAggregator<E, R>,
    /// Predecessor named by the event that placed this member, used to
    /// order concurrent siblings deterministically.
    placed_after: Option<Uuid>,
    placement_key: String,
}

/// Projects one `(parent, role)`-scoped list out of the event stream.
pub struct ListAggregator<E, R> {
    project: Uuid,
    parent: Option<Uuid>,
    role: R,
    predicate: Option<Box<dyn Fn(&E) -> bool>>,
    applied: HashSet<Uuid>,
    order: Vec<Uuid>,
    members: HashMap<Uuid, Member<E, R>>,
    registry: Rc<FieldRegistry<E>>,
    telemetry: SharedTelemetry,
}

impl<E: Entity, R: Role> ListAggregator<E, R> {
    #[must_use]
    pub fn new(
        project: Uuid,
        parent: Option<Uuid>,
        role: R,
        registry: Rc<FieldRegistry<E>>,
        telemetry: SharedTelemetry,
    ) -> Self {
        Self {
            project,
            parent,
            role,
            predicate: None,
            applied: HashSet::new(),
            order: Vec::new(),
            members: HashMap::new(),
            registry,
            telemetry,
        }
    }

    /// Restrict membership to entities the predicate accepts; rejected
    /// creates are ignored entirely.
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Fn(&E) -> bool + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// The routing key this aggregator should be registered under.
    #[must_use]
    pub fn route_key(&self) -> RouteKey<R> {
        RouteKey::List {
            parent: self.parent,
            role: self.role.clone(),
        }
    }

    // -- lookups -------------------------------------------------------------

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Member ids in list order.
    #[must_use]
    pub fn ids(&self) -> &[Uuid] {
        &self.order
    }

    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.members.contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&E> {
        self.members.get(&id).and_then(|m| m.aggregator.current())
    }

    /// The member just before `id`, `None` when `id` heads the list or is
    /// not a member.
    #[must_use]
    pub fn find_before(&self, id: Uuid) -> Option<Uuid> {
        let pos = self.order.iter().position(|m| *m == id)?;
        pos.checked_sub(1).map(|p| self.order[p])
    }

    /// The member just after `id`.
    #[must_use]
    pub fn find_after(&self, id: Uuid) -> Option<Uuid> {
        let pos = self.order.iter().position(|m| *m == id)?;
        self.order.get(pos + 1).copied()
    }

    #[must_use]
    pub fn last(&self) -> Option<Uuid> {
        self.order.last().copied()
    }

    /// Materialized members in list order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<E> {
        self.order
            .iter()
            .filter_map(|id| self.members.get(id))
            .filter_map(|m| m.aggregator.current().cloned())
            .collect()
    }

    // -- authoring -----------------------------------------------------------
    //
    // These build events for the store's append path; the aggregator itself
    // mutates only when the event comes back through dispatch.

    /// Event inserting `obj` right after `after`.
    #[must_use]
    pub fn create_event(&self, after: Option<Uuid>, obj: E) -> Event<E, R> {
        Event::ListChange(ListChangeEvent::create(
            self.project,
            self.parent,
            self.role.clone(),
            after,
            obj,
        ))
    }

    /// Event appending `obj` at the tail.
    #[must_use]
    pub fn push_event(&self, obj: E) -> Event<E, R> {
        self.create_event(self.last(), obj)
    }

    /// Event deleting member `id`, capturing its current predecessor and
    /// value so the event is invertible. `None` when `id` is not a member.
    #[must_use]
    pub fn delete_event(&self, id: Uuid) -> Option<Event<E, R>> {
        let obj = self.get(id)?.clone();
        Some(Event::ListChange(ListChangeEvent::delete(
            self.project,
            self.parent,
            self.role.clone(),
            self.find_before(id),
            obj,
        )))
    }

    /// Event moving member `id` to just after `after`. `None` when `id` is
    /// not a member.
    #[must_use]
    pub fn move_event(&self, id: Uuid, after: Option<Uuid>) -> Option<Event<E, R>> {
        if !self.contains(id) {
            return None;
        }
        Some(Event::ListChange(ListChangeEvent::reposition(
            self.project,
            self.parent,
            self.role.clone(),
            id,
            after,
            self.find_before(id),
        )))
    }

    // -- projection ----------------------------------------------------------

    fn scoped(&self, e: &ListChangeEvent<E, R>) -> bool {
        e.parent == self.parent && e.role == self.role
    }

    /// Position for a member placed after `after` with tiebreak `key`:
    /// right after the predecessor, then past any sibling placed after the
    /// same predecessor whose key orders above ours.
    fn placement(&self, after: Option<Uuid>, key: &str) -> usize {
        let mut pos = after
            .and_then(|a| self.order.iter().position(|id| *id == a))
            .map_or(0, |p| p + 1);
        while let Some(id) = self.order.get(pos) {
            let Some(member) = self.members.get(id) else {
                break;
            };
            if member.placed_after == after && member.placement_key.as_str() > key {
                pos += 1;
            } else {
                break;
            }
        }
        pos
    }

    fn insert(&mut self, event_key: String, after: Option<Uuid>, obj: E, ctx: &mut SubscriberCtx<R>) {
        let id = obj.entity_id();
        if self.members.contains_key(&id) {
            trace!(member = %id, "create for existing member skipped");
            return;
        }
        if let Some(predicate) = &self.predicate {
            if !predicate(&obj) {
                return;
            }
        }
        let pos = self.placement(after, &event_key);
        self.order.insert(pos, id);
        self.members.insert(
            id,
            Member {
                aggregator: ObjectAggregator::seeded(
                    obj,
                    self.registry.clone(),
                    self.telemetry.clone(),
                ),
                placed_after: after,
                placement_key: event_key,
            },
        );
        ctx.watch(RouteKey::Subject(id));
    }

    fn remove(&mut self, id: Uuid, ctx: &mut SubscriberCtx<R>) {
        if self.members.remove(&id).is_some() {
            self.order.retain(|m| *m != id);
            ctx.unwatch(RouteKey::Subject(id));
        }
    }

    fn reposition(&mut self, event_key: String, id: Uuid, after: Option<Uuid>) {
        if !self.members.contains_key(&id) {
            return;
        }
        self.order.retain(|m| *m != id);
        let pos = self.placement(after, &event_key);
        self.order.insert(pos, id);
        if let Some(member) = self.members.get_mut(&id) {
            member.placed_after = after;
            member.placement_key = event_key;
        }
    }

    fn fold(&mut self, event: &Event<E, R>, ctx: &mut SubscriberCtx<R>) {
        if !self.applied.insert(event.id()) {
            return;
        }
        match event {
            Event::ListChange(e) if self.scoped(e) => {
                let key = event
                    .stamp()
                    .map_or_else(|| event.id().to_string(), |s| s.tiebreak_key());
                match &e.action {
                    ListAction::Create { after, obj } => {
                        self.insert(key, *after, obj.clone(), ctx);
                    }
                    ListAction::Delete { .. } => self.remove(e.meta.subject, ctx),
                    ListAction::Move { from, after, .. } => self.reposition(key, *from, *after),
                }
            }
            Event::ListChange(_) => {}
            Event::FieldSet(_) => {
                // Subject-routed member edit; forward to the owned child.
                if let Some(member) = self.members.get_mut(&event.subject()) {
                    member.aggregator.apply(event);
                }
            }
        }
    }
}

impl<E: Entity, R: Role> Subscriber<E, R> for ListAggregator<E, R> {
    fn receive(&mut self, event: &Event<E, R>, ctx: &mut SubscriberCtx<R>) {
        self.fold(event, ctx);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
