//! Append-only event log with synchronous subscriber fan-out.
//!
//! The log is the single ordered history of a store. Appending never blocks
//! on subscribers and never reorders: events are pushed, then delivered to
//! subscribers synchronously in registration order. Two registration styles
//! exist:
//!
//! - *unkeyed*: receives every event; the full history is replayed to the
//!   subscriber at registration time so late subscribers converge,
//! - *keyed*: receives only events whose [`RouteKey`]s intersect the
//!   subscription's watched keys; no backfill.
//!
//! A subscriber watching several keys of one event still receives that event
//! exactly once per append. Subscribers adjust their watched keys through
//! the [`SubscriberCtx`] handed to `receive`; changes take effect once the
//! current append's dispatch has completed, so delivery for an append is
//! decided entirely by the registrations in force when it started.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::trace;
use uuid::Uuid;

use crate::event::{Entity, Event, Lifecycle, Role, RouteKey};

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Consumer of events delivered by an [`EventLog`].
pub trait Subscriber<E, R> {
    fn receive(&mut self, event: &Event<E, R>, ctx: &mut SubscriberCtx<R>);
}

/// Shared handle under which subscribers are registered.
pub type SharedSubscriber<E, R> = Rc<RefCell<dyn Subscriber<E, R>>>;

/// Token identifying one registration, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum KeyChange<R> {
    Watch(RouteKey<R>),
    Unwatch(RouteKey<R>),
}

/// Handed to [`Subscriber::receive`]; collects watch-set changes to apply
/// after the current dispatch.
pub struct SubscriberCtx<R> {
    changes: Vec<KeyChange<R>>,
}

impl<R> SubscriberCtx<R> {
    const fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// Start receiving events routed under `key`. No effect on unkeyed
    /// registrations, which already receive everything.
    pub fn watch(&mut self, key: RouteKey<R>) {
        self.changes.push(KeyChange::Watch(key));
    }

    /// Stop receiving events routed under `key`.
    pub fn unwatch(&mut self, key: RouteKey<R>) {
        self.changes.push(KeyChange::Unwatch(key));
    }
}

struct Registration<E, R> {
    id: SubscriptionId,
    subscriber: SharedSubscriber<E, R>,
    /// `None` = unkeyed, receives everything.
    keys: Option<HashSet<RouteKey<R>>>,
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Ordered, append-only event history with fan-out.
pub struct EventLog<E, R> {
    events: Vec<Event<E, R>>,
    seen: HashSet<Uuid>,
    registrations: Vec<Registration<E, R>>,
    next_subscription: u64,
}

impl<E: Entity, R: Role> EventLog<E, R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            seen: HashSet::new(),
            registrations: Vec::new(),
            next_subscription: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether an event with this id has ever been appended.
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.seen.contains(&id)
    }

    /// The full history, oldest first.
    #[must_use]
    pub fn events(&self) -> &[Event<E, R>] {
        &self.events
    }

    /// Append one event and deliver it to every interested subscriber.
    ///
    /// Freshly authored events are promoted from [`Lifecycle::New`] to
    /// [`Lifecycle::Queued`]; events already further along keep their stage.
    pub fn append(&mut self, mut event: Event<E, R>) {
        if event.meta().lifecycle == Lifecycle::New {
            event.meta_mut().lifecycle = Lifecycle::Queued;
        }
        trace!(event = %event, "append");
        self.seen.insert(event.id());
        self.events.push(event);
        let index = self.events.len() - 1;
        self.dispatch(index);
    }

    /// Register an unkeyed subscriber. The existing history is replayed to
    /// it immediately, oldest first, before the registration takes effect
    /// for future appends.
    pub fn subscribe(&mut self, subscriber: SharedSubscriber<E, R>) -> SubscriptionId {
        let id = self.fresh_id();
        {
            let mut target = subscriber.borrow_mut();
            let mut ctx = SubscriberCtx::new();
            for event in &self.events {
                target.receive(event, &mut ctx);
            }
            // Backfill watch requests are only meaningful on keyed
            // registrations; an unkeyed subscriber's are dropped.
        }
        self.registrations.push(Registration {
            id,
            subscriber,
            keys: None,
        });
        id
    }

    /// Register a keyed subscriber watching `keys`. No backfill: keyed
    /// subscribers are expected to be created alongside the state they
    /// project, before the events they care about exist.
    pub fn subscribe_keyed(
        &mut self,
        keys: impl IntoIterator<Item = RouteKey<R>>,
        subscriber: SharedSubscriber<E, R>,
    ) -> SubscriptionId {
        let id = self.fresh_id();
        self.registrations.push(Registration {
            id,
            subscriber,
            keys: Some(keys.into_iter().collect()),
        });
        id
    }

    /// Remove a registration. Unknown ids are ignored.
    pub fn cancel(&mut self, id: SubscriptionId) {
        self.registrations.retain(|r| r.id != id);
    }

    fn fresh_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        id
    }

    fn dispatch(&mut self, index: usize) {
        let routes = self.events[index].routing_keys();
        // Resolve targets against the registrations in force now; watch-set
        // edits requested during this dispatch apply to later appends only.
        let targets: Vec<(SubscriptionId, SharedSubscriber<E, R>)> = self
            .registrations
            .iter()
            .filter(|r| match &r.keys {
                None => true,
                Some(keys) => routes.iter().any(|k| keys.contains(k)),
            })
            .map(|r| (r.id, Rc::clone(&r.subscriber)))
            .collect();

        let mut edits: Vec<(SubscriptionId, Vec<KeyChange<R>>)> = Vec::new();
        for (id, subscriber) in targets {
            let mut ctx = SubscriberCtx::new();
            subscriber.borrow_mut().receive(&self.events[index], &mut ctx);
            if !ctx.changes.is_empty() {
                edits.push((id, ctx.changes));
            }
        }

        for (id, changes) in edits {
            self.apply_key_changes(id, changes);
        }
    }

    fn apply_key_changes(&mut self, id: SubscriptionId, changes: Vec<KeyChange<R>>) {
        let Some(registration) = self.registrations.iter_mut().find(|r| r.id == id) else {
            return;
        };
        let Some(keys) = registration.keys.as_mut() else {
            return;
        };
        for change in changes {
            match change {
                KeyChange::Watch(key) => {
                    keys.insert(key);
                }
                KeyChange::Unwatch(key) => {
                    keys.remove(&key);
                }
            }
        }
    }
}

impl<E: Entity, R: Role> Default for EventLog<E, R> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{FieldSetEvent, ListChangeEvent};
    use serde::{Deserialize, Serialize};

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
    type TestLog = EventLog<Card, String>;

    /// Records event ids as they arrive; can optionally request watch-set
    /// edits on every delivery.
    struct Recorder {
        received: Vec<Uuid>,
        watch_on_receive: Option<RouteKey<String>>,
    }

    impl Recorder {
        fn shared() -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                received: Vec::new(),
                watch_on_receive: None,
            }))
        }
    }

    impl Subscriber<Card, String> for Recorder {
        fn receive(&mut self, event: &TestEvent, ctx: &mut SubscriberCtx<String>) {
            self.received.push(event.id());
            if let Some(key) = self.watch_on_receive.take() {
                ctx.watch(key);
            }
        }
    }

    fn field_event(subject: Uuid) -> TestEvent {
        Event::FieldSet(
            FieldSetEvent::set(Uuid::new_v4(), subject, "title", &"b", &"a").expect("encodable"),
        )
    }

    fn list_event(role: &str) -> TestEvent {
        let obj = Card {
            id: Uuid::new_v4(),
            title: "x".into(),
        };
        Event::ListChange(ListChangeEvent::create(
            Uuid::new_v4(),
            None,
            role.to_string(),
            None,
            obj,
        ))
    }

    #[test]
    fn append_promotes_new_to_queued() {
        let mut log = TestLog::new();
        log.append(field_event(Uuid::new_v4()));
        assert_eq!(log.events()[0].meta().lifecycle, Lifecycle::Queued);
    }

    #[test]
    fn append_keeps_later_lifecycle() {
        let mut log = TestLog::new();
        let mut e = field_event(Uuid::new_v4());
        e.meta_mut().lifecycle = Lifecycle::Cached;
        log.append(e);
        assert_eq!(log.events()[0].meta().lifecycle, Lifecycle::Cached);
    }

    #[test]
    fn contains_tracks_appended_ids() {
        let mut log = TestLog::new();
        let e = field_event(Uuid::new_v4());
        let id = e.id();
        assert!(!log.contains(id));
        log.append(e);
        assert!(log.contains(id));
    }

    #[test]
    fn unkeyed_subscriber_receives_every_append() {
        let mut log = TestLog::new();
        let rec = Recorder::shared();
        log.subscribe(rec.clone());
        let a = field_event(Uuid::new_v4());
        let b = list_event("lanes");
        let ids = vec![a.id(), b.id()];
        log.append(a);
        log.append(b);
        assert_eq!(rec.borrow().received, ids);
    }

    #[test]
    fn unkeyed_subscribe_backfills_history() {
        let mut log = TestLog::new();
        let a = field_event(Uuid::new_v4());
        let b = field_event(Uuid::new_v4());
        let ids = vec![a.id(), b.id()];
        log.append(a);
        log.append(b);
        let rec = Recorder::shared();
        log.subscribe(rec.clone());
        assert_eq!(rec.borrow().received, ids);
    }

    #[test]
    fn keyed_subscribe_does_not_backfill() {
        let mut log = TestLog::new();
        let subject = Uuid::new_v4();
        log.append(field_event(subject));
        let rec = Recorder::shared();
        log.subscribe_keyed([RouteKey::Subject(subject)], rec.clone());
        assert!(rec.borrow().received.is_empty());
        log.append(field_event(subject));
        assert_eq!(rec.borrow().received.len(), 1);
    }

    #[test]
    fn keyed_subscriber_filters_by_route() {
        let mut log = TestLog::new();
        let subject = Uuid::new_v4();
        let rec = Recorder::shared();
        log.subscribe_keyed([RouteKey::Subject(subject)], rec.clone());
        log.append(field_event(Uuid::new_v4()));
        log.append(field_event(subject));
        assert_eq!(rec.borrow().received.len(), 1);
    }

    #[test]
    fn matching_multiple_keys_delivers_once() {
        let mut log = TestLog::new();
        let e = list_event("lanes");
        let subject = e.subject();
        let rec = Recorder::shared();
        log.subscribe_keyed(
            [
                RouteKey::Subject(subject),
                RouteKey::List {
                    parent: None,
                    role: "lanes".to_string(),
                },
            ],
            rec.clone(),
        );
        log.append(e);
        assert_eq!(rec.borrow().received.len(), 1);
    }

    #[test]
    fn cancel_stops_delivery() {
        let mut log = TestLog::new();
        let rec = Recorder::shared();
        let sub = log.subscribe(rec.clone());
        log.append(field_event(Uuid::new_v4()));
        log.cancel(sub);
        log.append(field_event(Uuid::new_v4()));
        assert_eq!(rec.borrow().received.len(), 1);
    }

    #[test]
    fn watch_requested_during_dispatch_applies_to_later_appends() {
        let mut log = TestLog::new();
        let watched = Uuid::new_v4();
        let trigger = Uuid::new_v4();
        let rec = Recorder::shared();
        rec.borrow_mut().watch_on_receive = Some(RouteKey::Subject(watched));
        log.subscribe_keyed([RouteKey::Subject(trigger)], rec.clone());

        // Not watched yet.
        log.append(field_event(watched));
        assert!(rec.borrow().received.is_empty());

        // Trigger delivery; the watch lands after this dispatch.
        log.append(field_event(trigger));
        assert_eq!(rec.borrow().received.len(), 1);

        log.append(field_event(watched));
        assert_eq!(rec.borrow().received.len(), 2);
    }

    #[test]
    fn subscribers_dispatched_in_registration_order() {
        let mut log = TestLog::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        struct Tagged {
            tag: u8,
            order: Rc<RefCell<Vec<u8>>>,
        }
        impl Subscriber<Card, String> for Tagged {
            fn receive(&mut self, _: &TestEvent, _: &mut SubscriberCtx<String>) {
                self.order.borrow_mut().push(self.tag);
            }
        }

        for tag in 0..3 {
            log.subscribe(Rc::new(RefCell::new(Tagged {
                tag,
                order: order.clone(),
            })));
        }
        log.append(field_event(Uuid::new_v4()));
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }
}
