//! List projection with an id-keyed lookup cache.

use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

use crate::aggregate::ListAggregator;
use crate::event::{Entity, Event, FieldRegistry, Role, RouteKey};
use crate::log::{Subscriber, SubscriberCtx};
use crate::telemetry::SharedTelemetry;

/// A [`ListAggregator`] that additionally maintains a `HashMap` from member
/// id to the current entity value, refreshed as events apply. Useful when
/// consumers resolve members by id far more often than they iterate.
pub struct IndexedAggregator<E, R> {
    list: ListAggregator<E, R>,
    index: HashMap<Uuid, E>,
}

impl<E: Entity, R: Role> IndexedAggregator<E, R> {
    #[must_use]
    pub fn new(
        project: Uuid,
        parent: Option<Uuid>,
        role: R,
        registry: Rc<FieldRegistry<E>>,
        telemetry: SharedTelemetry,
    ) -> Self {
        Self {
            list: ListAggregator::new(project, parent, role, registry, telemetry),
            index: HashMap::new(),
        }
    }

    #[must_use]
    pub fn route_key(&self) -> RouteKey<R> {
        self.list.route_key()
    }

    /// The underlying ordered projection, including its authoring helpers.
    #[must_use]
    pub const fn list(&self) -> &ListAggregator<E, R> {
        &self.list
    }

    /// Cached value for a member id.
    #[must_use]
    pub fn entity(&self, id: Uuid) -> Option<&E> {
        self.index.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<E> {
        self.list.snapshot()
    }

    fn refresh(&mut self, subject: Uuid) {
        match self.list.get(subject) {
            Some(obj) => {
                self.index.insert(subject, obj.clone());
            }
            None => {
                self.index.remove(&subject);
            }
        }
    }
}

impl<E: Entity, R: Role> Subscriber<E, R> for IndexedAggregator<E, R> {
    fn receive(&mut self, event: &Event<E, R>, ctx: &mut SubscriberCtx<R>) {
        self.list.receive(event, ctx);
        self.refresh(event.subject());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FieldSetEvent;
    use crate::log::EventLog;
    use crate::telemetry::default_sink;
    use serde::{Deserialize, Serialize};
    use std::cell::RefCell;

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

    type TestIndexed = IndexedAggregator<Card, String>;

    fn registry() -> Rc<FieldRegistry<Card>> {
        Rc::new(FieldRegistry::new().with_field("title", |c: &mut Card, v: String| c.title = v))
    }

    fn rig(project: Uuid) -> (EventLog<Card, String>, Rc<RefCell<TestIndexed>>) {
        let indexed = Rc::new(RefCell::new(TestIndexed::new(
            project,
            None,
            "lanes".to_string(),
            registry(),
            default_sink(),
        )));
        let mut log = EventLog::new();
        let key = indexed.borrow().route_key();
        log.subscribe_keyed([key], indexed.clone());
        (log, indexed)
    }

    fn card(title: &str) -> Card {
        Card {
            id: Uuid::new_v4(),
            title: title.into(),
        }
    }

    #[test]
    fn index_tracks_creates() {
        let project = Uuid::new_v4();
        let (mut log, indexed) = rig(project);
        let a = card("a");
        let a_id = a.id;
        let e = indexed.borrow().list().push_event(a);
        log.append(e);
        assert_eq!(indexed.borrow().entity(a_id).map(|c| c.title.clone()), Some("a".into()));
    }

    #[test]
    fn index_tracks_field_edits() {
        let project = Uuid::new_v4();
        let (mut log, indexed) = rig(project);
        let a = card("draft");
        let a_id = a.id;
        let e = indexed.borrow().list().push_event(a);
        log.append(e);
        log.append(Event::FieldSet(
            FieldSetEvent::set(project, a_id, "title", &"final", &"draft").expect("encodable"),
        ));
        assert_eq!(
            indexed.borrow().entity(a_id).map(|c| c.title.clone()),
            Some("final".into())
        );
    }

    #[test]
    fn index_drops_deleted_members() {
        let project = Uuid::new_v4();
        let (mut log, indexed) = rig(project);
        let a = card("a");
        let a_id = a.id;
        let e = indexed.borrow().list().push_event(a);
        log.append(e);
        let del = indexed.borrow().list().delete_event(a_id).expect("member");
        log.append(del);
        assert!(indexed.borrow().entity(a_id).is_none());
        assert!(indexed.borrow().is_empty());
    }

    #[test]
    fn snapshot_follows_list_order() {
        let project = Uuid::new_v4();
        let (mut log, indexed) = rig(project);
        for title in ["a", "b"] {
            let e = indexed.borrow().list().push_event(card(title));
            log.append(e);
        }
        let titles: Vec<String> = indexed
            .borrow()
            .snapshot()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["a", "b"]);
    }
}
