//! Single-entity projection.

use std::collections::HashSet;
use std::rc::Rc;
use tracing::trace;
use uuid::Uuid;

use crate::event::{Entity, Event, FieldRegistry, ListAction, Role};
use crate::event::field::FieldApplyError;
use crate::log::{Subscriber, SubscriberCtx};
use crate::telemetry::SharedTelemetry;
use crate::error::FaultKind;

/// Projects the event stream of one subject into `Option<E>`.
///
/// `None` until a list create for the subject arrives (or a seed value is
/// supplied), `None` again after a delete. Field sets arriving while the
/// value is absent are ordering gaps and are skipped silently; every event
/// is applied at most once, keyed by event id.
pub struct ObjectAggregator<E, R> {
    subject: Uuid,
    current: Option<E>,
    applied: HashSet<Uuid>,
    registry: Rc<FieldRegistry<E>>,
    telemetry: SharedTelemetry,
    marker: std::marker::PhantomData<fn() -> R>,
}

impl<E: Entity, R: Role> ObjectAggregator<E, R> {
    #[must_use]
    pub fn new(subject: Uuid, registry: Rc<FieldRegistry<E>>, telemetry: SharedTelemetry) -> Self {
        Self {
            subject,
            current: None,
            applied: HashSet::new(),
            registry,
            telemetry,
            marker: std::marker::PhantomData,
        }
    }

    /// Start from a known value, e.g. the object carried by the create
    /// event that caused this aggregator to exist.
    #[must_use]
    pub fn seeded(obj: E, registry: Rc<FieldRegistry<E>>, telemetry: SharedTelemetry) -> Self {
        let subject = obj.entity_id();
        let mut agg = Self::new(subject, registry, telemetry);
        agg.current = Some(obj);
        agg
    }

    #[must_use]
    pub const fn subject(&self) -> Uuid {
        self.subject
    }

    #[must_use]
    pub const fn current(&self) -> Option<&E> {
        self.current.as_ref()
    }

    /// Fold one event into the projection. Events for other subjects and
    /// events already applied are ignored.
    pub fn apply(&mut self, event: &Event<E, R>) {
        if event.subject() != self.subject || !self.applied.insert(event.id()) {
            return;
        }
        match event {
            Event::FieldSet(e) => {
                let Some(obj) = self.current.as_mut() else {
                    // Create has not arrived yet; the set will be subsumed
                    // by a later replay in causal order.
                    trace!(subject = %self.subject, field = %e.field, "field set before create, skipped");
                    return;
                };
                match self.registry.apply(&e.field, &e.value, obj) {
                    Ok(()) => {}
                    Err(FieldApplyError::UnknownSelector(key)) => {
                        self.telemetry.report(
                            FaultKind::UnknownFieldSelector,
                            "field set names unregistered selector",
                            &key,
                        );
                    }
                    Err(FieldApplyError::BadValue { field, source }) => {
                        self.telemetry.report(
                            FaultKind::DecodeFailed,
                            "field value rejected by setter",
                            &format!("{field}: {source}"),
                        );
                    }
                }
            }
            Event::ListChange(e) => match &e.action {
                ListAction::Create { obj, .. } => {
                    self.current = Some(obj.clone());
                }
                ListAction::Delete { .. } => {
                    self.current = None;
                }
                ListAction::Move { .. } => {}
            },
        }
    }
}

impl<E: Entity, R: Role> Subscriber<E, R> for ObjectAggregator<E, R> {
    fn receive(&mut self, event: &Event<E, R>, _ctx: &mut SubscriberCtx<R>) {
        self.apply(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
