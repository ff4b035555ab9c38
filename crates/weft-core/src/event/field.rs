//! Point mutation of a single entity field.
//!
//! A [`FieldSetEvent`] carries a *symbolic* field selector plus the new and
//! prior values as JSON, so events survive serialization without capturing
//! closures or relying on runtime type identity. Selectors are resolved
//! against a per-entity-type [`FieldRegistry`] built at startup: a plain
//! table from selector key to setter closure. The closure itself is never
//! serialized.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

use super::{Entity, EventMeta};
use crate::error::CodecError;

// ---------------------------------------------------------------------------
// FieldSetEvent
// ---------------------------------------------------------------------------

/// Sets one field of the subject entity to `value`; `prior` holds the
/// overwritten value so the event is invertible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSetEvent<E> {
    pub meta: EventMeta,
    /// Symbolic selector key, resolved through a [`FieldRegistry`].
    pub field: String,
    pub value: serde_json::Value,
    pub prior: serde_json::Value,
    #[serde(skip)]
    marker: PhantomData<fn() -> E>,
}

impl<E: Entity> FieldSetEvent<E> {
    /// Author a field mutation. `value` and `prior` are serialized into the
    /// event; the caller is responsible for `prior` actually being the
    /// current value (usually read off the projection).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if either value cannot be represented as JSON.
    pub fn set<T: Serialize>(
        project: Uuid,
        subject: Uuid,
        field: impl Into<String>,
        value: &T,
        prior: &T,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            meta: EventMeta::new(project, subject),
            field: field.into(),
            value: serde_json::to_value(value)?,
            prior: serde_json::to_value(prior)?,
            marker: PhantomData,
        })
    }

    /// Swap `value`/`prior`, regenerate id, clear stamp.
    #[must_use]
    pub fn reverse(&self) -> Self {
        let mut e = self.clone();
        e.meta.reset_identity();
        std::mem::swap(&mut e.value, &mut e.prior);
        e
    }
}

// ---------------------------------------------------------------------------
// FieldRegistry
// ---------------------------------------------------------------------------

/// Error produced when a setter rejects the incoming JSON value.
#[derive(Debug, thiserror::Error)]
pub enum FieldApplyError {
    /// No setter registered for the selector key.
    #[error("unknown field selector '{0}'")]
    UnknownSelector(String),
    /// The value did not deserialize into the field's type.
    #[error("value for field '{field}' rejected: {source}")]
    BadValue {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

type Setter<E> = Box<dyn Fn(&mut E, &serde_json::Value) -> Result<(), serde_json::Error>>;

/// Table resolving symbolic selector keys to setter closures for one entity
/// type. Built once at startup, shared by every projection of that type.
pub struct FieldRegistry<E> {
    setters: HashMap<String, Setter<E>>,
}

impl<E: Entity> FieldRegistry<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            setters: HashMap::new(),
        }
    }

    /// Register a typed setter under a selector key. The closure receives
    /// the already-deserialized field value.
    #[must_use]
    pub fn with_field<T: serde::de::DeserializeOwned>(
        mut self,
        key: impl Into<String>,
        set: impl Fn(&mut E, T) + 'static,
    ) -> Self {
        self.setters.insert(
            key.into(),
            Box::new(move |obj, raw| {
                let value: T = serde_json::from_value(raw.clone())?;
                set(obj, value);
                Ok(())
            }),
        );
        self
    }

    /// Resolve `key` and apply the value to `obj`.
    ///
    /// # Errors
    ///
    /// [`FieldApplyError::UnknownSelector`] for unregistered keys,
    /// [`FieldApplyError::BadValue`] when the JSON value does not fit the
    /// field's type.
    pub fn apply(
        &self,
        key: &str,
        value: &serde_json::Value,
        obj: &mut E,
    ) -> Result<(), FieldApplyError> {
        let setter = self
            .setters
            .get(key)
            .ok_or_else(|| FieldApplyError::UnknownSelector(key.to_string()))?;
        setter(obj, value).map_err(|source| FieldApplyError::BadValue {
            field: key.to_string(),
            source,
        })
    }

    /// Whether a selector key is registered.
    #[must_use]
    pub fn knows(&self, key: &str) -> bool {
        self.setters.contains_key(key)
    }
}

impl<E: Entity> Default for FieldRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for FieldRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("fields", &self.setters.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: Uuid,
        text: String,
        pinned: bool,
    }

    impl Entity for Note {
        fn entity_id(&self) -> Uuid {
            self.id
        }
    }

    fn registry() -> FieldRegistry<Note> {
        FieldRegistry::new()
            .with_field("text", |n: &mut Note, v: String| n.text = v)
            .with_field("pinned", |n: &mut Note, v: bool| n.pinned = v)
    }

    fn note() -> Note {
        Note {
            id: Uuid::new_v4(),
            text: "draft".into(),
            pinned: false,
        }
    }

    #[test]
    fn registry_applies_registered_setter() {
        let reg = registry();
        let mut n = note();
        reg.apply("text", &serde_json::json!("final"), &mut n)
            .expect("known selector");
        assert_eq!(n.text, "final");
    }

    #[test]
    fn registry_rejects_unknown_selector() {
        let reg = registry();
        let mut n = note();
        let err = reg
            .apply("nope", &serde_json::json!(1), &mut n)
            .expect_err("unknown selector");
        assert!(matches!(err, FieldApplyError::UnknownSelector(_)));
    }

    #[test]
    fn registry_rejects_mistyped_value() {
        let reg = registry();
        let mut n = note();
        let err = reg
            .apply("pinned", &serde_json::json!("not a bool"), &mut n)
            .expect_err("bad value");
        assert!(matches!(err, FieldApplyError::BadValue { .. }));
        // no partial mutation
        assert!(!n.pinned);
    }

    #[test]
    fn knows_reports_registration() {
        let reg = registry();
        assert!(reg.knows("text"));
        assert!(!reg.knows("title"));
    }

    #[test]
    fn set_event_reverse_swaps_values() {
        let e: FieldSetEvent<Note> =
            FieldSetEvent::set(Uuid::new_v4(), Uuid::new_v4(), "text", &"after", &"before")
                .expect("encodable");
        let rev = e.reverse();
        assert_eq!(rev.value, serde_json::json!("before"));
        assert_eq!(rev.prior, serde_json::json!("after"));
        assert_eq!(rev.field, "text");
        assert_ne!(rev.meta.id, e.meta.id);
        assert!(rev.meta.stamp.is_none());
    }
}
