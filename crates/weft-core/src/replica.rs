//! Explicit replica identity.
//!
//! Each independent writer (device, user session) owns one slot in the
//! logical clock. The identity is an explicit value threaded into
//! [`crate::store::EventStore::new`] rather than ambient process-wide state,
//! so a store cannot exist without one.

use uuid::Uuid;

/// Identity of the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplicaContext {
    replica: Uuid,
}

impl ReplicaContext {
    /// Wrap an existing replica id (e.g. one restored from app settings).
    #[must_use]
    pub const fn new(replica: Uuid) -> Self {
        Self { replica }
    }

    /// Mint a fresh replica identity.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// The replica's clock slot.
    #[must_use]
    pub const fn replica(&self) -> Uuid {
        self.replica
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_unique() {
        assert_ne!(ReplicaContext::generate(), ReplicaContext::generate());
    }

    #[test]
    fn new_preserves_id() {
        let id = Uuid::new_v4();
        assert_eq!(ReplicaContext::new(id).replica(), id);
    }
}
