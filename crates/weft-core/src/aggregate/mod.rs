//! Projections over the event stream.
//!
//! Aggregates hold no authoritative state: each one is a deterministic fold
//! of the events it has received, and replaying the same events in the same
//! order always rebuilds the same value. They register with the log as
//! keyed subscribers so a store fans each event out only to the projections
//! it concerns.
//!
//! Three shapes:
//!
//! - [`ObjectAggregator`]: one entity, tracked by subject id,
//! - [`ListAggregator`]: one ordered collection scoped by `(parent, role)`,
//!   owning an object aggregator per member,
//! - [`IndexedAggregator`]: a list plus an id-keyed lookup cache.

pub mod indexed;
pub mod list;
pub mod object;

pub use indexed::IndexedAggregator;
pub use list::ListAggregator;
pub use object::ObjectAggregator;
