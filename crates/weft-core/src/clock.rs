//! Per-replica logical clock.
//!
//! A [`LogicalClock`] maps replica ids to monotonically increasing counters
//! and establishes a *causal* (not wall-clock) ordering between events from
//! different replicas. A replica only ever increments its own slot; clocks
//! from merged streams are combined entrywise.
//!
//! Causal comparison (`happened_after`) is a partial order: two clocks can
//! be mutually non-dominating (concurrent). Callers needing a total order
//! for sorted replay break ties with [`LogicalClock::tiebreak_key`], which
//! is deterministic across replicas but carries no causal meaning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use uuid::Uuid;

/// Vector of per-replica counters.
///
/// Stored as a `BTreeMap` so iteration (and therefore serialization and the
/// tiebreak key) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalClock {
    counts: BTreeMap<Uuid, u64>,
}

impl LogicalClock {
    /// A clock with no recorded history. Dominated by every clock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Counter for one replica; absent slots read as zero.
    #[must_use]
    pub fn get(&self, replica: Uuid) -> u64 {
        self.counts.get(&replica).copied().unwrap_or(0)
    }

    /// Number of replicas with a nonzero slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Return a copy with `replica`'s counter advanced by one.
    ///
    /// Pure: the receiver is unchanged. This is the only operation that may
    /// grow a replica's own slot; everything else is entrywise max.
    #[must_use]
    pub fn next(&self, replica: Uuid) -> Self {
        let mut counts = self.counts.clone();
        *counts.entry(replica).or_insert(0) += 1;
        Self { counts }
    }

    /// Entrywise maximum across `self` and all `others`, union of keys.
    #[must_use]
    pub fn merge(&self, others: &[Self]) -> Self {
        let mut counts = self.counts.clone();
        for other in others {
            for (replica, count) in &other.counts {
                let slot = counts.entry(*replica).or_insert(0);
                *slot = (*slot).max(*count);
            }
        }
        Self { counts }
    }

    /// Causal dominance: `self` dominates-or-equals `other` entrywise.
    ///
    /// Two non-empty clocks that share no replica carry no common causal
    /// context and are treated as unordered: this returns `false` both ways
    /// and [`Self::concurrent`] returns `true`. The empty clock is dominated
    /// by every clock, so a foreign stamp can dominate a fresh store.
    #[must_use]
    pub fn happened_after(&self, other: &Self) -> bool {
        if !self.counts.is_empty()
            && !other.counts.is_empty()
            && self.counts.keys().all(|k| !other.counts.contains_key(k))
        {
            return false;
        }
        other
            .counts
            .iter()
            .all(|(replica, count)| self.get(*replica) >= *count)
    }

    /// Returns `true` if neither clock causally dominates the other.
    #[must_use]
    pub fn concurrent(&self, other: &Self) -> bool {
        !self.happened_after(other) && !other.happened_after(self)
    }

    /// Deterministic total-order string for tie-breaking between concurrent
    /// clocks: replica ids sorted lexicographically, each rendered as
    /// `replica:counter` with the counter zero-padded to nine digits.
    ///
    /// Never use this to decide causal ordering.
    #[must_use]
    pub fn tiebreak_key(&self) -> String {
        let mut key = String::new();
        for (replica, count) in &self.counts {
            if !key.is_empty() {
                key.push(',');
            }
            let _ = write!(key, "{replica}:{count:09}");
        }
        key
    }
}

impl fmt::Display for LogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.tiebreak_key())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
