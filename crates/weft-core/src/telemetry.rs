//! Fault reporting sink.
//!
//! The kernel never aborts on coding/invariant defects (missing stamp after
//! append, unbalanced undo batches, unknown field selectors, undecodable
//! persisted events). Instead it reports them through a [`TelemetrySink`] and
//! keeps operating. Host applications plug in their own sink to surface
//! faults to users or crash reporters; the default routes to `tracing`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::FaultKind;

/// A single reported fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub detail: String,
}

/// Destination for recoverable-but-notable faults.
///
/// Implementations must not panic and must not block; they are called from
/// the synchronous append/apply paths.
pub trait TelemetrySink {
    fn report(&self, kind: FaultKind, message: &str, detail: &str);
}

/// Default sink: forwards every fault to `tracing::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn report(&self, kind: FaultKind, message: &str, detail: &str) {
        tracing::warn!(code = kind.code(), detail, "{message}");
    }
}

/// Sink that records faults in memory, for assertions in tests and for
/// hosts that present faults in their own UI.
#[derive(Debug, Default)]
pub struct CollectingTelemetry {
    faults: RefCell<Vec<Fault>>,
}

impl CollectingTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    #[must_use]
    pub fn faults(&self) -> Vec<Fault> {
        self.faults.borrow().clone()
    }

    /// Number of reported faults of the given kind.
    #[must_use]
    pub fn count_of(&self, kind: FaultKind) -> usize {
        self.faults.borrow().iter().filter(|f| f.kind == kind).count()
    }
}

impl TelemetrySink for CollectingTelemetry {
    fn report(&self, kind: FaultKind, message: &str, detail: &str) {
        self.faults.borrow_mut().push(Fault {
            kind,
            message: message.to_string(),
            detail: detail.to_string(),
        });
    }
}

/// Shared handle to a telemetry sink.
pub type SharedTelemetry = Rc<dyn TelemetrySink>;

/// The default tracing-backed sink as a shared handle.
#[must_use]
pub fn default_sink() -> SharedTelemetry {
    Rc::new(TracingTelemetry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_sink_records_in_order() {
        let sink = CollectingTelemetry::new();
        sink.report(FaultKind::MissingStamp, "first", "a");
        sink.report(FaultKind::UnbalancedBatch, "second", "b");

        let faults = sink.faults();
        assert_eq!(faults.len(), 2);
        assert_eq!(faults[0].kind, FaultKind::MissingStamp);
        assert_eq!(faults[0].message, "first");
        assert_eq!(faults[1].detail, "b");
    }

    #[test]
    fn count_of_filters_by_kind() {
        let sink = CollectingTelemetry::new();
        sink.report(FaultKind::DecodeFailed, "x", "");
        sink.report(FaultKind::DecodeFailed, "y", "");
        sink.report(FaultKind::MissingStamp, "z", "");

        assert_eq!(sink.count_of(FaultKind::DecodeFailed), 2);
        assert_eq!(sink.count_of(FaultKind::MissingStamp), 1);
        assert_eq!(sink.count_of(FaultKind::BatchIdMismatch), 0);
    }

    #[test]
    fn tracing_sink_does_not_panic() {
        TracingTelemetry.report(FaultKind::MissingStamp, "msg", "detail");
    }
}
