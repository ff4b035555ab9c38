use std::fmt;

/// Machine-readable fault codes for recoverable-but-notable defects.
///
/// Faults are never fatal: a single corrupt historical event must not take
/// down a whole projection, so every fault is reported to the telemetry sink
/// and the triggering operation degrades to a no-op or best-effort
/// continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// An event came back from the append path without a stamp.
    MissingStamp,
    /// `end_batch` was called with no batch open.
    UnbalancedBatch,
    /// `end_batch` was called with an id that does not match the open batch.
    BatchIdMismatch,
    /// A field-set event named a selector the registry does not know.
    UnknownFieldSelector,
    /// A persisted event failed to decode and was skipped.
    DecodeFailed,
}

impl FaultKind {
    /// Stable code identifier (`W####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingStamp => "W1001",
            Self::UnbalancedBatch => "W1002",
            Self::BatchIdMismatch => "W1003",
            Self::UnknownFieldSelector => "W2001",
            Self::DecodeFailed => "W2002",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MissingStamp => "Event missing stamp after append",
            Self::UnbalancedBatch => "Unbalanced undo-batch nesting",
            Self::BatchIdMismatch => "Undo-batch id mismatch",
            Self::UnknownFieldSelector => "Unknown field selector key",
            Self::DecodeFailed => "Failed to decode persisted event",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error returned when an event fails to encode or decode.
///
/// The codec contract is round-trip fidelity through canonical JSON;
/// anything serde rejects surfaces here.
#[derive(Debug, thiserror::Error)]
#[error("event codec failure: {0}")]
pub struct CodecError(#[from] serde_json::Error);

#[cfg(test)]
mod tests {
    use super::FaultKind;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            FaultKind::MissingStamp,
            FaultKind::UnbalancedBatch,
            FaultKind::BatchIdMismatch,
            FaultKind::UnknownFieldSelector,
            FaultKind::DecodeFailed,
        ];

        let mut seen = HashSet::new();
        for kind in all {
            assert!(seen.insert(kind.code()), "duplicate code {}", kind.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = FaultKind::UnbalancedBatch.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('W'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }
}
