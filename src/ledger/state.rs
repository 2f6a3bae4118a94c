use std::fmt;

use super::Params;

/// How a request was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Resolved with a value.
    Success,
    /// Resolved with an error supplied by the test.
    Failure,
    /// Cancelled by the harness, or abandoned by its caller.
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "succeeded"),
            Outcome::Failure => write!(f, "failed"),
            Outcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// State of a ledger entry. Moves from `Pending` to `Resolved` at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Recorded, not yet resolved.
    Pending,
    /// Terminal.
    Resolved(Outcome),
}

impl RequestState {
    /// Returns `true` while the request awaits resolution.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The terminal outcome, if resolved.
    #[must_use]
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            Self::Pending => None,
            Self::Resolved(outcome) => Some(outcome),
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Pending => write!(f, "pending"),
            RequestState::Resolved(outcome) => outcome.fmt(f),
        }
    }
}

/// Snapshot of one ledger entry.
#[derive(Clone, Debug)]
pub struct RequestRecord {
    /// Position in the ledger.
    pub index: usize,
    /// Operation label, if the call was tagged.
    pub tag: Option<String>,
    /// Recorded arguments.
    pub params: Params,
    /// State at snapshot time.
    pub state: RequestState,
    /// Whether the parked caller has observed the terminal value.
    pub acknowledged: bool,
    /// `Debug` rendering of the failure, for failed requests.
    pub failure: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_helpers() {
        assert!(RequestState::Pending.is_pending());
        assert_eq!(RequestState::Pending.outcome(), None);

        let failed = RequestState::Resolved(Outcome::Failure);
        assert!(!failed.is_pending());
        assert_eq!(failed.outcome(), Some(Outcome::Failure));
    }

    #[test]
    fn test_display() {
        assert_eq!(RequestState::Pending.to_string(), "pending");
        assert_eq!(RequestState::Resolved(Outcome::Success).to_string(), "succeeded");
        assert_eq!(Outcome::Cancelled.to_string(), "cancelled");
    }
}
