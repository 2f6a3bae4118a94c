//! Cascading completion of dependent calls
//!
//! Completing one request often makes the system under test issue the next
//! one straight away ("delete, then reload"). A cascade completes that chain
//! without the test tracking indices: each [`CascadeStep`] is applied to the
//! entry under the [`CascadeCursor`], which moves past every entry it
//! resolves.
//!
//! [`Scenario::cascade`](crate::scenario::Scenario::cascade) applies a list of
//! steps with one scheduler turn after each, so the entry a step targets has
//! been recorded by the time the step runs.

use std::any::Any;
use std::fmt;

use crate::ledger::{Ledger, Payload};

/// One completion action in a cascade.
pub enum CascadeStep {
    /// Resolve with `()`.
    Void,
    /// Resolve with a value.
    Success(Payload),
    /// Resolve with an error.
    Failure(Payload),
    /// A call that was never issued, typically because an earlier step
    /// failed. Resolves nothing and leaves the cursor in place, so the next
    /// step targets the same index: the entry that was actually recorded
    /// next.
    Skip,
}

impl CascadeStep {
    /// A success step carrying `value`.
    pub fn success<T: Any + Send>(value: T) -> Self {
        Self::Success(Payload::new(value))
    }

    /// A failure step carrying `error`.
    pub fn failure<E: Any + Send + fmt::Debug>(error: E) -> Self {
        Self::Failure(Payload::failure(error))
    }
}

impl fmt::Debug for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeStep::Void => write!(f, "Void"),
            CascadeStep::Success(payload) => f.debug_tuple("Success").field(payload).finish(),
            CascadeStep::Failure(payload) => f.debug_tuple("Failure").field(payload).finish(),
            CascadeStep::Skip => write!(f, "Skip"),
        }
    }
}

/// What applying a step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepEffect {
    /// The entry at this index was resolved.
    Resolved(usize),
    /// The step targeted this index but the ledger rejected it (missing or
    /// already resolved); the rejection is a recorded ledger issue.
    Rejected(usize),
    /// A skip step; nothing changed.
    Skipped,
}

/// Index of the next entry a cascade step resolves.
///
/// Any explicit resolve moves the cursor to the entry after the one it
/// resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CascadeCursor {
    next: usize,
}

impl CascadeCursor {
    /// A cursor at index 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The index the next step targets.
    #[must_use]
    pub fn position(&self) -> usize {
        self.next
    }

    /// Moves the cursor past `index`.
    pub fn resolved(&mut self, index: usize) {
        self.next = index + 1;
    }

    /// Applies one step to `ledger` at the cursor.
    ///
    /// The cursor advances past the target even when the ledger rejects the
    /// resolution, so one bad step does not stall the rest of the cascade.
    pub fn apply(&mut self, ledger: &Ledger, step: CascadeStep) -> StepEffect {
        let index = self.next;
        let resolved = match step {
            CascadeStep::Skip => {
                tracing::trace!(index, "cascade skip");
                return StepEffect::Skipped;
            }
            CascadeStep::Void => ledger.resolve_success(index, ()),
            CascadeStep::Success(payload) => ledger.resolve_success_payload(index, payload),
            CascadeStep::Failure(payload) => ledger.resolve_failure_payload(index, payload),
        };
        self.resolved(index);

        if resolved {
            StepEffect::Resolved(index)
        } else {
            StepEffect::Rejected(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ledger::{Outcome, RequestState};
    use crate::{assert_ready, params};

    #[test]
    fn test_steps_walk_consecutive_entries() {
        let ledger = Ledger::new();
        let (_, first) = ledger.record::<(), Error>(params![]);
        let (_, second) = ledger.record::<u32, Error>(params![]);
        let (_, third) = ledger.record::<(), Error>(params![]);

        let mut cursor = CascadeCursor::new();
        assert_eq!(cursor.apply(&ledger, CascadeStep::Void), StepEffect::Resolved(0));
        assert_eq!(cursor.apply(&ledger, CascadeStep::success(5u32)), StepEffect::Resolved(1));
        assert_eq!(
            cursor.apply(&ledger, CascadeStep::failure(Error::Cancelled)),
            StepEffect::Resolved(2)
        );
        assert_eq!(cursor.position(), 3);

        assert_eq!(assert_ready!(first), Ok(()));
        assert_eq!(assert_ready!(second), Ok(5));
        assert_eq!(assert_ready!(third), Err(Error::Cancelled));
        assert_eq!(ledger.state_at(2), Some(RequestState::Resolved(Outcome::Failure)));
    }

    #[test]
    fn test_skip_consumes_nothing() {
        let ledger = Ledger::new();
        let (_, first) = ledger.record::<&str, Error>(params![]);
        let (_, second) = ledger.record::<&str, Error>(params![]);

        let mut cursor = CascadeCursor::new();
        cursor.apply(&ledger, CascadeStep::success("V"));
        assert_eq!(cursor.apply(&ledger, CascadeStep::Skip), StepEffect::Skipped);
        assert_eq!(cursor.position(), 1);
        cursor.apply(&ledger, CascadeStep::success("W"));

        assert_eq!(assert_ready!(first), Ok("V"));
        assert_eq!(assert_ready!(second), Ok("W"));
        ledger.assert_no_issues();
    }

    #[test]
    fn test_cursor_follows_explicit_resolution() {
        let mut cursor = CascadeCursor::new();
        cursor.resolved(4);
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn test_step_past_the_end_is_rejected() {
        let ledger = Ledger::new();
        let mut cursor = CascadeCursor::new();

        assert_eq!(cursor.apply(&ledger, CascadeStep::Void), StepEffect::Rejected(0));
        assert_eq!(cursor.position(), 1);
        assert_eq!(ledger.issues(), vec![Error::MissingEntry { index: 0, count: 0 }]);
    }

    #[test]
    fn test_debug() {
        assert_eq!(format!("{:?}", CascadeStep::failure("e")), "Failure(\"e\")");
        assert_eq!(format!("{:?}", CascadeStep::success(1u8)), "Success(<u8>)");
        assert_eq!(format!("{:?}", CascadeStep::Skip), "Skip");
    }
}
