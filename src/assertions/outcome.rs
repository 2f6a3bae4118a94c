/// Assert that a ledger entry resolved with the given
/// [`Outcome`](crate::ledger::Outcome).
///
/// # Panics
///
/// Panics if the entry is missing, pending, or resolved differently.
///
/// # Example
///
/// ```rust
/// use testkit_suspend::prelude::*;
/// use testkit_suspend::assert_outcome;
///
/// let ledger = Ledger::new();
/// let (index, _parked) = ledger.record::<(), Error>(params![]);
/// ledger.cancel_all_pending();
///
/// assert_outcome!(ledger, index, Outcome::Cancelled);
/// ```
#[macro_export]
macro_rules! assert_outcome {
    ($ledger:expr, $index:expr, $outcome:expr) => {{
        let index: usize = $index;
        let expected: $crate::ledger::Outcome = $outcome;
        match $ledger.state_at(index) {
            ::std::option::Option::Some($crate::ledger::RequestState::Resolved(actual))
                if actual == expected => {}
            ::std::option::Option::Some(state) => panic!(
                "assertion failed: expected request {} to be {}, but it is {}",
                index, expected, state
            ),
            ::std::option::Option::None => panic!(
                "assertion failed: expected request {} to be {}, but it was never recorded",
                index, expected
            ),
        }
    }};
}

/// Assert that a ledger entry exists and is still pending.
///
/// # Panics
///
/// Panics if the entry is missing or resolved.
#[macro_export]
macro_rules! assert_request_pending {
    ($ledger:expr, $index:expr) => {{
        let index: usize = $index;
        match $ledger.state_at(index) {
            ::std::option::Option::Some($crate::ledger::RequestState::Pending) => {}
            ::std::option::Option::Some(state) => panic!(
                "assertion failed: expected request {} to be pending, but it is {}",
                index, state
            ),
            ::std::option::Option::None => panic!(
                "assertion failed: expected request {} to be pending, but it was never recorded",
                index
            ),
        }
    }};
}

/// Assert that a caller's result is the harness-cancellation error.
///
/// Works with any `Result` whose error type has an `is_cancelled()` method,
/// such as [`Error`](crate::Error) itself.
///
/// # Panics
///
/// Panics on `Ok` or on any other error.
///
/// # Example
///
/// ```rust
/// use testkit_suspend::{assert_cancelled, Error};
///
/// let result: Result<(), Error> = Err(Error::Cancelled);
/// assert_cancelled!(result);
/// ```
#[macro_export]
macro_rules! assert_cancelled {
    ($result:expr) => {{
        match $result {
            ::std::result::Result::Err(err) if err.is_cancelled() => {}
            ::std::result::Result::Err(err) => panic!(
                "assertion failed: expected harness cancellation, got Err({:?})",
                err
            ),
            ::std::result::Result::Ok(value) => panic!(
                "assertion failed: expected harness cancellation, got Ok({:?})",
                value
            ),
        }
    }};
}
