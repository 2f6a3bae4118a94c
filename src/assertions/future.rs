use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll};

/// Polls `future` exactly once with a no-op waker.
///
/// This is how a test peeks at a parked call without an executor: a
/// [`Continuation`](crate::ledger::Continuation) is `Pending` until its
/// ledger entry is resolved and `Ready` right after. Nothing is re-polled on
/// wake, so pass `&mut handle` to look at the same handle again later.
///
/// ```rust
/// use std::task::Poll;
/// use testkit_suspend::assertions::poll_once;
/// use testkit_suspend::prelude::*;
///
/// let ledger = Ledger::new();
/// let (index, mut parked) = ledger.record::<u8, Error>(params![]);
/// assert!(poll_once(&mut parked).is_pending());
///
/// ledger.resolve_success(index, 7u8);
/// assert_eq!(poll_once(&mut parked), Poll::Ready(Ok(7)));
/// ```
pub fn poll_once<F: Future>(future: F) -> Poll<F::Output> {
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    pin!(future).poll(&mut cx)
}

/// Polls a handle (or any future) once, requires it to have finished, and
/// evaluates to its output.
///
/// An optional trailing format message is appended to the panic.
///
/// ```rust
/// use testkit_suspend::assert_ready;
/// use testkit_suspend::prelude::*;
///
/// let ledger = Ledger::new();
/// let (index, parked) = ledger.record::<&str, Error>(params!["key"]);
/// ledger.resolve_success(index, "value");
///
/// assert_eq!(assert_ready!(parked), Ok("value"));
/// ```
#[macro_export]
macro_rules! assert_ready {
    ($future:expr) => {{
        match $crate::assertions::poll_once($future) {
            ::std::task::Poll::Ready(output) => output,
            ::std::task::Poll::Pending => panic!("assertion failed: still parked after one poll"),
        }
    }};
    ($future:expr, $($arg:tt)+) => {{
        match $crate::assertions::poll_once($future) {
            ::std::task::Poll::Ready(output) => output,
            ::std::task::Poll::Pending => panic!(
                "assertion failed: still parked after one poll: {}",
                format_args!($($arg)+)
            ),
        }
    }};
}

/// Polls a handle (or any future) once and requires it to still be parked.
///
/// ```rust
/// use testkit_suspend::assert_pending;
/// use testkit_suspend::prelude::*;
///
/// let ledger = Ledger::new();
/// let (_, mut parked) = ledger.record::<u8, Error>(params![]);
/// assert_pending!(&mut parked, "nothing resolved entry {}", 0);
/// ```
#[macro_export]
macro_rules! assert_pending {
    ($future:expr) => {{
        if let ::std::task::Poll::Ready(output) = $crate::assertions::poll_once($future) {
            panic!("assertion failed: expected a parked future, got Ready({:?})", output);
        }
    }};
    ($future:expr, $($arg:tt)+) => {{
        if let ::std::task::Poll::Ready(output) = $crate::assertions::poll_once($future) {
            panic!(
                "assertion failed: expected a parked future, got Ready({:?}): {}",
                output,
                format_args!($($arg)+)
            );
        }
    }};
}
