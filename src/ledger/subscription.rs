//! Cancelable, streaming suspension handle.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::channel::mpsc;
use futures::StreamExt;

use super::delivery::Delivery;
use super::Ledger;
use crate::error::Error;

/// A parked call iterating a channel that yields at most one terminal item.
///
/// Returned by [`Ledger::record_cancelable`]. Unlike a
/// [`Continuation`](super::Continuation), abandoning it counts: dropping a
/// subscription whose entry is still pending resolves that entry as
/// [`Outcome::Cancelled`](super::Outcome::Cancelled), which is what happens
/// when the system under test cancels outstanding work.
#[must_use = "futures do nothing unless polled"]
pub struct Subscription<T, E> {
    index: usize,
    ledger: Ledger,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    _output: PhantomData<fn() -> (T, E)>,
}

impl<T, E> Subscription<T, E> {
    pub(crate) fn new(
        index: usize,
        ledger: Ledger,
        receiver: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        Self {
            index,
            ledger,
            receiver,
            _output: PhantomData,
        }
    }

    /// Ledger index of the parked call.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T, E> Future for Subscription<T, E>
where
    T: Any,
    E: From<Error> + Any,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let index = self.index;
        let item = ready!(self.receiver.poll_next_unpin(cx));
        self.ledger.acknowledge(index);

        Poll::Ready(match item {
            Some(delivery) => delivery.unpack(index, &self.ledger),
            None => {
                let error = Error::NoResponse { index };
                self.ledger.record_issue(error.clone());
                Err(E::from(error))
            }
        })
    }
}

impl<T, E> Drop for Subscription<T, E> {
    fn drop(&mut self) {
        self.ledger.abandon(self.index);
    }
}

impl<T, E> fmt::Debug for Subscription<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::ledger::{Ledger, Outcome, RequestState};
    use crate::{assert_pending, assert_ready, params};

    #[derive(Debug, PartialEq)]
    enum FetchError {
        Harness(Error),
        Offline,
    }

    impl From<Error> for FetchError {
        fn from(error: Error) -> Self {
            Self::Harness(error)
        }
    }

    #[test]
    fn test_yields_one_terminal_item() {
        let ledger = Ledger::new();
        let (index, mut parked) = ledger.record_cancelable::<u64, FetchError>(params![]);

        assert_pending!(&mut parked);
        ledger.resolve_success(index, 99u64);

        assert_eq!(assert_ready!(&mut parked), Ok(99));
        assert!(ledger.records()[index].acknowledged);
    }

    #[test]
    fn test_failure_and_cancellation_stay_distinct() {
        let ledger = Ledger::new();
        let (failed, failed_sub) = ledger.record_cancelable::<(), FetchError>(params![]);
        let (_, cancelled_sub) = ledger.record_cancelable::<(), FetchError>(params![]);

        ledger.resolve_failure(failed, FetchError::Offline);
        ledger.cancel_pending_requests();

        assert_eq!(assert_ready!(failed_sub), Err(FetchError::Offline));
        assert_eq!(
            assert_ready!(cancelled_sub),
            Err(FetchError::Harness(Error::Cancelled))
        );
        assert_eq!(ledger.state_at(0), Some(RequestState::Resolved(Outcome::Failure)));
        assert_eq!(ledger.state_at(1), Some(RequestState::Resolved(Outcome::Cancelled)));
    }

    #[test]
    fn test_cancellation_shaped_failure_is_still_a_failure() {
        let ledger = Ledger::new();
        let (index, parked) = ledger.record_cancelable::<(), Error>(params![]);

        ledger.resolve_failure(index, Error::Cancelled);
        assert_eq!(assert_ready!(parked), Err(Error::Cancelled));
        assert_eq!(ledger.state_at(index), Some(RequestState::Resolved(Outcome::Failure)));
    }

    #[test]
    fn test_drop_while_pending_cancels_entry() {
        let ledger = Ledger::new();
        let (index, parked) = ledger.record_cancelable::<(), Error>(params![]);

        drop(parked);
        assert_eq!(ledger.state_at(index), Some(RequestState::Resolved(Outcome::Cancelled)));
        assert!(ledger.issues().is_empty());
    }

    #[test]
    fn test_drop_after_resolution_keeps_outcome() {
        let ledger = Ledger::new();
        let (index, parked) = ledger.record_cancelable::<u8, Error>(params![]);

        ledger.resolve_success(index, 1u8);
        drop(parked);
        assert_eq!(ledger.state_at(index), Some(RequestState::Resolved(Outcome::Success)));
        assert!(ledger.issues().is_empty());
    }
}
