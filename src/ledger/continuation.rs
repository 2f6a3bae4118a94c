//! Single-shot suspension handle.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::channel::oneshot;

use super::delivery::Delivery;
use super::Ledger;
use crate::error::Error;

/// A parked call that resumes exactly once.
///
/// Returned by [`Ledger::record`]. Awaiting it yields the success value or
/// failure the test resolves the entry with; a harness cancellation surfaces
/// as `E::from(Error::Cancelled)`. Dropping a pending continuation leaves its
/// entry pending.
#[must_use = "futures do nothing unless polled"]
pub struct Continuation<T, E> {
    index: usize,
    ledger: Ledger,
    receiver: oneshot::Receiver<Delivery>,
    _output: PhantomData<fn() -> (T, E)>,
}

impl<T, E> Continuation<T, E> {
    pub(crate) fn new(index: usize, ledger: Ledger, receiver: oneshot::Receiver<Delivery>) -> Self {
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

impl<T, E> Future for Continuation<T, E>
where
    T: Any,
    E: From<Error> + Any,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let index = self.index;
        let received = ready!(Pin::new(&mut self.receiver).poll(cx));
        self.ledger.acknowledge(index);

        Poll::Ready(match received {
            Ok(delivery) => delivery.unpack(index, &self.ledger),
            Err(oneshot::Canceled) => {
                let error = Error::NoResponse { index };
                self.ledger.record_issue(error.clone());
                Err(E::from(error))
            }
        })
    }
}

impl<T, E> fmt::Debug for Continuation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::assertions::poll_once;
    use crate::error::Error;
    use crate::ledger::{Ledger, Outcome, RequestState};
    use crate::{assert_pending, assert_ready, params};

    #[test]
    fn test_resumes_with_value() {
        let ledger = Ledger::new();
        let (index, mut parked) = ledger.record::<String, Error>(params!["id"]);

        assert_pending!(&mut parked);
        assert!(ledger.resolve_success(index, String::from("loaded")));

        assert_eq!(assert_ready!(&mut parked), Ok(String::from("loaded")));
        assert!(ledger.records()[0].acknowledged);
    }

    #[test]
    fn test_resumes_with_failure() {
        let ledger = Ledger::new();
        let (index, parked) = ledger.record::<(), Error>(params![]);

        ledger.resolve_failure(index, Error::Timeout(std::time::Duration::from_secs(3)));
        assert_eq!(
            assert_ready!(parked),
            Err(Error::Timeout(std::time::Duration::from_secs(3)))
        );
        assert_eq!(ledger.state_at(index), Some(RequestState::Resolved(Outcome::Failure)));
    }

    #[test]
    fn test_cancel_surfaces_harness_cancellation() {
        let ledger = Ledger::new();
        let (_, parked) = ledger.record::<u32, Error>(params![]);

        assert_eq!(ledger.cancel_all_pending(), 1);
        assert_eq!(assert_ready!(parked), Err(Error::Cancelled));
    }

    #[test]
    fn test_drop_keeps_entry_pending() {
        let ledger = Ledger::new();
        let (index, parked) = ledger.record::<u32, Error>(params![]);
        drop(parked);

        assert_eq!(ledger.state_at(index), Some(RequestState::Pending));
        // The consumer is gone, but the entry still resolves.
        assert!(ledger.resolve_success(index, 1u32));
        assert_eq!(ledger.state_at(index), Some(RequestState::Resolved(Outcome::Success)));
    }

    #[test]
    fn test_wrong_value_type_is_an_issue() {
        let ledger = Ledger::new();
        let (index, parked) = ledger.record::<u32, Error>(params![]);
        ledger.resolve_success(index, "not a number");

        let result = poll_once(parked);
        assert!(matches!(
            result,
            std::task::Poll::Ready(Err(Error::IncompatibleResultType { index: 0, .. }))
        ));
        assert_eq!(ledger.issues().len(), 1);
    }
}
