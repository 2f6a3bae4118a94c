//! Bounded waits against a [`TimeSource`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project::pin_project;

use crate::error::{Error, Result};
use crate::runtime::TimeSource;

/// Wraps `future` so it fails with [`Error::Timeout`] once `duration` has
/// elapsed on `source`.
///
/// The inner future is always polled first, so a future that becomes ready
/// on the same turn as the deadline still wins.
pub fn timeout<F: Future>(source: &dyn TimeSource, duration: Duration, future: F) -> Timeout<F> {
    Timeout {
        future,
        sleep: source.sleep(duration),
        duration,
    }
}

/// Future returned by [`timeout`].
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct Timeout<F> {
    #[pin]
    future: F,
    sleep: Pin<Box<dyn Future<Output = ()> + Send>>,
    duration: Duration,
}

impl<F> Timeout<F> {
    /// The bound this wait was created with.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if let Poll::Ready(value) = this.future.poll(cx) {
            return Poll::Ready(Ok(value));
        }

        match this.sleep.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(Error::Timeout(*this.duration))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F> std::fmt::Debug for Timeout<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}
