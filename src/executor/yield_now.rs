use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Yields control back to the scheduler once.
///
/// On a [`TestExecutor`](super::TestExecutor) the calling task goes to the
/// back of the ready queue, so every task ready before it runs one turn
/// first.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
