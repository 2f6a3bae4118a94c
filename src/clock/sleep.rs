//! Mock sleep futures.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use super::MockClock;

/// Internal state for managing sleeps.
///
/// Sleeps are keyed by `(deadline, id)` so iteration order is earliest
/// deadline first, ties broken by registration order.
#[derive(Debug, Default)]
pub(crate) struct SleepState {
    pending: BTreeMap<(Duration, u64), Option<Waker>>,
    next_id: u64,
}

impl SleepState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a new sleep and return its ID
    fn register(&mut self, deadline: Duration) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert((deadline, id), None);
        id
    }

    fn update_waker(&mut self, deadline: Duration, id: u64, waker: &Waker) {
        if let Some(slot) = self.pending.get_mut(&(deadline, id)) {
            match slot {
                Some(existing) if existing.will_wake(waker) => {}
                _ => *slot = Some(waker.clone()),
            }
        }
    }

    fn remove(&mut self, deadline: Duration, id: u64) {
        self.pending.remove(&(deadline, id));
    }

    /// Removes every sleep whose deadline has passed and returns their wakers.
    pub(crate) fn take_expired(&mut self, current_time: Duration) -> Vec<Waker> {
        let later = self.pending.split_off(&(current_time, u64::MAX));
        let expired = std::mem::replace(&mut self.pending, later);
        expired.into_values().flatten().collect()
    }

    /// Earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// A future that completes when virtual time advances past its deadline.
///
/// Created by [`MockClock::sleep`]. Dropping an unfinished sleep removes it
/// from the clock, so abandoned sleeps never hold back auto-advance.
#[derive(Debug)]
pub struct MockSleep {
    clock: MockClock,
    deadline: Duration,
    id: Option<u64>,
}

impl MockSleep {
    pub(crate) fn new(clock: MockClock, duration: Duration) -> Self {
        let deadline = clock.now().saturating_add(duration);
        Self {
            clock,
            deadline,
            id: None,
        }
    }

    /// Returns the deadline for this sleep.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Returns the remaining time until this sleep completes.
    ///
    /// Returns `Duration::ZERO` if the deadline has already passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_sub(self.clock.now())
    }

    /// Returns `true` if this sleep has completed.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        self.clock.now() >= self.deadline
    }
}

impl Future for MockSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.clock.now() >= this.deadline {
            if let Some(id) = this.id.take() {
                this.clock.inner.sleeps.lock().remove(this.deadline, id);
            }
            return Poll::Ready(());
        }

        let mut sleeps = this.clock.inner.sleeps.lock();
        let id = *this.id.get_or_insert_with(|| sleeps.register(this.deadline));
        sleeps.update_waker(this.deadline, id, cx.waker());
        Poll::Pending
    }
}

impl Drop for MockSleep {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.clock.inner.sleeps.lock().remove(self.deadline, id);
        }
    }
}
