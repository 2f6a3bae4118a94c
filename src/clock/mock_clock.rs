//! `MockClock` implementation for virtual time control.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::sleep::{MockSleep, SleepState};
use crate::runtime::TimeSource;

/// A mock clock that provides virtual time for the cooperative scheduler.
///
/// Every [`TestExecutor`](crate::executor::TestExecutor) owns one. Bounded
/// waits such as [`Ledger::result`](crate::ledger::Ledger::result) sleep on
/// it, and the executor advances it to the next deadline whenever every task
/// is parked, so a timeout fires deterministically and without real waiting.
///
/// All clones share the same underlying time state.
///
/// # Example
///
/// ```rust
/// use testkit_suspend::clock::MockClock;
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), Duration::ZERO);
///
/// let clock2 = clock.clone();
/// clock2.advance(Duration::from_secs(5));
/// assert_eq!(clock.now(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    pub(crate) inner: Arc<ClockInner>,
}

#[derive(Debug)]
pub(crate) struct ClockInner {
    current_time: Mutex<Duration>,
    start_time: Duration,
    pub(crate) sleeps: Mutex<SleepState>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Creates a new `MockClock` starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_start_time(Duration::ZERO)
    }

    /// Creates a new `MockClock` starting at the specified time.
    ///
    /// # Example
    ///
    /// ```rust
    /// use testkit_suspend::clock::MockClock;
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::with_start_time(Duration::from_secs(100));
    /// assert_eq!(clock.now(), Duration::from_secs(100));
    /// assert_eq!(clock.elapsed(), Duration::ZERO);
    /// ```
    #[must_use]
    pub fn with_start_time(start: Duration) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                current_time: Mutex::new(start),
                start_time: start,
                sleeps: Mutex::new(SleepState::new()),
            }),
        }
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        *self.inner.current_time.lock()
    }

    /// Returns the virtual time elapsed since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.now().saturating_sub(self.inner.start_time)
    }

    /// Advances the clock by the specified duration, waking expired sleeps.
    ///
    /// # Example
    ///
    /// ```rust
    /// use testkit_suspend::clock::MockClock;
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::new();
    /// clock.advance(Duration::from_secs(10));
    /// clock.advance(Duration::from_millis(500));
    /// assert_eq!(clock.now(), Duration::from_millis(10_500));
    /// ```
    pub fn advance(&self, duration: Duration) {
        let new_time = {
            let mut current = self.inner.current_time.lock();
            *current += duration;
            *current
        };
        self.wake_expired(new_time);
    }

    /// Advances the clock to a specific time.
    ///
    /// Time only moves forward: a target at or before the current time is a
    /// no-op.
    pub fn advance_to(&self, time: Duration) {
        let new_time = {
            let mut current = self.inner.current_time.lock();
            if time > *current {
                *current = time;
            }
            *current
        };
        self.wake_expired(new_time);
    }

    /// Creates a sleep future that completes when virtual time reaches its
    /// deadline.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> MockSleep {
        MockSleep::new(self.clone(), duration)
    }

    /// Returns the number of registered sleeps that have not completed.
    ///
    /// Sleeps register on their first poll, not on creation.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.sleeps.lock().pending_count()
    }

    /// Returns the earliest deadline among registered sleeps.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner.sleeps.lock().next_deadline()
    }

    fn wake_expired(&self, now: Duration) {
        // Wake outside the lock: a woken task may poll a sleep right away.
        let wakers = self.inner.sleeps.lock().take_expired(now);
        for waker in wakers {
            waker.wake();
        }
    }
}

impl TimeSource for MockClock {
    fn now(&self) -> Duration {
        MockClock::now(self)
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(MockClock::sleep(self, duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::Context;

    #[test]
    fn test_new_clock_starts_at_zero() {
        let clock = MockClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(clock.next_deadline(), None);
    }

    #[test]
    fn test_with_start_time() {
        let clock = MockClock::with_start_time(Duration::from_secs(100));
        assert_eq!(clock.now(), Duration::from_secs(100));

        clock.advance(Duration::from_secs(50));
        assert_eq!(clock.elapsed(), Duration::from_secs(50));
    }

    #[test]
    fn test_advance_to_never_goes_backwards() {
        let clock = MockClock::new();
        clock.advance_to(Duration::from_secs(10));
        assert_eq!(clock.now(), Duration::from_secs(10));

        clock.advance_to(Duration::from_secs(5));
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[test]
    fn test_advance_to_wakes_sleeps() {
        let clock = MockClock::new();
        let mut sleep = Box::pin(clock.sleep(Duration::from_secs(2)));
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(sleep.as_mut().poll(&mut cx).is_pending());
        assert_eq!(clock.next_deadline(), Some(Duration::from_secs(2)));

        clock.advance_to(Duration::from_secs(2));
        assert_eq!(clock.pending_count(), 0);
        assert!(sleep.as_mut().poll(&mut cx).is_ready());
    }

    #[test]
    fn test_clone_shares_state() {
        let clock1 = MockClock::new();
        let clock2 = clock1.clone();

        clock1.advance(Duration::from_secs(10));
        assert_eq!(clock2.now(), Duration::from_secs(10));
    }

    #[test]
    fn test_time_source_impl() {
        let clock = MockClock::new();
        let source: &dyn TimeSource = &clock;
        clock.advance(Duration::from_secs(3));
        assert_eq!(source.now(), Duration::from_secs(3));
    }
}
