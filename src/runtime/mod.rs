//! Runtime seams for time and task spawning.
//!
//! The ledger and the orchestrator never name a concrete runtime. They use:
//!
//! - [`TimeSource`] - where bounded waits get their clock from
//! - [`Spawner`] - how a system under test launches concurrent work
//!
//! [`TestExecutor`](crate::executor::TestExecutor) and
//! [`MockClock`](crate::clock::MockClock) implement these for the cooperative
//! scheduler boundary. With the `tokio` feature, [`tokio`] provides real-time
//! implementations so the direct ledger surface also works under
//! `#[tokio::test]`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// A source of time for bounded waits.
///
/// # Implementations
///
/// - [`MockClock`](crate::clock::MockClock) - virtual time, auto-advanced by
///   the executor when every task is parked
/// - `TokioTime` - real time (with `tokio` feature)
pub trait TimeSource: Send + Sync {
    /// Get the current time as a duration since an epoch.
    fn now(&self) -> Duration;

    /// Create a future that completes after the given duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// A handle to a spawned task.
pub trait TaskJoinHandle: Send {
    /// The output type of the task.
    type Output;

    /// Wait for the task to finish. `None` if it was aborted or panicked.
    fn join(self) -> Pin<Box<dyn Future<Output = Option<Self::Output>> + Send>>;

    /// Abort the task.
    fn abort(&self);

    /// Check if the task is finished.
    fn is_finished(&self) -> bool;
}

/// A spawner for async tasks.
///
/// Hand one to a system under test whose public API is synchronous but which
/// launches concurrent work internally; the work then lands inside the same
/// scheduler the test drives.
pub trait Spawner: Send + Sync {
    /// The join handle type for spawned tasks.
    type JoinHandle<T: Send + 'static>: TaskJoinHandle<Output = T> + Send;

    /// Spawn a new task.
    fn spawn<F, T>(&self, future: F) -> Self::JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static;

    /// Spawn a new task with a name (for debugging).
    fn spawn_named<F, T>(&self, name: &str, future: F) -> Self::JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let _ = name;
        self.spawn(future)
    }
}

/// Picks the time source for a bounded wait issued from the current context.
///
/// Order: the executor currently polling this task, then Tokio real time when
/// the `tokio` feature is on and a Tokio runtime is running.
pub(crate) fn ambient_time_source() -> Result<Arc<dyn TimeSource>> {
    if let Some(executor) = crate::executor::current() {
        return Ok(Arc::new(executor.clock()));
    }

    #[cfg(feature = "tokio")]
    if ::tokio::runtime::Handle::try_current().is_ok() {
        return Ok(Arc::new(self::tokio::TokioTime::new()));
    }

    Err(Error::NoTimeSource)
}

#[cfg(feature = "tokio")]
pub mod tokio;
