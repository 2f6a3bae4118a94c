//! Tokio runtime integration for testkit-suspend.
//!
//! Lets the direct ledger surface run under `#[tokio::test]`: bounded waits
//! fall back to [`TokioTime`] when no [`TestExecutor`] is driving the task,
//! and [`TokioSpawner`] satisfies [`Spawner`] for systems under test that
//! spawn their own work.
//!
//! Tokio gives no ordering guarantee between tasks, so tests that need the
//! scenario's deterministic interleaving should use
//! [`Scenario`](crate::scenario::Scenario) on a [`TestExecutor`] instead.
//!
//! [`TestExecutor`]: crate::executor::TestExecutor

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{Spawner, TaskJoinHandle, TimeSource};

/// Tokio-based time source using real time.
#[derive(Debug, Clone)]
pub struct TokioTime {
    start: ::tokio::time::Instant,
}

impl TokioTime {
    /// Create a new Tokio time source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: ::tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for TokioTime {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(::tokio::time::sleep(duration))
    }
}

/// A Tokio-based task spawner.
#[derive(Debug, Clone, Default)]
pub struct TokioSpawner;

impl TokioSpawner {
    /// Create a new Tokio spawner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Join handle for Tokio tasks.
#[derive(Debug)]
pub struct TokioJoinHandle<T> {
    inner: ::tokio::task::JoinHandle<T>,
}

impl<T: Send + 'static> TaskJoinHandle for TokioJoinHandle<T> {
    type Output = T;

    fn join(self) -> Pin<Box<dyn Future<Output = Option<Self::Output>> + Send>> {
        Box::pin(async move { self.inner.await.ok() })
    }

    fn abort(&self) {
        self.inner.abort();
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl Spawner for TokioSpawner {
    type JoinHandle<T: Send + 'static> = TokioJoinHandle<T>;

    fn spawn<F, T>(&self, future: F) -> Self::JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        TokioJoinHandle {
            inner: ::tokio::spawn(future),
        }
    }
}
