//! Cooperative scheduler for deterministic async tests
//!
//! This module provides a [`TestExecutor`]: a single-threaded executor that
//! polls ready tasks in FIFO order and owns a virtual
//! [`MockClock`](crate::clock::MockClock). Unlike production executors it
//! never runs anything on its own; tests drive it with [`TestExecutor::step`],
//! [`TestExecutor::run_until_stalled`], or [`TestExecutor::block_on`].
//!
//! # Example
//!
//! ```rust
//! use testkit_suspend::executor::{yield_now, TestExecutor};
//!
//! let executor = TestExecutor::new();
//!
//! // Spawn tasks - they don't run automatically
//! let first = executor.spawn(async {
//!     yield_now().await;
//!     1
//! });
//! let second = executor.spawn(async { 2 });
//!
//! assert_eq!(executor.pending_count(), 2);
//!
//! executor.step(); // first runs until its yield
//! executor.step(); // second completes
//! assert!(second.is_finished() && !first.is_finished());
//! ```

mod context;
mod task;
mod test_executor;
mod yield_now;

pub use context::current;
pub use task::{Finished, Join, JoinError, TaskHandle, TaskId, TaskInfo, TaskState};
pub use test_executor::TestExecutor;
pub use yield_now::{yield_now, YieldNow};
