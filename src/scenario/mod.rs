//! Scenario orchestration
//!
//! A [`Scenario`] runs a test body on a [`TestExecutor`] and sequences its
//! phases: trigger the code under test, let it run to the call it parks on,
//! resolve that call, let the continuation run, assert. Every step that hands
//! control to the code under test yields a fixed number of scheduler turns,
//! so the interleaving is the same on every run.
//!
//! When the body returns, the scenario cleans up on its own. Pending ledger
//! entries are cancelled and the other tasks get turns to react, again and
//! again, until nothing is pending and no task is left. A triggered task that
//! outlives [`ScenarioConfig::cleanup_timeout`] is aborted. Any issue the
//! ledger recorded during the run fails the test.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use testkit_suspend::prelude::*;
//!
//! let ledger = Ledger::new();
//! let seen = Arc::new(Mutex::new(None));
//!
//! let out = Arc::clone(&seen);
//! Scenario::run(&ledger, move |s| async move {
//!     let double = s.ledger().clone();
//!     s.trigger(async move {
//!         let (_, parked) = double.record::<String, Error>(params!["user-1"]);
//!         *out.lock().unwrap() = Some(parked.await);
//!     })
//!     .await;
//!
//!     assert_eq!(s.ledger().call_count(), 1);
//!     s.complete(String::from("Ada")).await;
//! });
//!
//! assert_eq!(*seen.lock().unwrap(), Some(Ok(String::from("Ada"))));
//! assert_eq!(ledger.state_at(0), Some(RequestState::Resolved(Outcome::Success)));
//! ```

mod config;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cascade::{CascadeCursor, CascadeStep, StepEffect};
use crate::clock::MockClock;
use crate::executor::{yield_now, TaskHandle, TaskId, TaskState, TestExecutor};
use crate::ledger::{describe_issues, Ledger};

pub use config::ScenarioConfig;

/// Upper bound on cancel-and-yield rounds during cleanup.
const MAX_CLEANUP_ROUNDS: usize = 10_000;

/// Handle to a running scenario, passed to the scenario body.
///
/// Cheap to clone; clones drive the same scenario.
#[derive(Clone)]
pub struct Scenario {
    inner: Arc<ScenarioInner>,
}

struct ScenarioInner {
    executor: TestExecutor,
    ledger: Ledger,
    config: ScenarioConfig,
    triggered: Mutex<Vec<Box<dyn Triggered>>>,
    cursor: Mutex<CascadeCursor>,
}

/// A triggered task, with its output type erased.
trait Triggered: Send + Sync {
    fn id(&self) -> TaskId;
    fn abort(&self);
}

impl<T: Send + 'static> Triggered for TaskHandle<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn abort(&self) {
        TaskHandle::abort(self);
    }
}

impl Scenario {
    /// Runs `body` against `ledger` with the default configuration on a
    /// fresh executor.
    ///
    /// # Panics
    ///
    /// Panics if the body panics, or if the ledger recorded issues during
    /// the run.
    pub fn run<F, Fut>(ledger: &Ledger, body: F)
    where
        F: FnOnce(Scenario) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::run_with(ledger, ScenarioConfig::default(), body);
    }

    /// Runs `body` against `ledger` with `config` on a fresh executor.
    ///
    /// # Panics
    ///
    /// See [`run`](Self::run).
    pub fn run_with<F, Fut>(ledger: &Ledger, config: ScenarioConfig, body: F)
    where
        F: FnOnce(Scenario) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::run_on(&TestExecutor::new(), ledger, config, body);
    }

    /// Runs `body` on `executor`.
    ///
    /// The executor is driven with [`TestExecutor::block_on`], so any task
    /// still on it when the scenario ends is cancelled.
    ///
    /// # Panics
    ///
    /// See [`run`](Self::run).
    pub fn run_on<F, Fut>(executor: &TestExecutor, ledger: &Ledger, config: ScenarioConfig, body: F)
    where
        F: FnOnce(Scenario) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let _span = tracing::debug_span!("scenario").entered();
        let baseline = ledger.issues().len();
        let fail_on_issues = config.fail_on_issues;

        let scenario = Scenario {
            inner: Arc::new(ScenarioInner {
                executor: executor.clone(),
                ledger: ledger.clone(),
                config,
                triggered: Mutex::new(Vec::new()),
                cursor: Mutex::new(CascadeCursor::new()),
            }),
        };
        let cleanup = scenario.clone();
        let body = body(scenario);

        executor.block_on(async move {
            body.await;
            cleanup.finish().await;
        });
        // Tasks dropped by the executor shutdown can leave entries behind.
        ledger.cancel_all_pending();

        let issues = ledger.issues();
        if fail_on_issues && issues.len() > baseline {
            panic!("scenario failed: {}", describe_issues(&issues[baseline..]));
        }
    }

    /// Starts `operation` as its own task, then yields
    /// [`yield_count`](ScenarioConfig::yield_count) turns so it can run up
    /// to the call it parks on.
    pub async fn trigger<F, T>(&self, operation: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.inner.executor.spawn(operation);
        self.track(handle).await
    }

    /// Like [`trigger`](Self::trigger), with a task name for diagnostics.
    pub async fn trigger_named<F, T>(&self, name: &str, operation: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.inner.executor.spawn_named(name, operation);
        self.track(handle).await
    }

    async fn track<T: Send + 'static>(&self, handle: TaskHandle<T>) -> TaskHandle<T> {
        tracing::debug!(task = %handle.id, "triggered");
        self.inner.triggered.lock().push(Box::new(handle.clone()));
        self.settle().await;
        handle
    }

    /// Calls `operation` directly, then yields like [`trigger`](Self::trigger).
    ///
    /// For code that is synchronous on the surface but spawns work
    /// internally; hand it [`executor`](Self::executor) as its
    /// [`Spawner`](crate::runtime::Spawner). Work spawned that way is not
    /// tracked, but cleanup keeps turning the executor until it has run.
    pub async fn trigger_sync<F, R>(&self, operation: F) -> R
    where
        F: FnOnce() -> R,
    {
        let output = operation();
        self.settle().await;
        output
    }

    /// Yields [`yield_count`](ScenarioConfig::yield_count) turns.
    pub async fn settle(&self) {
        turns(self.inner.config.yield_count).await;
    }

    /// Resolves the entry under the cascade cursor with `value`.
    ///
    /// See [`complete_at`](Self::complete_at).
    pub async fn complete<T: Any + Send>(&self, value: T) -> bool {
        let index = self.cursor();
        self.complete_at(index, value).await
    }

    /// Resolves `index` with `value`, moves the cascade cursor to
    /// `index + 1`, and yields one turn so the parked caller can continue.
    ///
    /// Returns `false` if the ledger rejected the resolution; the rejection
    /// is a recorded issue.
    pub async fn complete_at<T: Any + Send>(&self, index: usize, value: T) -> bool {
        let resolved = self.inner.ledger.resolve_success(index, value);
        self.inner.cursor.lock().resolved(index);
        turns(1).await;
        resolved
    }

    /// Fails the entry under the cascade cursor with `error`.
    pub async fn fail<E: Any + Send + fmt::Debug>(&self, error: E) -> bool {
        let index = self.cursor();
        self.fail_at(index, error).await
    }

    /// Fails `index` with `error`; otherwise like
    /// [`complete_at`](Self::complete_at).
    pub async fn fail_at<E: Any + Send + fmt::Debug>(&self, index: usize, error: E) -> bool {
        let resolved = self.inner.ledger.resolve_failure(index, error);
        self.inner.cursor.lock().resolved(index);
        turns(1).await;
        resolved
    }

    /// Applies `steps` from the cascade cursor, yielding one turn after each
    /// so the caller can issue the call the next step resolves.
    pub async fn cascade<I>(&self, steps: I) -> Vec<StepEffect>
    where
        I: IntoIterator<Item = CascadeStep>,
        I::IntoIter: Send,
    {
        let mut effects = Vec::new();
        for step in steps {
            let effect = self.inner.cursor.lock().apply(&self.inner.ledger, step);
            tracing::trace!(?effect, "cascade step");
            effects.push(effect);
            turns(1).await;
        }
        effects
    }

    /// Cancels every pending ledger entry. Returns how many were cancelled.
    pub fn cancel(&self) -> usize {
        self.inner.ledger.cancel_all_pending()
    }

    /// Index the next [`complete`](Self::complete), [`fail`](Self::fail) or
    /// cascade step targets.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.inner.cursor.lock().position()
    }

    /// The ledger this scenario drives.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    /// The executor the scenario runs on.
    #[must_use]
    pub fn executor(&self) -> &TestExecutor {
        &self.inner.executor
    }

    /// The executor's virtual clock.
    #[must_use]
    pub fn clock(&self) -> MockClock {
        self.inner.executor.clock()
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ScenarioConfig {
        &self.inner.config
    }

    /// Drains the executor: cancels pending entries, then lets every other
    /// task react, repeating until no task is left and nothing is pending.
    ///
    /// Turns only pass in virtual time when every other task is parked; then
    /// the scenario sleeps until the earliest timer or the cleanup deadline,
    /// whichever comes first. Triggered tasks still running at the deadline
    /// are aborted. Untracked work (spawned through `trigger_sync`) is
    /// dropped by the executor shutdown that follows.
    async fn finish(&self) {
        let executor = &self.inner.executor;
        let ledger = &self.inner.ledger;
        let clock = self.clock();
        let deadline = clock.now().saturating_add(self.inner.config.cleanup_timeout);

        for round in 0.. {
            if round == MAX_CLEANUP_ROUNDS {
                tracing::warn!(round, "tasks still busy after cleanup, giving up");
                break;
            }
            let cancelled = ledger.cancel_all_pending();
            if cancelled > 0 {
                tracing::debug!(cancelled, round, "cancelled pending requests");
            }
            yield_now().await;

            // The scenario task is being polled, so it is not counted here.
            if executor.active_count() == 0 && ledger.pending_count() == 0 {
                break;
            }
            if executor.pending_count() > 0 || ledger.pending_count() > 0 {
                continue;
            }

            let now = clock.now();
            if now >= deadline {
                break;
            }
            let wake_at = clock.next_deadline().map_or(deadline, |next| next.min(deadline));
            clock.sleep(wake_at.saturating_sub(now)).await;
        }

        let triggered = mem::take(&mut *self.inner.triggered.lock());
        for task in triggered {
            let id = task.id();
            match executor.task(id).map(|info| info.state) {
                Some(TaskState::Panicked) => {
                    tracing::debug!(task = %id, "ignoring panic of triggered task");
                }
                Some(state) if !state.is_finished() => {
                    let bound = self.inner.config.cleanup_timeout;
                    tracing::warn!(task = %id, ?bound, "triggered task still running, aborting");
                    task.abort();
                }
                _ => {}
            }
        }
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("cursor", &self.cursor())
            .field("triggered", &self.inner.triggered.lock().len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

async fn turns(count: usize) {
    for _ in 0..count {
        yield_now().await;
    }
}
