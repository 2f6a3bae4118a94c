//! The `TestExecutor` implementation.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake, Waker};

use parking_lot::Mutex;

use super::context;
use super::task::{JoinError, JoinSlot, Task, TaskExit, TaskHandle, TaskId, TaskInfo, TaskState};
use crate::clock::MockClock;
use crate::runtime::Spawner;

/// Upper bound on polls for a single [`TestExecutor::block_on`] call.
const MAX_POLLS: usize = 1_000_000;

/// A single-threaded cooperative executor with deterministic ordering.
///
/// Ready tasks are polled in FIFO order, one poll per [`step`]. A task that
/// returns `Poll::Pending` moves to a waiting list until its waker fires. The
/// executor owns a [`MockClock`]; [`block_on`] advances it to the next sleep
/// deadline whenever every task is parked, so bounded waits elapse in virtual
/// time.
///
/// # Example
///
/// ```rust
/// use testkit_suspend::executor::TestExecutor;
///
/// let executor = TestExecutor::new();
///
/// // Spawn a task
/// let handle = executor.spawn(async { 42 });
///
/// // Task hasn't run yet
/// assert!(!handle.is_finished());
///
/// // Run the task
/// assert!(executor.step());
///
/// // Now we can get the result
/// assert_eq!(handle.take().and_then(Result::ok), Some(42));
/// ```
///
/// [`step`]: TestExecutor::step
/// [`block_on`]: TestExecutor::block_on
#[derive(Clone)]
pub struct TestExecutor {
    inner: Arc<ExecutorInner>,
}

pub(crate) struct ExecutorInner {
    /// Queue of tasks ready to be polled.
    ready_queue: Mutex<VecDeque<Task>>,
    /// Tasks that are waiting (returned Pending).
    waiting: Mutex<Vec<Task>>,
    /// Tasks woken while they were out of both queues (being polled).
    woken: Mutex<HashSet<TaskId>>,
    /// Tasks aborted while they were being polled.
    abort_requested: Mutex<HashSet<TaskId>>,
    /// Information about all tasks (for inspection).
    task_info: Mutex<Vec<TaskInfo>>,
    /// Virtual time for sleeps and bounded waits.
    clock: MockClock,
}

impl TestExecutor {
    /// Creates a new test executor with a fresh clock at time zero.
    ///
    /// # Example
    ///
    /// ```rust
    /// use testkit_suspend::executor::TestExecutor;
    ///
    /// let executor = TestExecutor::new();
    /// assert_eq!(executor.pending_count(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(MockClock::new())
    }

    /// Creates a new executor driving the given clock.
    #[must_use]
    pub fn with_clock(clock: MockClock) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                ready_queue: Mutex::new(VecDeque::new()),
                waiting: Mutex::new(Vec::new()),
                woken: Mutex::new(HashSet::new()),
                abort_requested: Mutex::new(HashSet::new()),
                task_info: Mutex::new(Vec::new()),
                clock,
            }),
        }
    }

    /// Returns a handle to this executor's virtual clock.
    #[must_use]
    pub fn clock(&self) -> MockClock {
        self.inner.clock.clone()
    }

    /// Spawns a future on this executor.
    ///
    /// The future will not run until you call [`step`], [`run_until_stalled`],
    /// or [`block_on`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use testkit_suspend::executor::TestExecutor;
    ///
    /// let executor = TestExecutor::new();
    ///
    /// let handle = executor.spawn(async {
    ///     1 + 1
    /// });
    ///
    /// assert_eq!(executor.pending_count(), 1);
    /// ```
    ///
    /// [`step`]: TestExecutor::step
    /// [`run_until_stalled`]: TestExecutor::run_until_stalled
    /// [`block_on`]: TestExecutor::block_on
    pub fn spawn<F, T>(&self, future: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_task(None, future)
    }

    /// Spawns a named future on this executor.
    ///
    /// Named tasks are easier to debug and inspect.
    pub fn spawn_named<F, T>(&self, name: &str, future: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_task(Some(name), future)
    }

    fn spawn_task<F, T>(&self, name: Option<&str>, future: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::new(Mutex::new(JoinSlot::new()));
        let mut task = Task::new(future, Arc::clone(&slot));
        if let Some(name) = name {
            task.info = task.info.with_name(name);
        }
        let id = task.id;
        tracing::trace!(task = %id, name = ?name, "spawned task");

        self.inner.task_info.lock().push(task.info.clone());
        self.inner.ready_queue.lock().push_back(task);

        TaskHandle::new(id, slot, Arc::downgrade(&self.inner))
    }

    /// Returns the number of tasks that are ready to run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.ready_queue.lock().len()
    }

    /// Returns the number of tasks waiting (returned `Poll::Pending`).
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.inner.waiting.lock().len()
    }

    /// Returns the total number of active tasks (pending + waiting).
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.pending_count() + self.waiting_count()
    }

    /// Returns true if there are no active tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Gets information about a task by its ID.
    ///
    /// # Example
    ///
    /// ```rust
    /// use testkit_suspend::executor::{TestExecutor, TaskState};
    ///
    /// let executor = TestExecutor::new();
    /// let handle = executor.spawn(async { 42 });
    ///
    /// let info = executor.task(handle.id).unwrap();
    /// assert_eq!(info.state, TaskState::Pending);
    /// ```
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<TaskInfo> {
        self.inner
            .task_info
            .lock()
            .iter()
            .find(|info| info.id == id)
            .cloned()
    }

    /// Finds a task by name.
    #[must_use]
    pub fn task_by_name(&self, name: &str) -> Option<TaskInfo> {
        self.inner
            .task_info
            .lock()
            .iter()
            .find(|t| t.name.as_deref() == Some(name))
            .cloned()
    }

    /// Returns information about all tasks.
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.inner.task_info.lock().clone()
    }

    /// Returns the number of tasks in the given state.
    #[must_use]
    pub fn count_in_state(&self, state: TaskState) -> usize {
        self.inner
            .task_info
            .lock()
            .iter()
            .filter(|t| t.state == state)
            .count()
    }

    /// Returns the number of completed tasks.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.count_in_state(TaskState::Completed)
    }

    /// Executes one step: polls a single task from the ready queue.
    ///
    /// Returns `true` if a task was polled, `false` if the ready queue was empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use testkit_suspend::executor::TestExecutor;
    ///
    /// let executor = TestExecutor::new();
    /// let handle = executor.spawn(async { 42 });
    ///
    /// assert!(executor.step());
    /// assert!(handle.is_finished());
    ///
    /// // No more tasks to run
    /// assert!(!executor.step());
    /// ```
    pub fn step(&self) -> bool {
        let Some(mut task) = self.inner.ready_queue.lock().pop_front() else {
            return false;
        };
        let id = task.id;
        self.inner.woken.lock().remove(&id);

        let waker = Waker::from(Arc::new(TaskWaker {
            executor: Arc::downgrade(&self.inner),
            id,
        }));
        let mut cx = Context::from_waker(&waker);

        let poll = {
            let _enter = context::enter(self);
            task.poll(&mut cx)
        };
        self.inner.update_task_info(id, |info| {
            info.state = task.info.state;
            info.poll_count = task.info.poll_count;
        });

        match poll {
            Poll::Ready(exit) => {
                self.inner.abort_requested.lock().remove(&id);
                if exit == TaskExit::Panicked {
                    tracing::warn!(task = %id, name = ?task.info.name, "task panicked");
                }
                drop(task);
            }
            Poll::Pending => {
                if self.inner.abort_requested.lock().remove(&id) {
                    self.inner.update_task_info(id, |info| info.state = TaskState::Cancelled);
                    task.cancel();
                    return true;
                }
                let mut waiting = self.inner.waiting.lock();
                if self.inner.woken.lock().remove(&id) {
                    drop(waiting);
                    self.inner.ready_queue.lock().push_back(task);
                } else {
                    waiting.push(task);
                }
            }
        }
        true
    }

    /// Runs all ready tasks until none are ready.
    ///
    /// Tasks which return `Poll::Pending` move to the waiting list and won't
    /// be re-polled until woken. Time is not advanced.
    ///
    /// Returns the number of times tasks were polled.
    ///
    /// # Example
    ///
    /// ```rust
    /// use testkit_suspend::executor::TestExecutor;
    ///
    /// let executor = TestExecutor::new();
    /// executor.spawn(async { 1 });
    /// executor.spawn(async { 2 });
    /// executor.spawn(async { 3 });
    ///
    /// let polls = executor.run_until_stalled();
    /// assert_eq!(polls, 3);
    /// assert_eq!(executor.pending_count(), 0);
    /// ```
    pub fn run_until_stalled(&self) -> usize {
        let mut count = 0;
        while self.step() {
            count += 1;
        }
        count
    }

    /// Runs for a limited number of steps.
    ///
    /// Returns the actual number of steps taken (may be less if the ready
    /// queue empties first).
    pub fn run_steps(&self, max_steps: usize) -> usize {
        let mut count = 0;
        while count < max_steps && self.step() {
            count += 1;
        }
        count
    }

    /// Runs `future` as the root task until it finishes and returns its output.
    ///
    /// Other tasks spawned on the executor are interleaved with it. When no
    /// task is ready, the clock advances to the next sleep deadline. Once the
    /// root finishes, every remaining task is cancelled and dropped.
    ///
    /// # Panics
    ///
    /// - If the root task panics, the panic resumes on the calling thread
    ///   after shutdown.
    /// - If every task is parked with no pending sleep (deadlock).
    /// - If the root doesn't finish within a fixed poll budget.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use testkit_suspend::executor::TestExecutor;
    ///
    /// let executor = TestExecutor::new();
    /// let clock = executor.clock();
    ///
    /// let value = executor.block_on(async move {
    ///     clock.sleep(Duration::from_secs(60)).await;
    ///     clock.now()
    /// });
    /// assert_eq!(value, Duration::from_secs(60));
    /// ```
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let root = self.spawn_named("root", future);
        let mut polls = 0;

        while !root.is_finished() {
            if self.step() {
                polls += 1;
                if polls > MAX_POLLS {
                    self.shutdown();
                    panic!("executor ran for {MAX_POLLS} polls without finishing the root task");
                }
                continue;
            }

            if let Some(deadline) = self.inner.clock.next_deadline() {
                tracing::debug!(?deadline, "all tasks parked, advancing clock");
                self.inner.clock.advance_to(deadline);
                continue;
            }

            let parked = self.parked_names();
            self.shutdown();
            panic!(
                "Deadlock detected: {} tasks waiting with no pending timers: {parked:?}",
                parked.len()
            );
        }

        self.shutdown();
        match root.take() {
            Some(Ok(value)) => value,
            Some(Err(JoinError::Panicked(payload))) => std::panic::resume_unwind(payload),
            Some(Err(JoinError::Cancelled)) | None => panic!("root task was cancelled"),
        }
    }

    /// Cancels and drops every unfinished task.
    ///
    /// Dropping a task may wake others; those are drained too.
    pub fn shutdown(&self) {
        loop {
            let mut tasks: Vec<Task> = self.inner.ready_queue.lock().drain(..).collect();
            tasks.append(&mut self.inner.waiting.lock());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                tracing::trace!(task = %task.id, "cancelled at shutdown");
                self.inner
                    .update_task_info(task.id, |info| info.state = TaskState::Cancelled);
                task.cancel();
            }
        }
        self.inner.woken.lock().clear();
        self.inner.abort_requested.lock().clear();
    }

    fn parked_names(&self) -> Vec<String> {
        self.inner
            .waiting
            .lock()
            .iter()
            .map(|task| {
                task.info
                    .name
                    .clone()
                    .unwrap_or_else(|| task.id.to_string())
            })
            .collect()
    }
}

impl ExecutorInner {
    /// Updates task info by ID.
    fn update_task_info<F>(&self, id: TaskId, f: F)
    where
        F: FnOnce(&mut TaskInfo),
    {
        let mut infos = self.task_info.lock();
        if let Some(info) = infos.iter_mut().find(|i| i.id == id) {
            f(info);
        }
    }

    fn is_finished(&self, id: TaskId) -> bool {
        self.task_info
            .lock()
            .iter()
            .find(|i| i.id == id)
            .map_or(true, |info| info.state.is_finished())
    }

    /// Removes a task from whichever queue holds it.
    fn unqueue(&self, id: TaskId) -> Option<Task> {
        let mut waiting = self.waiting.lock();
        if let Some(pos) = waiting.iter().position(|t| t.id == id) {
            return Some(waiting.remove(pos));
        }
        drop(waiting);

        let mut ready = self.ready_queue.lock();
        ready
            .iter()
            .position(|t| t.id == id)
            .and_then(|pos| ready.remove(pos))
    }

    pub(crate) fn abort(&self, id: TaskId) {
        match self.unqueue(id) {
            Some(task) => {
                tracing::trace!(task = %id, "aborted");
                self.update_task_info(id, |info| info.state = TaskState::Cancelled);
                task.cancel();
            }
            // Mid-poll: `step` cancels it once the poll returns.
            None if !self.is_finished(id) => {
                self.abort_requested.lock().insert(id);
            }
            None => {}
        }
    }
}

impl Default for TestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestExecutor")
            .field("pending", &self.pending_count())
            .field("waiting", &self.waiting_count())
            .field("now", &self.inner.clock.now())
            .finish()
    }
}

impl Spawner for TestExecutor {
    type JoinHandle<T: Send + 'static> = TaskHandle<T>;

    fn spawn<F, T>(&self, future: F) -> Self::JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        TestExecutor::spawn(self, future)
    }

    fn spawn_named<F, T>(&self, name: &str, future: F) -> Self::JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        TestExecutor::spawn_named(self, name, future)
    }
}

/// Waker implementation that re-queues tasks.
struct TaskWaker {
    executor: Weak<ExecutorInner>,
    id: TaskId,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let Some(executor) = self.executor.upgrade() else {
            return;
        };
        // Lock order: waiting, then woken or ready.
        let mut waiting = executor.waiting.lock();
        if let Some(pos) = waiting.iter().position(|t| t.id == self.id) {
            let task = waiting.remove(pos);
            drop(waiting);
            executor.ready_queue.lock().push_back(task);
        } else {
            // Being polled right now: re-queue once the poll returns.
            executor.woken.lock().insert(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::yield_now;
    use std::time::Duration;

    #[test]
    fn test_new_executor_is_empty() {
        let executor = TestExecutor::new();
        assert!(executor.is_empty());
        assert_eq!(executor.pending_count(), 0);
        assert_eq!(executor.waiting_count(), 0);
        assert_eq!(executor.clock().now(), Duration::ZERO);
    }

    #[test]
    fn test_step_runs_task() {
        let executor = TestExecutor::new();
        let handle = executor.spawn(async { 42 });

        assert!(!handle.is_finished());
        assert!(executor.step());
        assert!(handle.is_finished());
        assert_eq!(handle.take().and_then(Result::ok), Some(42));
        assert!(!executor.step());
    }

    #[test]
    fn test_run_until_stalled_is_fifo() {
        let executor = TestExecutor::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            executor.spawn(async move {
                order.lock().push(n);
                yield_now().await;
                order.lock().push(n + 10);
            });
        }

        assert_eq!(executor.run_until_stalled(), 6);
        assert_eq!(*order.lock(), vec![0, 1, 2, 10, 11, 12]);
    }

    #[test]
    fn test_task_info() {
        let executor = TestExecutor::new();
        let handle = executor.spawn_named("worker", async { 42 });

        let info = executor.task(handle.id).unwrap();
        assert_eq!(info.state, TaskState::Pending);
        assert_eq!(info.poll_count, 0);

        executor.step();

        let info = executor.task_by_name("worker").unwrap();
        assert_eq!(info.id, handle.id);
        assert_eq!(info.state, TaskState::Completed);
        assert_eq!(info.poll_count, 1);
        assert_eq!(executor.completed_count(), 1);
    }

    #[test]
    fn test_self_wake_requeues() {
        let executor = TestExecutor::new();
        let handle = executor.spawn(async {
            for _ in 0..2 {
                yield_now().await;
            }
            "done"
        });

        executor.run_until_stalled();
        assert_eq!(handle.take().and_then(Result::ok), Some("done"));
        assert_eq!(executor.task(handle.id).unwrap().poll_count, 3);
    }

    #[test]
    fn test_pending_task_moves_to_waiting() {
        let executor = TestExecutor::new();
        let handle = executor.spawn(std::future::pending::<()>());

        executor.step();
        assert!(!handle.is_finished());
        assert_eq!(executor.waiting_count(), 1);
        assert_eq!(executor.pending_count(), 0);
    }

    #[test]
    fn test_join_wakes_waiting_task() {
        let executor = TestExecutor::new();
        let worker = executor.spawn(async {
            yield_now().await;
            7
        });
        let joiner = executor.spawn(async move { worker.join().await.ok() });

        executor.run_until_stalled();
        assert_eq!(joiner.take().and_then(Result::ok), Some(Some(7)));
    }

    #[test]
    fn test_abort_waiting_task() {
        let executor = TestExecutor::new();
        let handle = executor.spawn(std::future::pending::<()>());
        executor.run_until_stalled();

        handle.abort();
        assert!(handle.is_finished());
        assert!(executor.is_empty());
        assert_eq!(executor.task(handle.id).unwrap().state, TaskState::Cancelled);
        assert!(handle.take().unwrap().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_abort_finished_task_is_noop() {
        let executor = TestExecutor::new();
        let handle = executor.spawn(async { 1 });
        executor.run_until_stalled();

        handle.abort();
        assert_eq!(executor.task(handle.id).unwrap().state, TaskState::Completed);
        assert_eq!(handle.take().and_then(Result::ok), Some(1));
    }

    #[test]
    fn test_task_panic_is_captured() {
        let executor = TestExecutor::new();
        let bad = executor.spawn(async { panic!("system under test failed") });
        let good = executor.spawn(async { 5 });

        executor.run_until_stalled();

        assert_eq!(executor.task(bad.id).unwrap().state, TaskState::Panicked);
        let err = bad.take().unwrap().unwrap_err();
        assert_eq!(err.panic_message(), Some("system under test failed"));
        assert_eq!(good.take().and_then(Result::ok), Some(5));
    }

    #[test]
    fn test_block_on_returns_output() {
        let executor = TestExecutor::new();
        assert_eq!(executor.block_on(async { 1 + 2 }), 3);
    }

    #[test]
    fn test_block_on_advances_clock_when_stalled() {
        let executor = TestExecutor::new();
        let clock = executor.clock();

        let elapsed = executor.block_on(async move {
            clock.sleep(Duration::from_millis(250)).await;
            clock.sleep(Duration::from_millis(750)).await;
            clock.now()
        });

        assert_eq!(elapsed, Duration::from_secs(1));
    }

    #[test]
    fn test_block_on_cancels_leftover_tasks() {
        let executor = TestExecutor::new();
        let spawner = executor.clone();

        let leftover = executor.block_on(async move { spawner.spawn(std::future::pending::<()>()) });

        assert!(executor.is_empty());
        assert!(leftover.take().unwrap().unwrap_err().is_cancelled());
    }

    #[test]
    #[should_panic(expected = "Deadlock detected")]
    fn test_block_on_detects_deadlock() {
        let executor = TestExecutor::new();
        executor.block_on(std::future::pending::<()>());
    }

    #[test]
    #[should_panic(expected = "root failure")]
    fn test_block_on_resumes_root_panic() {
        let executor = TestExecutor::new();
        executor.block_on(async { panic!("root failure") });
    }

    #[test]
    fn test_current_is_set_while_polling() {
        let executor = TestExecutor::new();
        assert!(crate::executor::current().is_none());

        let inside = executor.block_on(async { crate::executor::current().is_some() });
        assert!(inside);
        assert!(crate::executor::current().is_none());
    }

    #[test]
    fn test_spawner_impl() {
        use crate::runtime::TaskJoinHandle;

        fn launch<S: Spawner>(spawner: &S) -> S::JoinHandle<u8> {
            spawner.spawn_named("launched", async { 9 })
        }

        let executor = TestExecutor::new();
        let handle = launch(&executor);
        assert!(executor.task_by_name("launched").is_some());

        let value = executor.block_on(async move { TaskJoinHandle::join(handle).await });
        assert_eq!(value, Some(9));
    }

    #[test]
    fn test_debug() {
        let executor = TestExecutor::new();
        executor.spawn(async { 1 });
        let debug = format!("{:?}", executor);
        assert!(debug.contains("TestExecutor"));
        assert!(debug.contains("pending"));
    }
}
