//! Task types for the test executor.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use futures::FutureExt;
use parking_lot::Mutex;

use super::test_executor::ExecutorInner;

/// Unique identifier for a spawned task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Creates a new unique task ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// The current state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Task is waiting to be polled.
    Pending,
    /// Task is currently being polled.
    Running,
    /// Task completed successfully.
    Completed,
    /// Task was aborted or dropped at shutdown.
    Cancelled,
    /// Task panicked while being polled.
    Panicked,
}

impl TaskState {
    /// Returns `true` once the task will never be polled again.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Panicked)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "Pending"),
            TaskState::Running => write!(f, "Running"),
            TaskState::Completed => write!(f, "Completed"),
            TaskState::Cancelled => write!(f, "Cancelled"),
            TaskState::Panicked => write!(f, "Panicked"),
        }
    }
}

/// Information about a task.
#[derive(Clone, Debug)]
pub struct TaskInfo {
    /// The task's unique identifier.
    pub id: TaskId,
    /// Current state of the task.
    pub state: TaskState,
    /// Optional name for debugging.
    pub name: Option<String>,
    /// Number of times this task has been polled.
    pub poll_count: usize,
}

impl TaskInfo {
    pub(crate) fn new(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::Pending,
            name: None,
            poll_count: 0,
        }
    }

    /// Sets a name for the task.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Why a task produced no output.
pub enum JoinError {
    /// The task was aborted, or still unfinished when the executor shut down.
    Cancelled,
    /// The task panicked; carries the panic payload.
    Panicked(Box<dyn Any + Send>),
}

impl JoinError {
    /// Returns `true` if the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the task panicked.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Extracts the panic message when the payload is a string.
    #[must_use]
    pub fn panic_message(&self) -> Option<&str> {
        match self {
            Self::Panicked(payload) => payload
                .downcast_ref::<&'static str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str)),
            Self::Cancelled => None,
        }
    }
}

impl fmt::Debug for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Panicked(_) => f
                .debug_tuple("Panicked")
                .field(&self.panic_message().unwrap_or("<non-string payload>"))
                .finish(),
        }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "task was cancelled"),
            Self::Panicked(_) => write!(
                f,
                "task panicked: {}",
                self.panic_message().unwrap_or("<non-string payload>")
            ),
        }
    }
}

impl std::error::Error for JoinError {}

/// Output slot shared between a task and its handles.
pub(crate) struct JoinSlot<T> {
    output: Option<Result<T, JoinError>>,
    finished: bool,
    wakers: Vec<Waker>,
}

impl<T> JoinSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            output: None,
            finished: false,
            wakers: Vec::new(),
        }
    }

    /// Stores the task's exit. Returns the joiners to wake.
    fn finish(&mut self, exit: Result<T, JoinError>) -> Vec<Waker> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        self.output = Some(exit);
        std::mem::take(&mut self.wakers)
    }

    fn register(&mut self, waker: &Waker) {
        if !self.wakers.iter().any(|w| w.will_wake(waker)) {
            self.wakers.push(waker.clone());
        }
    }
}

/// Handle to a spawned task.
///
/// The handle can check the task's status, abort it, or await its exit with
/// [`join`](TaskHandle::join).
pub struct TaskHandle<T> {
    /// The task's unique identifier.
    pub id: TaskId,
    slot: Arc<Mutex<JoinSlot<T>>>,
    executor: Weak<ExecutorInner>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, slot: Arc<Mutex<JoinSlot<T>>>, executor: Weak<ExecutorInner>) -> Self {
        Self { id, slot, executor }
    }

    /// Takes the task's exit if it has finished.
    ///
    /// Returns `None` if the task hasn't finished yet or the exit was already
    /// taken.
    #[must_use]
    pub fn take(&self) -> Option<Result<T, JoinError>> {
        self.slot.lock().output.take()
    }

    /// Returns true if the task has finished (completed, cancelled or panicked).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.slot.lock().finished
    }

    /// Aborts the task.
    ///
    /// The task's future is dropped without being polled again, which
    /// releases anything it was parked on. No-op for a finished task.
    pub fn abort(&self) {
        if let Some(inner) = self.executor.upgrade() {
            ExecutorInner::abort(&inner, self.id);
        }
    }

    /// Returns a future that resolves with the task's exit.
    #[must_use]
    pub fn join(&self) -> Join<T> {
        Join {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Returns a future that resolves once the task has finished, leaving its
    /// output in place for [`take`](Self::take) or [`join`](Self::join).
    #[must_use]
    pub fn finished(&self) -> Finished<T> {
        Finished {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            slot: Arc::clone(&self.slot),
            executor: Weak::clone(&self.executor),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("is_finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> crate::runtime::TaskJoinHandle for TaskHandle<T> {
    type Output = T;

    fn join(self) -> Pin<Box<dyn Future<Output = Option<T>> + Send>> {
        Box::pin(async move { TaskHandle::join(&self).await.ok() })
    }

    fn abort(&self) {
        TaskHandle::abort(self);
    }

    fn is_finished(&self) -> bool {
        TaskHandle::is_finished(self)
    }
}

/// Future returned by [`TaskHandle::join`].
///
/// Resolves to `Err(JoinError::Cancelled)` if another handle already took
/// the output.
#[must_use = "futures do nothing unless polled"]
pub struct Join<T> {
    slot: Arc<Mutex<JoinSlot<T>>>,
}

impl<T> Future for Join<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();
        if slot.finished {
            return Poll::Ready(slot.output.take().unwrap_or(Err(JoinError::Cancelled)));
        }
        slot.register(cx.waker());
        Poll::Pending
    }
}

/// Future returned by [`TaskHandle::finished`].
#[must_use = "futures do nothing unless polled"]
pub struct Finished<T> {
    slot: Arc<Mutex<JoinSlot<T>>>,
}

impl<T> Future for Finished<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut slot = self.slot.lock();
        if slot.finished {
            return Poll::Ready(());
        }
        slot.register(cx.waker());
        Poll::Pending
    }
}

/// How a task's future ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskExit {
    Completed,
    Panicked,
}

/// Type-erased boxed future.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = TaskExit> + Send>>;

/// Internal task representation.
pub(crate) struct Task {
    pub id: TaskId,
    pub future: BoxFuture,
    pub info: TaskInfo,
    cancel: Box<dyn FnOnce() + Send>,
}

impl Task {
    /// Creates a new task wrapping a future, catching panics into its slot.
    pub fn new<F, T>(future: F, slot: Arc<Mutex<JoinSlot<T>>>) -> Self
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = TaskId::new();
        let info = TaskInfo::new(id);
        let cancel_slot = Arc::clone(&slot);

        let wrapped = async move {
            let (exit, result) = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(output) => (TaskExit::Completed, Ok(output)),
                Err(payload) => (TaskExit::Panicked, Err(JoinError::Panicked(payload))),
            };
            let joiners = slot.lock().finish(result);
            for waker in joiners {
                waker.wake();
            }
            exit
        };

        Self {
            id,
            future: Box::pin(wrapped),
            info,
            cancel: Box::new(move || {
                let joiners = cancel_slot.lock().finish(Err(JoinError::Cancelled));
                for waker in joiners {
                    waker.wake();
                }
            }),
        }
    }

    /// Polls the task once.
    pub fn poll(&mut self, cx: &mut Context<'_>) -> Poll<TaskExit> {
        self.info.state = TaskState::Running;
        self.info.poll_count += 1;

        match self.future.as_mut().poll(cx) {
            Poll::Ready(exit) => {
                self.info.state = match exit {
                    TaskExit::Completed => TaskState::Completed,
                    TaskExit::Panicked => TaskState::Panicked,
                };
                Poll::Ready(exit)
            }
            Poll::Pending => {
                self.info.state = TaskState::Pending;
                Poll::Pending
            }
        }
    }

    /// Marks the task cancelled and drops its future.
    ///
    /// Must not be called while holding any executor lock: dropping the
    /// future may wake other tasks.
    pub fn cancel(self) {
        let Task { future, cancel, .. } = self;
        drop(future);
        cancel();
    }
}
