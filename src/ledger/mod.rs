//! Request ledger and suspension handles
//!
//! A [`Ledger`] is the table a test double writes to. Each call the system
//! under test makes into the double becomes an entry with a zero-based index,
//! its recorded [`Params`], an optional tag, and a suspension handle the
//! double returns to its caller:
//!
//! - [`Continuation`] - single-shot; the caller awaits it inline.
//! - [`Subscription`] - cancelable; dropping it while pending cancels the
//!   entry.
//!
//! The test then resolves entries by index. A resolution is visible in
//! [`Ledger::state_at`] as soon as the resolve call returns; the parked caller
//! runs its continuation the next time the scheduler polls it.
//!
//! # Example
//!
//! ```rust
//! use testkit_suspend::error::Error;
//! use testkit_suspend::executor::TestExecutor;
//! use testkit_suspend::ledger::{Ledger, Outcome};
//! use testkit_suspend::params;
//!
//! let ledger = Ledger::new();
//! let double = ledger.clone();
//!
//! TestExecutor::new().block_on(async move {
//!     let (index, parked) = double.record::<u32, Error>(params!["user-1"]);
//!     assert_eq!(index, 0);
//!
//!     double.resolve_success(index, 7u32);
//!     assert_eq!(parked.await, Ok(7));
//!     assert_eq!(double.result(index).await, Ok(Outcome::Success));
//! });
//!
//! assert_eq!(ledger.call_count(), 1);
//! assert_eq!(ledger.parameters_at(0).unwrap().get::<&str>(0), Some(&"user-1"));
//! ```

mod continuation;
mod delivery;
mod params;
mod state;
mod subscription;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use futures::channel::{mpsc, oneshot};
use parking_lot::Mutex;

use crate::clock;
use crate::error::{Error, Result};
use crate::runtime::{self, TimeSource};

use delivery::{Delivery, Sink};

pub use continuation::Continuation;
pub use delivery::Payload;
pub use params::{Param, Params};
pub use state::{Outcome, RequestRecord, RequestState};
pub use subscription::Subscription;

/// Bound for [`Ledger::result`] and the acknowledgement wait of
/// [`Ledger::complete`] / [`Ledger::fail`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Append-only, index-addressed table of recorded calls.
///
/// Clones share the same table, so a test double and the test body can each
/// hold one.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<Mutex<LedgerState>>,
}

struct LedgerState {
    entries: Vec<Entry>,
    issues: Vec<Error>,
    default_timeout: Duration,
    time_source: Option<Arc<dyn TimeSource>>,
}

struct Entry {
    tag: Option<String>,
    params: Params,
    state: RequestState,
    sink: Sink,
    acknowledged: bool,
    failure: Option<String>,
    watchers: Vec<Waker>,
}

impl Entry {
    fn register(&mut self, waker: &Waker) {
        if !self.watchers.iter().any(|w| w.will_wake(waker)) {
            self.watchers.push(waker.clone());
        }
    }
}

/// Side effects of a state transition, applied once the lock is released.
struct Settlement {
    sink: Sink,
    delivery: Delivery,
    watchers: Vec<Waker>,
}

impl Settlement {
    fn take(entry: &mut Entry, mut delivery: Delivery) -> Self {
        entry.state = RequestState::Resolved(delivery.outcome());
        if let Delivery::Failure(payload) = &mut delivery {
            entry.failure = payload.take_debug();
        }
        Self {
            sink: mem::replace(&mut entry.sink, Sink::Spent),
            delivery,
            watchers: mem::take(&mut entry.watchers),
        }
    }

    fn apply(self) -> bool {
        let delivered = self.sink.deliver(self.delivery);
        for waker in self.watchers {
            waker.wake();
        }
        delivered
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resolution {
    Rejected,
    Delivered,
    Undelivered,
}

/// What a resolve call does with an entry that is no longer pending.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OnResolved {
    RecordIssue,
    Ignore,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerState {
                entries: Vec::new(),
                issues: Vec::new(),
                default_timeout: DEFAULT_TIMEOUT,
                time_source: None,
            })),
        }
    }

    /// Sets the bound used by [`result`](Self::result) and the
    /// acknowledgement wait of [`complete`](Self::complete) /
    /// [`fail`](Self::fail).
    #[must_use]
    pub fn with_default_timeout(self, timeout: Duration) -> Self {
        self.inner.lock().default_timeout = timeout;
        self
    }

    /// Uses `source` for bounded waits instead of the ambient executor clock
    /// or Tokio.
    #[must_use]
    pub fn with_time_source(self, source: impl TimeSource + 'static) -> Self {
        self.inner.lock().time_source = Some(Arc::new(source));
        self
    }

    /// The bound used by [`result`](Self::result).
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.inner.lock().default_timeout
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Records a call and returns its index with a single-shot handle.
    pub fn record<T, E>(&self, params: Params) -> (usize, Continuation<T, E>) {
        self.record_continuation(params, None)
    }

    /// Records a call made through the operation named `tag`.
    pub fn record_tagged<T, E>(
        &self,
        params: Params,
        tag: impl Into<String>,
    ) -> (usize, Continuation<T, E>) {
        self.record_continuation(params, Some(tag.into()))
    }

    /// Records a call and returns its index with a cancelable handle.
    pub fn record_cancelable<T, E>(&self, params: Params) -> (usize, Subscription<T, E>) {
        self.record_subscription(params, None)
    }

    /// Records a cancelable call made through the operation named `tag`.
    pub fn record_cancelable_tagged<T, E>(
        &self,
        params: Params,
        tag: impl Into<String>,
    ) -> (usize, Subscription<T, E>) {
        self.record_subscription(params, Some(tag.into()))
    }

    fn record_continuation<T, E>(
        &self,
        params: Params,
        tag: Option<String>,
    ) -> (usize, Continuation<T, E>) {
        let (sender, receiver) = oneshot::channel();
        let index = self.push(params, tag, Sink::Continuation(sender));
        (index, Continuation::new(index, self.clone(), receiver))
    }

    fn record_subscription<T, E>(
        &self,
        params: Params,
        tag: Option<String>,
    ) -> (usize, Subscription<T, E>) {
        let (sender, receiver) = mpsc::unbounded();
        let index = self.push(params, tag, Sink::Subscription(sender));
        (index, Subscription::new(index, self.clone(), receiver))
    }

    fn push(&self, params: Params, tag: Option<String>, sink: Sink) -> usize {
        let mut state = self.inner.lock();
        let index = state.entries.len();
        tracing::debug!(index, tag = ?tag, ?params, "recorded request");
        state.entries.push(Entry {
            tag,
            params,
            state: RequestState::Pending,
            sink,
            acknowledged: false,
            failure: None,
            watchers: Vec::new(),
        });
        index
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolves the entry at `index` with `value`.
    ///
    /// Returns `false`, recording an issue, if there is no such entry or it
    /// is already resolved.
    pub fn resolve_success<T: Any + Send>(&self, index: usize, value: T) -> bool {
        self.resolve_payload(index, Delivery::Success(Payload::new(value))) != Resolution::Rejected
    }

    /// Resolves the entry at `index` with `error`.
    ///
    /// The entry becomes [`Outcome::Failure`] whatever the error looks like;
    /// only the harness cancels. Returns `false`, recording an issue, if
    /// there is no such entry or it is already resolved.
    pub fn resolve_failure<E: Any + Send + fmt::Debug>(&self, index: usize, error: E) -> bool {
        self.resolve_payload(index, Delivery::Failure(Payload::failure(error)))
            != Resolution::Rejected
    }

    pub(crate) fn resolve_success_payload(&self, index: usize, payload: Payload) -> bool {
        self.resolve_payload(index, Delivery::Success(payload)) != Resolution::Rejected
    }

    pub(crate) fn resolve_failure_payload(&self, index: usize, payload: Payload) -> bool {
        self.resolve_payload(index, Delivery::Failure(payload)) != Resolution::Rejected
    }

    fn resolve_payload(&self, index: usize, delivery: Delivery) -> Resolution {
        self.settle(index, delivery, OnResolved::RecordIssue)
    }

    fn settle(&self, index: usize, delivery: Delivery, on_resolved: OnResolved) -> Resolution {
        let settled = {
            let mut state = self.inner.lock();
            let count = state.entries.len();
            match state.entries.get_mut(index) {
                None => Err(Error::MissingEntry { index, count }),
                Some(entry) => match entry.state {
                    RequestState::Resolved(outcome) => Err(Error::AlreadyResolved { index, outcome }),
                    RequestState::Pending => {
                        let outcome = delivery.outcome();
                        tracing::debug!(index, tag = ?entry.tag, %outcome, "resolved request");
                        Ok(Settlement::take(entry, delivery))
                    }
                },
            }
        };

        match settled {
            Ok(settlement) => {
                if settlement.apply() {
                    Resolution::Delivered
                } else {
                    Resolution::Undelivered
                }
            }
            Err(Error::AlreadyResolved { .. }) if on_resolved == OnResolved::Ignore => {
                Resolution::Rejected
            }
            Err(error) => {
                self.record_issue(error);
                Resolution::Rejected
            }
        }
    }

    /// Resolves every pending entry as [`Outcome::Cancelled`].
    ///
    /// Resolved entries keep their outcome. Returns how many entries were
    /// cancelled.
    pub fn cancel_all_pending(&self) -> usize {
        let settlements: Vec<Settlement> = {
            let mut state = self.inner.lock();
            state
                .entries
                .iter_mut()
                .filter(|entry| entry.state.is_pending())
                .map(|entry| Settlement::take(entry, Delivery::Cancelled))
                .collect()
        };

        let count = settlements.len();
        if count > 0 {
            tracing::debug!(count, "cancelled pending requests");
        }
        for settlement in settlements {
            settlement.apply();
        }
        count
    }

    /// Alias of [`cancel_all_pending`](Self::cancel_all_pending).
    pub fn cancel_pending_requests(&self) -> usize {
        self.cancel_all_pending()
    }

    /// Cancels the entry if its caller dropped the handle while pending.
    pub(crate) fn abandon(&self, index: usize) {
        if self.settle(index, Delivery::Cancelled, OnResolved::Ignore) != Resolution::Rejected {
            tracing::debug!(index, "request abandoned by its caller");
        }
    }

    /// Marks the entry's terminal value as observed by its caller.
    pub(crate) fn acknowledge(&self, index: usize) {
        let watchers = {
            let mut state = self.inner.lock();
            match state.entries.get_mut(index) {
                Some(entry) => {
                    entry.acknowledged = true;
                    mem::take(&mut entry.watchers)
                }
                None => Vec::new(),
            }
        };
        for waker in watchers {
            waker.wake();
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Number of recorded calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Number of recorded calls carrying `tag`.
    #[must_use]
    pub fn call_count_for(&self, tag: &str) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.tag.as_deref() == Some(tag))
            .count()
    }

    /// Arguments recorded at `index`.
    #[must_use]
    pub fn parameters_at(&self, index: usize) -> Option<Params> {
        self.inner
            .lock()
            .entries
            .get(index)
            .map(|entry| entry.params.clone())
    }

    /// Tag recorded at `index`.
    #[must_use]
    pub fn tag_at(&self, index: usize) -> Option<String> {
        self.inner
            .lock()
            .entries
            .get(index)
            .and_then(|entry| entry.tag.clone())
    }

    /// State of the entry at `index`.
    #[must_use]
    pub fn state_at(&self, index: usize) -> Option<RequestState> {
        self.inner.lock().entries.get(index).map(|entry| entry.state)
    }

    /// `Debug` rendering of the error a failed entry was resolved with.
    #[must_use]
    pub fn failure_at(&self, index: usize) -> Option<String> {
        self.inner
            .lock()
            .entries
            .get(index)
            .and_then(|entry| entry.failure.clone())
    }

    /// Number of entries still pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.state.is_pending())
            .count()
    }

    /// Indices of entries still pending, ascending.
    #[must_use]
    pub fn pending_indices(&self) -> Vec<usize> {
        self.indices_where(|entry| entry.state.is_pending())
    }

    /// Indices of entries carrying `tag`, ascending.
    #[must_use]
    pub fn indices_for_tag(&self, tag: &str) -> Vec<usize> {
        self.indices_where(|entry| entry.tag.as_deref() == Some(tag))
    }

    fn indices_where(&self, predicate: impl Fn(&Entry) -> bool) -> Vec<usize> {
        self.inner
            .lock()
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| predicate(entry))
            .map(|(index, _)| index)
            .collect()
    }

    /// Snapshot of every entry.
    #[must_use]
    pub fn records(&self) -> Vec<RequestRecord> {
        self.inner
            .lock()
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| RequestRecord {
                index,
                tag: entry.tag.clone(),
                params: entry.params.clone(),
                state: entry.state,
                acknowledged: entry.acknowledged,
                failure: entry.failure.clone(),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Issues
    // ------------------------------------------------------------------

    pub(crate) fn record_issue(&self, error: Error) {
        tracing::warn!(%error, "ledger issue");
        self.inner.lock().issues.push(error);
    }

    /// Harness misuse recorded so far (wrong index, wrong value type, double
    /// resolution, closed suspension).
    #[must_use]
    pub fn issues(&self) -> Vec<Error> {
        self.inner.lock().issues.clone()
    }

    /// Returns and clears the recorded issues.
    pub fn take_issues(&self) -> Vec<Error> {
        mem::take(&mut self.inner.lock().issues)
    }

    /// Panics if any issue was recorded.
    ///
    /// # Panics
    ///
    /// Panics listing every recorded issue.
    #[track_caller]
    pub fn assert_no_issues(&self) {
        let issues = self.issues();
        if !issues.is_empty() {
            panic!("{}", describe_issues(&issues));
        }
    }

    // ------------------------------------------------------------------
    // Bounded waits
    // ------------------------------------------------------------------

    /// Waits, bounded by the default timeout, for the entry at `index` to
    /// resolve and returns its outcome.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the entry is still pending when the bound
    /// elapses, [`Error::MissingEntry`] for an unknown index,
    /// [`Error::NoTimeSource`] if no clock is reachable.
    pub async fn result(&self, index: usize) -> Result<Outcome> {
        self.result_within(index, self.default_timeout()).await
    }

    /// Like [`result`](Self::result) with an explicit bound.
    ///
    /// # Errors
    ///
    /// See [`result`](Self::result).
    pub async fn result_within(&self, index: usize, timeout: Duration) -> Result<Outcome> {
        let source = self.time_source()?;
        clock::timeout(source.as_ref(), timeout, self.wait_for(index, Until::Resolved)).await?
    }

    /// Resolves `index` with `value`, then waits until the parked caller has
    /// observed it, bounded by the default timeout.
    ///
    /// Returns `false` under the same conditions as
    /// [`resolve_success`](Self::resolve_success).
    pub async fn complete<T: Any + Send>(&self, index: usize, value: T) -> bool {
        let resolution = self.resolve_payload(index, Delivery::Success(Payload::new(value)));
        self.await_observed(index, resolution).await
    }

    /// Resolves `index` with `error`, then waits until the parked caller has
    /// observed it, bounded by the default timeout.
    pub async fn fail<E: Any + Send + fmt::Debug>(&self, index: usize, error: E) -> bool {
        let resolution = self.resolve_payload(index, Delivery::Failure(Payload::failure(error)));
        self.await_observed(index, resolution).await
    }

    async fn await_observed(&self, index: usize, resolution: Resolution) -> bool {
        match resolution {
            Resolution::Rejected => false,
            Resolution::Undelivered => true,
            Resolution::Delivered => {
                let Ok(source) = self.time_source() else {
                    tracing::debug!(index, "no time source, not waiting for the caller");
                    return true;
                };
                let timeout = self.default_timeout();
                let wait = self.wait_for(index, Until::Acknowledged);
                if let Err(error) = clock::timeout(source.as_ref(), timeout, wait).await {
                    tracing::warn!(index, %error, "caller did not observe its resolution");
                }
                true
            }
        }
    }

    fn time_source(&self) -> Result<Arc<dyn TimeSource>> {
        let configured = self.inner.lock().time_source.clone();
        match configured {
            Some(source) => Ok(source),
            None => runtime::ambient_time_source(),
        }
    }

    fn wait_for(&self, index: usize, until: Until) -> WaitFor {
        WaitFor {
            ledger: self.clone(),
            index,
            until,
        }
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Ledger")
            .field("calls", &state.entries.len())
            .field(
                "pending",
                &state.entries.iter().filter(|e| e.state.is_pending()).count(),
            )
            .field("issues", &state.issues.len())
            .finish()
    }
}

pub(crate) fn describe_issues(issues: &[Error]) -> String {
    let mut message = format!("ledger recorded {} issue(s):", issues.len());
    for issue in issues {
        message.push_str("\n  - ");
        message.push_str(&issue.to_string());
    }
    message
}

#[derive(Clone, Copy, Debug)]
enum Until {
    Resolved,
    Acknowledged,
}

/// Parks until an entry resolves (or is acknowledged) without polling in a
/// loop: the entry keeps the waker and wakes it on transition.
struct WaitFor {
    ledger: Ledger,
    index: usize,
    until: Until,
}

impl Future for WaitFor {
    type Output = Result<Outcome>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.ledger.inner.lock();
        let count = state.entries.len();
        let Some(entry) = state.entries.get_mut(self.index) else {
            return Poll::Ready(Err(Error::MissingEntry {
                index: self.index,
                count,
            }));
        };

        match (entry.state, self.until) {
            (RequestState::Resolved(outcome), Until::Resolved) => Poll::Ready(Ok(outcome)),
            (RequestState::Resolved(outcome), Until::Acknowledged) if entry.acknowledged => {
                Poll::Ready(Ok(outcome))
            }
            _ => {
                entry.register(cx.waker());
                Poll::Pending
            }
        }
    }
}
