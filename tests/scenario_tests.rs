//! Integration tests for scenario orchestration and cascades.

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use common::{init_test_logging, ServiceError, StoreDouble};
use testkit_suspend::cascade::StepEffect;
use testkit_suspend::prelude::*;
use testkit_suspend::{assert_cancelled, assert_outcome};

/// A small view model: shows a document and can delete it.
#[derive(Clone)]
struct DocumentView {
    store: StoreDouble,
    shown: Arc<Mutex<Option<String>>>,
    error: Arc<Mutex<Option<ServiceError>>>,
}

impl DocumentView {
    fn new(ledger: &Ledger) -> Self {
        Self {
            store: StoreDouble::new(ledger),
            shown: Arc::new(Mutex::new(None)),
            error: Arc::new(Mutex::new(None)),
        }
    }

    async fn refresh(&self) {
        match self.store.load("doc").await {
            Ok(body) => *self.shown.lock() = Some(body),
            Err(error) => *self.error.lock() = Some(error),
        }
    }

    /// Deletes, then reloads only if the delete went through.
    async fn delete_and_reload(&self) {
        match self.store.delete("doc").await {
            Ok(()) => self.refresh().await,
            Err(error) => *self.error.lock() = Some(error),
        }
    }

    fn shown(&self) -> Option<String> {
        self.shown.lock().clone()
    }

    fn error(&self) -> Option<ServiceError> {
        self.error.lock().clone()
    }
}

#[test]
fn test_completed_value_reaches_the_caller() {
    init_test_logging();
    let ledger = Ledger::new();
    let view = DocumentView::new(&ledger);

    let sut = view.clone();
    Scenario::run(&ledger, move |s| async move {
        s.trigger(async move { sut.refresh().await }).await;

        assert_eq!(s.ledger().call_count(), 1);
        assert_eq!(s.ledger().call_count_for("load"), 1);
        assert!(s.complete(String::from("X")).await);
    });

    assert_eq!(view.shown(), Some(String::from("X")));
    assert_eq!(view.error(), None);
}

#[test]
fn test_unresolved_call_is_cancelled_on_cleanup() {
    init_test_logging();
    let ledger = Ledger::new();
    let view = DocumentView::new(&ledger);

    let sut = view.clone();
    Scenario::run(&ledger, move |s| async move {
        s.trigger(async move { sut.refresh().await }).await;
    });

    let error = view.error().expect("cleanup should resolve the call");
    assert!(error.is_cancelled());
    assert_outcome!(ledger, 0, Outcome::Cancelled);
    assert_eq!(view.shown(), None);
}

#[test]
fn test_cleanup_cancellation_observed_by_the_task() {
    init_test_logging();
    let ledger = Ledger::new();
    let outcome = Arc::new(Mutex::new(None));

    let store = StoreDouble::new(&ledger);
    let slot = Arc::clone(&outcome);
    Scenario::run(&ledger, move |s| async move {
        s.trigger(async move {
            let result = store.load("never").await;
            *slot.lock() = Some(result);
        })
        .await;
    });

    let result = outcome.lock().take().expect("task ran to completion");
    assert_cancelled!(result.map_err(|error| match error {
        ServiceError::Harness(error) => error,
        ServiceError::Unavailable(reason) => panic!("unexpected failure: {reason}"),
    }));
}

#[test]
fn test_failure_travels_the_callers_error_path() {
    init_test_logging();
    let ledger = Ledger::new();
    let view = DocumentView::new(&ledger);

    let sut = view.clone();
    Scenario::run(&ledger, move |s| async move {
        s.trigger(async move { sut.refresh().await }).await;
        s.fail(ServiceError::Unavailable(String::from("offline"))).await;
    });

    assert_eq!(
        view.error(),
        Some(ServiceError::Unavailable(String::from("offline")))
    );
    assert_outcome!(ledger, 0, Outcome::Failure);
}

#[test]
fn test_cascade_after_a_prior_completion() {
    init_test_logging();
    let ledger = Ledger::new();
    let first = DocumentView::new(&ledger);
    let second = DocumentView::new(&ledger);

    let (a, b) = (first.clone(), second.clone());
    Scenario::run(&ledger, move |s| async move {
        // index 0: a plain load, completed up front
        s.trigger(async move { a.refresh().await }).await;
        s.complete(String::from("U")).await;
        assert_eq!(s.cursor(), 1);

        // index 1: delete, which issues the reload at index 2 once it succeeds
        s.trigger(async move { b.delete_and_reload().await }).await;
        let effects = s
            .cascade([
                CascadeStep::Void,
                CascadeStep::Skip,
                CascadeStep::success(String::from("W")),
            ])
            .await;

        assert_eq!(
            effects,
            vec![
                StepEffect::Resolved(1),
                StepEffect::Skipped,
                StepEffect::Resolved(2),
            ]
        );
        assert_eq!(s.cursor(), 3);
    });

    assert_eq!(first.shown(), Some(String::from("U")));
    assert_eq!(second.shown(), Some(String::from("W")));
    assert_eq!(ledger.call_count_for("delete"), 1);
    assert_eq!(ledger.call_count_for("load"), 2);
}

#[test]
fn test_cascade_resolves_live_calls_in_order() {
    init_test_logging();
    let ledger = Ledger::new();
    let left = DocumentView::new(&ledger);
    let right = DocumentView::new(&ledger);

    let (l, r) = (left.clone(), right.clone());
    Scenario::run(&ledger, move |s| async move {
        s.trigger(async move { l.refresh().await }).await;
        s.trigger(async move { r.refresh().await }).await;
        s.cascade([
            CascadeStep::success(String::from("V")),
            CascadeStep::Skip,
            CascadeStep::success(String::from("W")),
        ])
        .await;
    });

    assert_eq!(left.shown(), Some(String::from("V")));
    assert_eq!(right.shown(), Some(String::from("W")));
    ledger.assert_no_issues();
}

#[test]
fn test_failed_step_skips_the_follow_up() {
    init_test_logging();
    let ledger = Ledger::new();
    let view = DocumentView::new(&ledger);

    let sut = view.clone();
    Scenario::run(&ledger, move |s| async move {
        s.trigger(async move { sut.delete_and_reload().await }).await;
        s.cascade([
            CascadeStep::failure(ServiceError::Unavailable(String::from("locked"))),
            CascadeStep::Skip,
        ])
        .await;
    });

    assert_eq!(ledger.call_count(), 1);
    assert_eq!(
        view.error(),
        Some(ServiceError::Unavailable(String::from("locked")))
    );
}

#[test]
fn test_trigger_sync_with_internal_spawn() {
    init_test_logging();
    let ledger = Ledger::new();
    let view = DocumentView::new(&ledger);

    /// Synchronous entry point that kicks off background work.
    fn start_refresh(spawner: &impl Spawner, view: DocumentView) {
        let _ = spawner.spawn(async move { view.refresh().await });
    }

    let sut = view.clone();
    Scenario::run(&ledger, move |s| async move {
        s.trigger_sync(|| start_refresh(s.executor(), sut)).await;
        assert_eq!(s.ledger().call_count_for("load"), 1);
        s.complete(String::from("synced")).await;
    });

    assert_eq!(view.shown(), Some(String::from("synced")));
}

#[test]
fn test_scenario_on_a_shared_executor() {
    init_test_logging();
    let executor = TestExecutor::with_clock(MockClock::with_start_time(Duration::from_secs(10)));
    let ledger = Ledger::new();
    let view = DocumentView::new(&ledger);

    let sut = view.clone();
    Scenario::run_on(
        &executor,
        &ledger,
        ScenarioConfig::new().yield_count(2),
        move |s| async move {
            s.trigger_named("refresh", async move { sut.refresh().await })
                .await;
            assert_eq!(s.clock().now(), Duration::from_secs(10));
            s.complete(String::from("shared")).await;
        },
    );

    assert_eq!(view.shown(), Some(String::from("shared")));
    assert!(executor.task_by_name("refresh").is_some());
}

#[test]
#[should_panic(expected = "scenario failed")]
fn test_completing_a_missing_call_fails_the_scenario() {
    init_test_logging();
    let ledger = Ledger::new();

    Scenario::run(&ledger, |s| async move {
        s.complete(String::from("nobody asked")).await;
    });
}

#[test]
fn test_explicit_cancel_mid_scenario() {
    init_test_logging();
    let ledger = Ledger::new();
    let view = DocumentView::new(&ledger);

    let sut = view.clone();
    Scenario::run(&ledger, move |s| async move {
        s.trigger(async move { sut.refresh().await }).await;
        assert_eq!(s.cancel(), 1);
        s.settle().await;

        assert!(first_call_cancelled(s.ledger()));
    });

    assert!(view.error().is_some_and(|error| error.is_cancelled()));
}

fn first_call_cancelled(ledger: &Ledger) -> bool {
    ledger.state_at(0) == Some(RequestState::Resolved(Outcome::Cancelled))
}
