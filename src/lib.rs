//! # testkit-suspend 🧰
//!
//! > Deterministic suspend/resolve testing for async Rust
//!
//! **testkit-suspend** lets a test decide exactly when each call the code
//! under test makes into a test double completes. The double records the call
//! in a [`Ledger`](ledger::Ledger) and parks its caller; the test resolves the
//! call by index with a value, an error, or a cancellation, and every step
//! runs on a single-threaded cooperative executor so the interleaving is the
//! same on every run.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use testkit_suspend::prelude::*;
//!
//! // A test double for a profile service.
//! #[derive(Clone)]
//! struct ProfileDouble {
//!     ledger: Ledger,
//! }
//!
//! impl ProfileDouble {
//!     async fn load(&self, id: &'static str) -> Result<String, Error> {
//!         let (_, parked) = self.ledger.record_tagged(params![id], "load");
//!         parked.await
//!     }
//! }
//!
//! let ledger = Ledger::new();
//! let double = ProfileDouble { ledger: ledger.clone() };
//! let shown = Arc::new(Mutex::new(String::new()));
//!
//! let view = Arc::clone(&shown);
//! Scenario::run(&ledger, move |s| async move {
//!     s.trigger(async move {
//!         if let Ok(name) = double.load("user-1").await {
//!             *view.lock().unwrap() = name;
//!         }
//!     })
//!     .await;
//!
//!     assert_eq!(s.ledger().call_count_for("load"), 1);
//!     s.complete(String::from("Ada")).await;
//! });
//!
//! assert_eq!(*shown.lock().unwrap(), "Ada");
//! ```
//!
//! ## Features
//!
//! - 📒 **Request Ledger** - Index-addressed record of every parked call
//! - ⏸️ **Suspension Handles** - Single-shot and cancelable parked calls
//! - 🎬 **Scenarios** - Trigger, resolve and assert in a fixed order
//! - 🔗 **Cascades** - Complete chains of dependent calls by cursor
//! - 🎮 **Deterministic Executor** - FIFO scheduling with virtual time

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Virtual time and bounded waits
pub mod clock;

pub mod assertions;
pub mod cascade;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod runtime;
pub mod scenario;

/// Prelude for convenient imports
///
/// ```rust
/// use testkit_suspend::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cascade::CascadeStep;
    pub use crate::clock::{timeout, MockClock};
    pub use crate::error::Error;
    pub use crate::executor::{yield_now, TaskHandle, TaskState, TestExecutor};
    pub use crate::ledger::{
        Continuation, Ledger, Outcome, Params, RequestRecord, RequestState, Subscription,
    };
    pub use crate::params;
    pub use crate::runtime::{Spawner, TimeSource};
    pub use crate::scenario::{Scenario, ScenarioConfig};
}

// Re-exports
pub use error::{Error, Result};

// Re-export the test macro when macros feature is enabled
#[cfg(feature = "macros")]
pub use testkit_suspend_macros::test;
