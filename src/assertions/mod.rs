//! Assertions for parked calls and their outcomes.
//!
//! - [`poll_once`] - Poll a future once without an executor
//! - [`assert_ready!`](crate::assert_ready) - Assert a future is immediately ready
//! - [`assert_pending!`](crate::assert_pending) - Assert a future is not ready
//! - [`assert_outcome!`](crate::assert_outcome) - Assert how a ledger entry resolved
//! - [`assert_request_pending!`](crate::assert_request_pending) - Assert a ledger entry is still pending
//! - [`assert_cancelled!`](crate::assert_cancelled) - Assert a caller saw harness cancellation
//!
//! # Example
//!
//! ```rust
//! use testkit_suspend::prelude::*;
//! use testkit_suspend::{assert_outcome, assert_pending, assert_ready, assert_request_pending};
//!
//! let ledger = Ledger::new();
//! let (index, mut parked) = ledger.record::<u8, Error>(params![]);
//!
//! assert_pending!(&mut parked);
//! assert_request_pending!(ledger, index);
//!
//! ledger.resolve_success(index, 3u8);
//! assert_outcome!(ledger, index, Outcome::Success);
//! assert_eq!(assert_ready!(parked), Ok(3));
//! ```

mod future;
mod outcome;

pub use future::poll_once;
