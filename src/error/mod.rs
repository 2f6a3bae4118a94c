//! Error definitions
//!
//! This module provides the error taxonomy shared by the ledger, the
//! suspension handles and the scenario orchestrator.
//!
//! Errors produced by the harness itself (a wrong index, a mistyped
//! resolution value, a suspension closed without a value) are recorded as
//! issues on the [`Ledger`](crate::ledger::Ledger) so one mistake does not
//! abort the rest of a test. Errors that are the deliberate content of a
//! resolution travel through the caller's own error type instead.

use std::time::Duration;

use thiserror::Error;

use crate::ledger::Outcome;

/// Main error type for testkit-suspend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A suspension's channel closed without ever yielding a terminal value.
    #[error("request {index} closed without a terminal value")]
    NoResponse {
        /// Ledger index of the request.
        index: usize,
    },

    /// A resolution value does not have the type the caller awaits.
    #[error("request {index} expected a `{expected}` resolution but was resolved with `{found}`")]
    IncompatibleResultType {
        /// Ledger index of the request.
        index: usize,
        /// Type the parked caller expected.
        expected: &'static str,
        /// Type the test supplied.
        found: &'static str,
    },

    /// A resolve or query targeted an index with no recorded request.
    #[error("no request recorded at index {index} ({count} recorded)")]
    MissingEntry {
        /// Requested index.
        index: usize,
        /// Number of requests recorded when the lookup happened.
        count: usize,
    },

    /// A resolve targeted a request that already reached a terminal state.
    #[error("request {index} is already {outcome}")]
    AlreadyResolved {
        /// Ledger index of the request.
        index: usize,
        /// The state the request keeps.
        outcome: Outcome,
    },

    /// A bounded wait expired before the request reached a terminal state.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The request was cancelled by the harness.
    #[error("request cancelled by the harness")]
    Cancelled,

    /// A bounded wait was attempted with no time source available.
    #[error("no time source: run inside a TestExecutor, enable the `tokio` feature, or call Ledger::with_time_source")]
    NoTimeSource,
}

impl Error {
    /// Returns `true` for the harness-cancellation kind.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` for the bounded-wait expiry kind.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
