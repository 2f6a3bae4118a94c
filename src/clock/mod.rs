//! Virtual time for the cooperative scheduler
//!
//! The `clock` module provides [`MockClock`](crate::clock::MockClock), the
//! virtual clock owned by every [`TestExecutor`](crate::executor::TestExecutor),
//! and [`timeout`], the bounded wait used by ledger result queries.
//!
//! # Example
//!
//! ```rust
//! use testkit_suspend::clock::MockClock;
//! use std::time::Duration;
//!
//! let clock = MockClock::new();
//! assert_eq!(clock.now(), Duration::ZERO);
//!
//! clock.advance(Duration::from_secs(10));
//! assert_eq!(clock.now(), Duration::from_secs(10));
//! ```

mod mock_clock;
mod sleep;
mod timeout;

pub use mock_clock::MockClock;
pub use sleep::MockSleep;
pub use timeout::{timeout, Timeout};
