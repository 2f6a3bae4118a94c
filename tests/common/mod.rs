//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Once;

use testkit_suspend::prelude::*;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per test binary.
///
/// Filtered by `RUST_LOG`; silent by default.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Errors surfaced by the test doubles below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    Unavailable(String),
    Harness(Error),
}

impl From<Error> for ServiceError {
    fn from(error: Error) -> Self {
        ServiceError::Harness(error)
    }
}

impl ServiceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Harness(error) if error.is_cancelled())
    }
}

/// A storage double whose calls park in a ledger.
#[derive(Clone)]
pub struct StoreDouble {
    pub ledger: Ledger,
}

impl StoreDouble {
    pub fn new(ledger: &Ledger) -> Self {
        Self {
            ledger: ledger.clone(),
        }
    }

    pub async fn load(&self, key: &'static str) -> Result<String, ServiceError> {
        let (_, parked) = self.ledger.record_tagged(params![key], "load");
        parked.await
    }

    pub async fn delete(&self, key: &'static str) -> Result<(), ServiceError> {
        let (_, parked) = self.ledger.record_tagged(params![key], "delete");
        parked.await
    }

    pub async fn watch(&self, key: &'static str) -> Result<u32, ServiceError> {
        let (_, parked) = self.ledger.record_cancelable_tagged(params![key], "watch");
        parked.await
    }
}
