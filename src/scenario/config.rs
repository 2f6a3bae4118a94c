use std::time::Duration;

/// Configuration for a [`Scenario`](super::Scenario) run.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use testkit_suspend::scenario::ScenarioConfig;
///
/// let config = ScenarioConfig::new()
///     .yield_count(3)
///     .cleanup_timeout(Duration::from_millis(200))
///     .allow_issues();
///
/// assert_eq!(config.yield_count, 3);
/// assert!(!config.fail_on_issues);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    /// Scheduler turns handed back after each trigger.
    pub yield_count: usize,
    /// How long cleanup waits, in virtual time, for each triggered task.
    pub cleanup_timeout: Duration,
    /// Panic after the run if the ledger recorded issues during it.
    pub fail_on_issues: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            yield_count: 1,
            cleanup_timeout: Duration::from_secs(1),
            fail_on_issues: true,
        }
    }
}

impl ScenarioConfig {
    /// Create a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of turns yielded after each trigger.
    #[must_use]
    pub fn yield_count(mut self, turns: usize) -> Self {
        self.yield_count = turns;
        self
    }

    /// Set the per-task cleanup bound.
    #[must_use]
    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    /// Don't fail the run on recorded ledger issues.
    #[must_use]
    pub fn allow_issues(mut self) -> Self {
        self.fail_on_issues = false;
        self
    }
}
