use std::time::Duration;

/// Execution settings of a [`Db`](crate::Db).
///
/// Defaults to no timeout and no slow-query reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbConfig {
    /// Per-statement timeout. `None` means no timeout.
    pub query_timeout: Option<Duration>,
    /// Statements slower than this trigger `on_slow_query`.
    pub slow_query_threshold: Option<Duration>,
}

impl DbConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-statement timeout.
    ///
    /// A statement exceeding it is cancelled on the server (best effort) and fails with
    /// [`OrmError::Timeout`](crate::OrmError::Timeout); the remaining statements of the
    /// same logical query are not issued.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn without_query_timeout(mut self) -> Self {
        self.query_timeout = None;
        self
    }
}
