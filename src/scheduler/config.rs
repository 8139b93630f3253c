use std::time::Duration;

/// Default number of worker threads
pub const DEFAULT_WORKERS: usize = 4;

/// Default retention of finished tasks
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Scheduler configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker threads, at least one
    pub workers: usize,
    /// How long finished tasks and their results are kept
    pub retention: Duration,
    /// Prefix for worker thread names
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retention: DEFAULT_RETENTION,
            thread_name_prefix: "sim-worker".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}
