//! Scheduler pool configuration.

use serde::{Deserialize, Serialize};

/// Workers spawned eagerly when not configured explicitly.
pub const DEFAULT_MIN_WORKERS: usize = 5;
/// On-demand growth cap when not configured explicitly.
pub const DEFAULT_MAX_WORKERS: usize = 12;

/// Worker-pool sizing and naming for a scheduler pool.
///
/// Concurrency bounds are fixed at construction; they are not adjustable at
/// runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker threads spawned at construction.
    pub min_workers: usize,
    /// Hard cap on workers grown on demand.
    pub max_workers: usize,
    /// Thread-name prefix for worker threads.
    pub worker_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            worker_name_prefix: "sched-worker".into(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default sizing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the eager worker count.
    #[must_use]
    pub fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        if self.max_workers < min_workers {
            self.max_workers = min_workers;
        }
        self
    }

    /// Set the worker growth cap.
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the worker thread-name prefix.
    #[must_use]
    pub fn with_worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name_prefix = prefix.into();
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first rejected value.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_workers == 0 {
            return Err("min_workers must be greater than 0".into());
        }
        if self.max_workers < self.min_workers {
            return Err("max_workers must be at least min_workers".into());
        }
        if self.worker_name_prefix.is_empty() {
            return Err("worker_name_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse failure or the first rejected value.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
