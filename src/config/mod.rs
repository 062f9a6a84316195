//! Configuration models for pool sizing and worker naming.

pub mod scheduler;

pub use scheduler::{SchedulerConfig, DEFAULT_MAX_WORKERS, DEFAULT_MIN_WORKERS};
