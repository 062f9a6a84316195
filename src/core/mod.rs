//! Core scheduling: task records, the time-ordered queue, and the worker pool.

pub mod error;
pub mod pool;
pub mod queue;
pub mod task;

pub use error::{AppResult, SchedulerError};
pub use pool::{PoolStats, SchedulerPool};
pub use queue::DelayQueue;
pub use task::{Task, TaskFn, TaskId, TimedTask, UNLIMITED_RUNS};
