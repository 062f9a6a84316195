//! Error types for scheduler components.
//!
//! Scheduling operations themselves report failure through sentinel returns
//! (`TaskId::INVALID`, `false`); errors here surface only from construction.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
    /// The scheduler has been torn down.
    #[error("scheduler has been shut down")]
    Shutdown,
    /// No live task exists for the given id.
    #[error("task not found")]
    NotFound,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
