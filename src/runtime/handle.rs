//! Cloneable handle to the process-wide scheduler pool.
//!
//! Frameworks construct one [`SchedulerHandle`] at process start and pass it
//! (by reference or clone) to every component that schedules work, keeping
//! single-instance-per-process semantics without hidden global state. After
//! [`SchedulerHandle::shutdown`], every operation degrades to its failure
//! sentinel, so components racing with teardown need no special handling.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::SchedulerConfig;
use crate::core::error::SchedulerError;
use crate::core::pool::{PoolStats, SchedulerPool};
use crate::core::task::{TaskId, UNLIMITED_RUNS};

/// Shared, cloneable facade over a [`SchedulerPool`].
#[derive(Clone)]
pub struct SchedulerHandle {
    pool: Arc<RwLock<Option<Arc<SchedulerPool>>>>,
}

impl SchedulerHandle {
    /// Build the pool and wrap it in a handle.
    ///
    /// # Errors
    ///
    /// Propagates [`SchedulerError`] from pool construction.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let pool = SchedulerPool::new(config)?;
        Ok(Self {
            pool: Arc::new(RwLock::new(Some(Arc::new(pool)))),
        })
    }

    fn pool(&self) -> Option<Arc<SchedulerPool>> {
        self.pool.read().clone()
    }

    /// Schedule a single run of `body` at `now + delay`.
    ///
    /// Returns [`TaskId::INVALID`] once the handle has been shut down.
    pub fn execute<F>(&self, body: F, delay: Duration) -> TaskId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.pool()
            .map_or(TaskId::INVALID, |pool| pool.execute(body, delay))
    }

    /// Schedule `body` every `interval` with no initial delay, forever.
    pub fn schedule<F>(&self, body: F, interval: Duration) -> TaskId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.schedule_with(body, interval, Duration::ZERO, UNLIMITED_RUNS)
    }

    /// Schedule `body` to first run at `now + delay`, then every `interval`,
    /// for `times` occurrences ([`UNLIMITED_RUNS`] for no limit).
    pub fn schedule_with<F>(
        &self,
        body: F,
        interval: Duration,
        delay: Duration,
        times: u64,
    ) -> TaskId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.pool().map_or(TaskId::INVALID, |pool| {
            pool.schedule(body, interval, delay, times)
        })
    }

    /// Cancel a pending or in-flight task; with `wait`, block until any
    /// in-flight execution has completed.
    pub fn remove(&self, id: TaskId, wait: bool) -> bool {
        self.pool().is_some_and(|pool| pool.remove(id, wait))
    }

    /// Re-arm a queued task with new timing; see
    /// [`SchedulerPool::reset`].
    pub fn reset(&self, id: TaskId, interval: Duration, delay: Duration) -> TaskId {
        self.pool()
            .map_or(TaskId::INVALID, |pool| pool.reset(id, interval, delay))
    }

    /// Current pool activity, if the handle is still active.
    pub fn stats(&self) -> Option<PoolStats> {
        self.pool().map(|pool| pool.stats())
    }

    /// Whether the handle still owns an active pool.
    pub fn is_active(&self) -> bool {
        self.pool.read().is_some()
    }

    /// Tear the pool down; clones of this handle observe the teardown and
    /// return sentinels from then on.
    pub fn shutdown(&self) {
        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            pool.shutdown();
        }
    }
}
