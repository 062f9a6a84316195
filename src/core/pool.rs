//! Worker pool that drains the delay queue and runs tasks at their due time.
//!
//! The pool owns a [`DelayQueue`] plus a bounded set of OS worker threads.
//! Workers block in [`DelayQueue::pop`] (no polling), execute the claimed
//! body without holding any queue lock, re-arm periodic tasks, and signal
//! completion so cancel waiters can proceed. The pool starts at its
//! configured minimum concurrency and grows on demand up to the maximum when
//! a submission finds every worker busy.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::error::SchedulerError;
use crate::core::queue::DelayQueue;
use crate::core::task::{Task, TaskId, TimedTask};

/// How long shutdown waits for each worker before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Snapshot of scheduler activity.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Worker threads currently spawned.
    pub workers: usize,
    /// Live tasks waiting in the queue.
    pub pending: usize,
    /// Total tasks accepted for scheduling.
    pub submitted: u64,
    /// Total task-body executions.
    pub executed: u64,
    /// Total tasks cancelled via remove.
    pub cancelled: u64,
}

/// Thread-safe counters backing [`PoolStats`].
#[derive(Default)]
struct PoolCounters {
    submitted: AtomicU64,
    executed: AtomicU64,
    cancelled: AtomicU64,
}

/// Bounded worker pool executing delayed and periodic tasks.
///
/// All scheduling operations degrade to sentinel returns (`TaskId::INVALID`,
/// `false`) once [`SchedulerPool::shutdown`] has run; none of them panic.
pub struct SchedulerPool {
    config: SchedulerConfig,
    queue: Arc<DelayQueue<Task>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Workers currently blocked in pop, used to decide on-demand growth.
    idle_workers: Arc<AtomicUsize>,
    counters: Arc<PoolCounters>,
    next_id: AtomicU64,
    shutdown: AtomicBool,
}

impl SchedulerPool {
    /// Create a pool and spawn its minimum worker complement.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] for a rejected configuration
    /// and [`SchedulerError::Spawn`] when a worker thread cannot be started.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let pool = Self {
            queue: Arc::new(DelayQueue::new()),
            workers: Mutex::new(Vec::with_capacity(config.max_workers)),
            idle_workers: Arc::new(AtomicUsize::new(0)),
            counters: Arc::new(PoolCounters::default()),
            next_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            config,
        };

        {
            let mut workers = pool.workers.lock();
            for index in 0..pool.config.min_workers {
                let handle = pool
                    .spawn_worker(index)
                    .map_err(|e| SchedulerError::Spawn(e.to_string()))?;
                workers.push(handle);
            }
        }

        info!(
            min_workers = pool.config.min_workers,
            max_workers = pool.config.max_workers,
            "scheduler pool initialized"
        );
        Ok(pool)
    }

    /// Schedule a single run of `body` at `now + delay`.
    ///
    /// A zero delay means "as soon as a worker is free". Returns
    /// [`TaskId::INVALID`] once the pool has been shut down.
    pub fn execute<F>(&self, body: F, delay: Duration) -> TaskId
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return TaskId::INVALID;
        }
        let id = self.allocate_id();
        self.submit(Task::once(id, Arc::new(body), Instant::now() + delay))
    }

    /// Schedule `body` to first run at `now + delay`, then every `interval`,
    /// for `times` occurrences ([`crate::core::task::UNLIMITED_RUNS`] for no
    /// limit).
    ///
    /// Returns [`TaskId::INVALID`] for a zero interval or repeat count, or
    /// once the pool has been shut down.
    pub fn schedule<F>(&self, body: F, interval: Duration, delay: Duration, times: u64) -> TaskId
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) || interval.is_zero() || times == 0 {
            return TaskId::INVALID;
        }
        let id = self.allocate_id();
        self.submit(Task::periodic(
            id,
            Arc::new(body),
            Instant::now() + delay,
            interval,
            times,
        ))
    }

    /// Cancel a pending or in-flight task.
    ///
    /// With `wait`, blocks until any in-flight execution of the id has fully
    /// completed. Returns `false` when the id is unknown, already completed,
    /// or already removed.
    pub fn remove(&self, id: TaskId, wait: bool) -> bool {
        let removed = self.queue.remove(id, wait);
        if removed {
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Re-arm a queued task under its existing id: next run at `now + delay`,
    /// with `interval` replacing the spacing of a periodic task when non-zero.
    ///
    /// The re-timing is a single atomic step on the queue: no worker can
    /// claim the task mid-reset, and a failed reset leaves the task exactly
    /// as it was. Returns the id now owning the schedule, or
    /// [`TaskId::INVALID`] when no queued record exists (unknown, completed,
    /// or currently executing with no queued re-arm). Callers must treat the
    /// returned id as authoritative.
    pub fn reset(&self, id: TaskId, interval: Duration, delay: Duration) -> TaskId {
        if self.shutdown.load(Ordering::Acquire) {
            return TaskId::INVALID;
        }
        let due_at = Instant::now() + delay;
        if self.queue.update(id, |task| task.rearm(due_at, interval)) {
            debug!(task = %id, "task re-armed");
            id
        } else {
            TaskId::INVALID
        }
    }

    /// Current activity counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers.lock().len(),
            pending: self.queue.len(),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Tear the pool down: drop all queued work, stop workers, and join them.
    ///
    /// Already-running bodies are allowed to finish; a worker stuck in a
    /// non-terminating body is detached after a bounded wait. Subsequent
    /// scheduling operations return failure sentinels.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down scheduler pool");
        self.queue.clear();
        self.queue.close();

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (index, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = std::sync::mpsc::channel();
            let joiner = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });
            match rx.recv_timeout(JOIN_TIMEOUT) {
                Ok(true) => {
                    debug!(worker = index, "worker joined");
                    let _ = joiner.join();
                }
                Ok(false) => {
                    warn!(worker = index, "worker panicked");
                    let _ = joiner.join();
                }
                Err(_) => {
                    // The joiner thread is left behind with the stuck worker.
                    warn!(worker = index, "worker did not exit in time, detaching");
                }
            }
        }
        info!(worker_count, "scheduler pool shut down");
    }

    fn allocate_id(&self) -> TaskId {
        TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn submit(&self, task: Task) -> TaskId {
        let id = task.id();
        if !self.queue.push(task) {
            return TaskId::INVALID;
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(task = %id, "task submitted");
        self.grow_if_busy();
        id
    }

    /// Spawn one more worker when a submission finds none idle, up to the
    /// configured maximum.
    fn grow_if_busy(&self) {
        if self.idle_workers.load(Ordering::Relaxed) > 0 {
            return;
        }
        let mut workers = self.workers.lock();
        if workers.len() >= self.config.max_workers {
            return;
        }
        match self.spawn_worker(workers.len()) {
            Ok(handle) => workers.push(handle),
            Err(e) => warn!(error = %e, "failed to grow worker pool"),
        }
    }

    fn spawn_worker(&self, index: usize) -> io::Result<JoinHandle<()>> {
        let queue = Arc::clone(&self.queue);
        let idle = Arc::clone(&self.idle_workers);
        let counters = Arc::clone(&self.counters);
        thread::Builder::new()
            .name(format!("{}-{index}", self.config.worker_name_prefix))
            .spawn(move || worker_loop(index, &queue, &idle, &counters))
    }
}

impl Drop for SchedulerPool {
    fn drop(&mut self) {
        // Signal teardown without joining so dropping a pool with a slow task
        // in flight cannot hang the dropping thread. Explicit shutdown() is
        // required for a joined stop.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.queue.clear();
            self.queue.close();
            debug!("scheduler pool dropped without explicit shutdown; workers detached");
        }
    }
}

/// Worker thread body: claim, execute, re-arm, signal.
fn worker_loop(
    worker: usize,
    queue: &DelayQueue<Task>,
    idle: &AtomicUsize,
    counters: &PoolCounters,
) {
    debug!(worker, "worker started");
    loop {
        idle.fetch_add(1, Ordering::Relaxed);
        let claimed = queue.pop();
        idle.fetch_sub(1, Ordering::Relaxed);
        let Some(mut task) = claimed else {
            break;
        };

        let id = task.id();
        debug!(worker, task = %id, "executing task");
        task.run();
        counters.executed.fetch_add(1, Ordering::Relaxed);

        // push refuses the re-arm when the task was cancelled mid-run.
        if task.advance() && !queue.push(task) {
            debug!(worker, task = %id, "re-arm refused, task cancelled during run");
        }
        queue.finish(id);
    }
    debug!(worker, "worker exiting");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_rejects_zero_min_workers() {
        let config = SchedulerConfig::new().with_min_workers(0);
        assert!(matches!(
            SchedulerPool::new(config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_schedule_rejects_zero_interval_and_times() {
        let pool = SchedulerPool::new(SchedulerConfig::new().with_min_workers(1)).unwrap();
        assert_eq!(
            pool.schedule(|| {}, Duration::ZERO, Duration::ZERO, 1),
            TaskId::INVALID
        );
        assert_eq!(
            pool.schedule(|| {}, Duration::from_millis(10), Duration::ZERO, 0),
            TaskId::INVALID
        );
        pool.shutdown();
    }

    #[test]
    fn test_operations_after_shutdown_return_sentinels() {
        let pool = SchedulerPool::new(SchedulerConfig::new().with_min_workers(1)).unwrap();
        pool.shutdown();
        assert_eq!(pool.execute(|| {}, Duration::ZERO), TaskId::INVALID);
        assert_eq!(
            pool.schedule(|| {}, Duration::from_millis(5), Duration::ZERO, 2),
            TaskId::INVALID
        );
        assert!(!pool.remove(TaskId::new(1), false));
        assert_eq!(
            pool.reset(TaskId::new(1), Duration::from_millis(5), Duration::ZERO),
            TaskId::INVALID
        );
    }

    #[test]
    fn test_stats_track_submissions() {
        let pool = SchedulerPool::new(SchedulerConfig::new().with_min_workers(2)).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&ran);
        let id = pool.execute(
            move || {
                observed.fetch_add(1, Ordering::SeqCst);
            },
            Duration::ZERO,
        );
        assert!(id.is_valid());
        thread::sleep(Duration::from_millis(100));
        let stats = pool.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.executed, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        pool.shutdown();
    }
}
