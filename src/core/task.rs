//! Task records, identifiers, and the queue's task-type contract.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Sentinel repeat count for tasks that re-arm forever.
pub const UNLIMITED_RUNS: u64 = u64::MAX;

/// Process-unique task identifier.
///
/// Identifiers are allocated by the scheduler; callers hold them only to pass
/// back into `remove`/`reset`. [`TaskId::INVALID`] is the sentinel returned by
/// every scheduling operation that cannot be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Sentinel denoting "no task" / operation failure.
    pub const INVALID: Self = Self(0);

    /// Wrap a raw identifier value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Whether this id can refer to a live task.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque zero-argument unit of work.
pub type TaskFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// Contract the time-ordered queue requires of its task type.
///
/// The queue is parameterized over the record it stores; it only needs an
/// identifier for lookup and cancellation, an absolute due time for ordering,
/// and a validity precondition checked on insertion.
pub trait TimedTask: Clone {
    /// Identifier type used for lookup, cancellation, and the running set.
    type Id: Copy + Eq + Hash + fmt::Debug + Send;

    /// The record's identifier.
    fn id(&self) -> Self::Id;

    /// Absolute time at which the record becomes eligible for retrieval.
    fn due_at(&self) -> Instant;

    /// Whether the record passes the insertion precondition.
    fn is_valid(&self) -> bool;
}

/// A scheduled unit of work together with its timing state.
///
/// One-shot tasks carry no interval and retire after a single run. Periodic
/// tasks re-arm `due_at += interval` after each run until `remaining` reaches
/// zero (or forever, for [`UNLIMITED_RUNS`]).
#[derive(Clone)]
pub struct Task {
    id: TaskId,
    body: TaskFn,
    due_at: Instant,
    interval: Option<Duration>,
    remaining: u64,
}

impl Task {
    /// Create a one-shot task due at `due_at`.
    #[must_use]
    pub fn once(id: TaskId, body: TaskFn, due_at: Instant) -> Self {
        Self {
            id,
            body,
            due_at,
            interval: None,
            remaining: 1,
        }
    }

    /// Create a periodic task: first run at `due_at`, then every `interval`,
    /// for `times` occurrences ([`UNLIMITED_RUNS`] for no limit).
    #[must_use]
    pub fn periodic(id: TaskId, body: TaskFn, due_at: Instant, interval: Duration, times: u64) -> Self {
        Self {
            id,
            body,
            due_at,
            interval: Some(interval),
            remaining: times,
        }
    }

    /// Run the task body on the calling thread.
    pub fn run(&self) {
        (self.body)();
    }

    /// Whether the task re-arms after execution.
    #[must_use]
    pub const fn is_periodic(&self) -> bool {
        self.interval.is_some()
    }

    /// Occurrences left, including the one currently due.
    #[must_use]
    pub const fn runs_remaining(&self) -> u64 {
        self.remaining
    }

    /// Consume one occurrence and re-arm for the next.
    ///
    /// Returns `false` when the task is retired: it has no interval, or its
    /// repeat budget is exhausted. On `true`, `due_at` has advanced by one
    /// interval and the task can be reinserted.
    pub fn advance(&mut self) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };
        if self.remaining != UNLIMITED_RUNS {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                return false;
            }
        }
        self.due_at += interval;
        true
    }

    /// Re-time the task: next run at `due_at`, replacing the interval of a
    /// periodic task when `interval` is non-zero. One-shot tasks keep their
    /// single-run budget.
    pub fn rearm(&mut self, due_at: Instant, interval: Duration) {
        self.due_at = due_at;
        if self.interval.is_some() && !interval.is_zero() {
            self.interval = Some(interval);
        }
    }
}

impl TimedTask for Task {
    type Id = TaskId;

    fn id(&self) -> TaskId {
        self.id
    }

    fn due_at(&self) -> Instant {
        self.due_at
    }

    fn is_valid(&self) -> bool {
        self.id.is_valid()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("due_at", &self.due_at)
            .field("interval", &self.interval)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TaskFn {
        Arc::new(|| {})
    }

    #[test]
    fn test_invalid_id_sentinel() {
        assert!(!TaskId::INVALID.is_valid());
        assert!(TaskId::new(1).is_valid());
        assert_eq!(format!("{}", TaskId::new(7)), "7");
    }

    #[test]
    fn test_one_shot_retires_after_single_run() {
        let mut task = Task::once(TaskId::new(1), noop(), Instant::now());
        assert!(!task.is_periodic());
        assert!(!task.advance());
    }

    #[test]
    fn test_periodic_advances_until_exhausted() {
        let interval = Duration::from_millis(20);
        let start = Instant::now();
        let mut task = Task::periodic(TaskId::new(2), noop(), start, interval, 3);

        assert!(task.advance());
        assert_eq!(task.due_at(), start + interval);
        assert!(task.advance());
        assert_eq!(task.due_at(), start + interval * 2);
        // Third occurrence exhausts the budget.
        assert!(!task.advance());
        assert_eq!(task.runs_remaining(), 0);
    }

    #[test]
    fn test_unlimited_never_exhausts() {
        let mut task = Task::periodic(
            TaskId::new(3),
            noop(),
            Instant::now(),
            Duration::from_millis(5),
            UNLIMITED_RUNS,
        );
        for _ in 0..100 {
            assert!(task.advance());
        }
        assert_eq!(task.runs_remaining(), UNLIMITED_RUNS);
    }

    #[test]
    fn test_rearm_keeps_one_shot_budget() {
        let mut task = Task::once(TaskId::new(4), noop(), Instant::now());
        let due = Instant::now() + Duration::from_millis(50);
        task.rearm(due, Duration::from_millis(10));
        assert_eq!(task.due_at(), due);
        assert!(!task.is_periodic());
        assert_eq!(task.runs_remaining(), 1);
    }

    #[test]
    fn test_rearm_replaces_periodic_interval() {
        let mut task = Task::periodic(
            TaskId::new(5),
            noop(),
            Instant::now(),
            Duration::from_millis(100),
            UNLIMITED_RUNS,
        );
        let due = Instant::now() + Duration::from_millis(5);
        task.rearm(due, Duration::from_millis(30));
        assert!(task.advance());
        assert_eq!(task.due_at(), due + Duration::from_millis(30));
    }
}
