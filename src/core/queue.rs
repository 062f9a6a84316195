//! Time-ordered task registry with blocking pop and lazy cancellation.
//!
//! [`DelayQueue`] is a purely synchronized data structure: it owns no threads.
//! Records live in a lookup map; retrieval order comes from a binary heap
//! keyed by due time. Cancellation tombstones the heap entry instead of
//! removing it mid-heap; tombstones are discarded when they surface at the
//! head during [`DelayQueue::pop`].
//!
//! # Locking
//!
//! Two locks, acquired in a fixed order (registry before running set):
//!
//! - the registry mutex guards the lookup map, the heap, and the tombstone
//!   index; poppers sleep on its condvar with a deadline derived from the
//!   head's due time
//! - the running-set mutex guards the ids currently executing; cancel waiters
//!   sleep on its condvar holding only that lock
//!
//! Neither lock is ever held across a task body call or an unbounded wait on
//! foreign state.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::core::task::TimedTask;

/// Ordering entry shared between the heap and the id index.
///
/// Cancellation flips `valid` through the index without touching the heap;
/// the stale heap slot is purged when it reaches the head.
struct QueueEntry<I> {
    id: I,
    due_at: Instant,
    seq: u64,
    valid: AtomicBool,
}

/// Heap slot wrapper: min-order by due time, then by insertion sequence so
/// equally-due tasks are served in submission order.
struct HeapSlot<I>(Arc<QueueEntry<I>>);

impl<I> PartialEq for HeapSlot<I> {
    fn eq(&self, other: &Self) -> bool {
        self.0.due_at == other.0.due_at && self.0.seq == other.0.seq
    }
}

impl<I> Eq for HeapSlot<I> {}

impl<I> PartialOrd for HeapSlot<I> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<I> Ord for HeapSlot<I> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; reverse both keys for earliest-first.
        other
            .0
            .due_at
            .cmp(&self.0.due_at)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// Registry state guarded by the main mutex.
struct Registry<T: TimedTask> {
    tasks: HashMap<T::Id, T>,
    entries: HashMap<T::Id, Arc<QueueEntry<T::Id>>>,
    heap: BinaryHeap<HeapSlot<T::Id>>,
    seq: u64,
    closed: bool,
}

/// Per-id state while task occurrences execute.
///
/// A behind-schedule periodic task can overlap itself: its re-armed
/// occurrence is already due when pushed and may be claimed before the
/// previous occurrence has finished. The entry counts in-flight occurrences
/// and lives until the last one finishes, so a finish for one occurrence
/// never releases another and a pending cancel flag is never lost.
#[derive(Default)]
struct RunState {
    /// Set when the task was cancelled mid-run; blocks re-insertion.
    cancelled: bool,
    /// In-flight occurrences of this id.
    active: usize,
}

/// Concurrent registry of tasks ordered by absolute due time.
///
/// Supports insertion, lookup, lazy cancellation with optional
/// wait-for-completion, and a blocking pop that returns a task only once its
/// due time has arrived. See the module docs for the locking discipline.
pub struct DelayQueue<T: TimedTask> {
    registry: Mutex<Registry<T>>,
    pop_cv: Condvar,
    running: Mutex<HashMap<T::Id, RunState>>,
    finished_cv: Condvar,
}

impl<T: TimedTask> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimedTask> DelayQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                tasks: HashMap::new(),
                entries: HashMap::new(),
                heap: BinaryHeap::new(),
                seq: 0,
                closed: false,
            }),
            pop_cv: Condvar::new(),
            running: Mutex::new(HashMap::new()),
            finished_cv: Condvar::new(),
        }
    }

    /// Insert a task, waking any thread blocked in [`DelayQueue::pop`].
    ///
    /// Returns `false` without storing anything when the task fails its
    /// validity precondition, a live record already exists under the same id,
    /// the id was cancelled while executing (re-arm refused), or the queue has
    /// been closed.
    pub fn push(&self, task: T) -> bool {
        if !task.is_valid() {
            return false;
        }
        let id = task.id();
        let mut reg = self.registry.lock();
        if reg.closed || reg.tasks.contains_key(&id) {
            return false;
        }
        // A cancel that raced with execution flags the id in the running set;
        // re-inserting it would resurrect a removed task.
        if self.running.lock().get(&id).is_some_and(|s| s.cancelled) {
            return false;
        }
        reg.seq += 1;
        let entry = Arc::new(QueueEntry {
            id,
            due_at: task.due_at(),
            seq: reg.seq,
            valid: AtomicBool::new(true),
        });
        reg.heap.push(HeapSlot(Arc::clone(&entry)));
        reg.entries.insert(id, entry);
        reg.tasks.insert(id, task);
        drop(reg);
        self.pop_cv.notify_all();
        true
    }

    /// Block until a task is due, then claim it.
    ///
    /// Tombstoned entries reaching the head are discarded. If the head is due
    /// in the future, the calling thread sleeps until that deadline (re-armed
    /// whenever an earlier task is inserted). The returned task has been
    /// removed from the registry and its id recorded in the running set; the
    /// caller must invoke [`DelayQueue::finish`] once the body completes.
    ///
    /// Returns `None` only after [`DelayQueue::close`], once no due work is
    /// left to serve.
    pub fn pop(&self) -> Option<T> {
        let mut reg = self.registry.lock();
        loop {
            while reg
                .heap
                .peek()
                .is_some_and(|slot| !slot.0.valid.load(Ordering::Relaxed))
            {
                reg.heap.pop();
            }

            let head_due = reg.heap.peek().map(|slot| slot.0.due_at);
            let Some(due_at) = head_due else {
                if reg.closed {
                    return None;
                }
                self.pop_cv.wait(&mut reg);
                continue;
            };

            if due_at > Instant::now() {
                if reg.closed {
                    // A closed queue no longer serves future work.
                    return None;
                }
                let _ = self.pop_cv.wait_until(&mut reg, due_at);
                continue;
            }

            let slot = reg.heap.pop()?;
            let id = slot.0.id;
            reg.entries.remove(&id);
            let Some(task) = reg.tasks.remove(&id) else {
                continue;
            };
            self.running.lock().entry(id).or_default().active += 1;
            trace!(task = ?id, "task claimed");
            return Some(task);
        }
    }

    /// Non-blocking lookup of a queued task.
    ///
    /// A record found tombstoned is purged as a side effect and `None` is
    /// returned.
    pub fn find(&self, id: T::Id) -> Option<T> {
        let mut reg = self.registry.lock();
        let task = reg.tasks.get(&id)?;
        let live = task.is_valid()
            && reg
                .entries
                .get(&id)
                .is_some_and(|entry| entry.valid.load(Ordering::Relaxed));
        if !live {
            reg.tasks.remove(&id);
            reg.entries.remove(&id);
            return None;
        }
        reg.tasks.get(&id).cloned()
    }

    /// Mutate a queued record in place, re-keying it in the heap.
    ///
    /// The whole operation runs under the registry lock, so no pop can claim
    /// the record mid-update. The old heap slot is tombstoned and a fresh one
    /// inserted at the record's (possibly changed) due time.
    ///
    /// Returns `false`, without touching anything, when no live queued record
    /// exists: unknown id, tombstoned, currently executing with no queued
    /// re-arm, or the queue is closed.
    pub fn update<F>(&self, id: T::Id, mutate: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let mut reg = self.registry.lock();
        if reg.closed {
            return false;
        }
        let live = reg
            .entries
            .get(&id)
            .is_some_and(|entry| entry.valid.load(Ordering::Relaxed));
        if !live {
            return false;
        }
        let Some(task) = reg.tasks.get_mut(&id) else {
            return false;
        };
        mutate(task);
        let due_at = task.due_at();
        if let Some(old) = reg.entries.remove(&id) {
            old.valid.store(false, Ordering::Relaxed);
        }
        reg.seq += 1;
        let entry = Arc::new(QueueEntry {
            id,
            due_at,
            seq: reg.seq,
            valid: AtomicBool::new(true),
        });
        reg.heap.push(HeapSlot(Arc::clone(&entry)));
        reg.entries.insert(id, entry);
        drop(reg);
        self.pop_cv.notify_all();
        true
    }

    /// Cancel a queued or in-flight task.
    ///
    /// A queued record is tombstoned and unlinked so no pop or find can
    /// observe it again. An in-flight id is flagged so its body, once
    /// finished, cannot re-arm. With `wait`, the call blocks until the id has
    /// left the running set, guaranteeing the body either never ran or has
    /// fully completed on return.
    ///
    /// Returns `false` when the id was neither queued nor running.
    pub fn remove(&self, id: T::Id, wait: bool) -> bool {
        let mut found = false;
        {
            let mut reg = self.registry.lock();
            if let Some(entry) = reg.entries.remove(&id) {
                entry.valid.store(false, Ordering::Relaxed);
                reg.tasks.remove(&id);
                found = true;
            }
            let mut running = self.running.lock();
            if let Some(state) = running.get_mut(&id) {
                state.cancelled = true;
                found = true;
            }
            drop(running);
        }
        self.pop_cv.notify_all();

        if wait {
            let mut running = self.running.lock();
            while running.contains_key(&id) {
                self.finished_cv.wait(&mut running);
            }
        }
        trace!(task = ?id, found, "task removed");
        found
    }

    /// Mark one in-flight occurrence of `id` as finished.
    ///
    /// The running entry, including any pending cancel flag, is released only
    /// when the last overlapping occurrence finishes; cancel waiters are woken
    /// at that point.
    pub fn finish(&self, id: T::Id) {
        let mut running = self.running.lock();
        if let Some(state) = running.get_mut(&id) {
            state.active = state.active.saturating_sub(1);
            if state.active == 0 {
                running.remove(&id);
            }
        }
        drop(running);
        self.finished_cv.notify_all();
    }

    /// Whether a worker is currently executing the given id.
    pub fn is_running(&self, id: T::Id) -> bool {
        self.running.lock().contains_key(&id)
    }

    /// Atomically drop every queued record. Already-running tasks are
    /// unaffected.
    pub fn clear(&self) {
        let mut reg = self.registry.lock();
        reg.tasks.clear();
        reg.entries.clear();
        reg.heap.clear();
        drop(reg);
        self.pop_cv.notify_all();
    }

    /// Close the queue: poppers drain remaining due work and then receive
    /// `None`; further pushes are refused.
    pub fn close(&self) {
        let mut reg = self.registry.lock();
        reg.closed = true;
        drop(reg);
        self.pop_cv.notify_all();
    }

    /// Count of live (non-tombstoned) records.
    pub fn len(&self) -> usize {
        self.registry.lock().tasks.len()
    }

    /// Whether no live record is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
