//! Concurrency tests for the time-ordered task queue.
//!
//! These tests validate the queue-level guarantees on their own, without the
//! worker pool on top:
//! - No task is returned before its due time
//! - Earliest-due-first ordering, with insertion-order tie-break
//! - Poppers wake when an earlier task arrives
//! - Cancel-before-dequeue means the body never runs
//! - Cancel-with-wait returns only after the body has fully completed, even
//!   when a behind-schedule periodic task overlaps itself
//! - Exactly-once dequeue under submitter/popper contention

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use delaypool::core::{DelayQueue, Task, TaskId, TimedTask};
use delaypool::util::init_tracing;
use rand::Rng;

fn noop_in(id: u64, delay: Duration) -> Task {
    Task::once(TaskId::new(id), Arc::new(|| {}), Instant::now() + delay)
}

/// Pop never returns a task before its due time.
#[test]
fn test_pop_respects_due_time() {
    let queue = DelayQueue::new();
    let delay = Duration::from_millis(60);
    let start = Instant::now();
    assert!(queue.push(noop_in(1, delay)));

    let task = queue.pop().expect("queue is open");
    assert!(
        start.elapsed() >= delay,
        "popped after {:?}, expected at least {:?}",
        start.elapsed(),
        delay
    );
    queue.finish(task.id());
}

/// The earlier-due task is served first regardless of insertion order.
#[test]
fn test_pop_serves_earliest_due_first() {
    let queue = DelayQueue::new();
    assert!(queue.push(noop_in(1, Duration::from_millis(50))));
    assert!(queue.push(noop_in(2, Duration::from_millis(10))));

    let first = queue.pop().unwrap();
    queue.finish(first.id());
    let second = queue.pop().unwrap();
    queue.finish(second.id());

    assert_eq!(first.id(), TaskId::new(2));
    assert_eq!(second.id(), TaskId::new(1));
}

/// A popper sleeping toward a far deadline re-arms when an earlier task
/// arrives.
#[test]
fn test_pop_wakes_for_earlier_insert() {
    let queue = Arc::new(DelayQueue::new());
    assert!(queue.push(noop_in(1, Duration::from_millis(500))));

    let (tx, rx) = mpsc::channel();
    let popper = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let task = queue.pop().unwrap();
            queue.finish(task.id());
            tx.send(task.id()).unwrap();
        })
    };

    // Let the popper settle into its timed wait, then insert an earlier task.
    thread::sleep(Duration::from_millis(50));
    assert!(queue.push(noop_in(2, Duration::ZERO)));

    let popped = rx
        .recv_timeout(Duration::from_millis(300))
        .expect("popper should wake for the earlier task");
    assert_eq!(popped, TaskId::new(2));
    popper.join().unwrap();
}

/// A record cancelled before dequeue is never observable again.
#[test]
fn test_cancel_before_pop_discards_task() {
    let queue: DelayQueue<Task> = DelayQueue::new();
    assert!(queue.push(noop_in(1, Duration::from_millis(40))));
    assert!(queue.remove(TaskId::new(1), false));
    assert!(queue.find(TaskId::new(1)).is_none());
    assert_eq!(queue.len(), 0);

    // Only the tombstone remains in the heap; a closed pop drains nothing.
    queue.close();
    assert!(queue.pop().is_none());
}

/// Cancel-with-wait returns only once the in-flight body has completed.
#[test]
fn test_cancel_wait_blocks_until_body_finishes() {
    let queue = Arc::new(DelayQueue::new());
    let done = Arc::new(AtomicBool::new(false));

    let body_done = Arc::clone(&done);
    let task = Task::once(
        TaskId::new(1),
        Arc::new(move || {
            thread::sleep(Duration::from_millis(100));
            body_done.store(true, Ordering::SeqCst);
        }),
        Instant::now(),
    );
    assert!(queue.push(task));

    let worker = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let task = queue.pop().unwrap();
            task.run();
            queue.finish(task.id());
        })
    };

    // Wait for the worker to claim the task.
    while !queue.is_running(TaskId::new(1)) {
        thread::sleep(Duration::from_millis(1));
    }

    assert!(queue.remove(TaskId::new(1), true));
    assert!(
        done.load(Ordering::SeqCst),
        "cancel-with-wait returned before the body completed"
    );
    worker.join().unwrap();
}

/// When a periodic task falls behind schedule its re-armed occurrence can be
/// claimed while the previous one is still executing; cancel-with-wait must
/// span every overlapping occurrence.
#[test]
fn test_cancel_wait_spans_overlapping_occurrences() {
    init_tracing();
    let queue = Arc::new(DelayQueue::new());
    let id = TaskId::new(1);
    let done = Arc::new(AtomicBool::new(false));

    let body_done = Arc::clone(&done);
    let task = Task::periodic(
        id,
        Arc::new(move || {
            thread::sleep(Duration::from_millis(80));
            body_done.store(true, Ordering::SeqCst);
        }),
        Instant::now(),
        Duration::from_millis(1),
        5,
    );
    assert!(queue.push(task));

    // Claim the first occurrence, re-arm it (already due), claim the second,
    // and retire the first, in the order a worker would.
    let mut first = queue.pop().unwrap();
    assert!(first.advance());
    assert!(queue.push(first.clone()));
    let second = queue.pop().unwrap();
    queue.finish(first.id());
    assert!(queue.is_running(id));

    let worker = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            second.run();
            queue.finish(second.id());
        })
    };

    assert!(queue.remove(id, true));
    assert!(
        done.load(Ordering::SeqCst),
        "cancel-with-wait returned while an occurrence was executing"
    );
    worker.join().unwrap();
}

/// A task cancelled while executing cannot be re-inserted afterwards.
#[test]
fn test_cancel_during_run_blocks_rearm() {
    let queue = Arc::new(DelayQueue::new());
    let started = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));

    let body_started = Arc::clone(&started);
    let body_release = Arc::clone(&release);
    let task = Task::periodic(
        TaskId::new(1),
        Arc::new(move || {
            body_started.store(true, Ordering::SeqCst);
            while !body_release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(2));
            }
        }),
        Instant::now(),
        Duration::from_millis(10),
        5,
    );
    assert!(queue.push(task));

    let (tx, rx) = mpsc::channel();
    let worker = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut task = queue.pop().unwrap();
            task.run();
            let rearmed = task.advance() && queue.push(task.clone());
            queue.finish(task.id());
            tx.send(rearmed).unwrap();
        })
    };

    while !started.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }
    // Cancel mid-run, then let the body finish.
    assert!(queue.remove(TaskId::new(1), false));
    release.store(true, Ordering::SeqCst);

    let rearmed = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(!rearmed, "cancelled task must not re-arm");
    assert!(queue.find(TaskId::new(1)).is_none());
    worker.join().unwrap();
}

/// Under submitter/popper contention every task is dequeued exactly once.
#[test]
fn test_contended_pop_is_exactly_once() {
    const SUBMITTERS: usize = 4;
    const TASKS_PER_SUBMITTER: usize = 50;
    const POPPERS: usize = 4;
    const TOTAL: usize = SUBMITTERS * TASKS_PER_SUBMITTER;

    init_tracing();
    let queue = Arc::new(DelayQueue::<Task>::new());
    let total_pops = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(std::sync::Mutex::new(std::collections::HashSet::new()));

    let poppers: Vec<_> = (0..POPPERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let total_pops = Arc::clone(&total_pops);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                while let Some(task) = queue.pop() {
                    total_pops.fetch_add(1, Ordering::SeqCst);
                    assert!(
                        seen.lock().unwrap().insert(task.id()),
                        "task {} dequeued twice",
                        task.id()
                    );
                    queue.finish(task.id());
                }
            })
        })
        .collect();

    let submitters: Vec<_> = (0..SUBMITTERS)
        .map(|submitter| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut rng = rand::rng();
                for i in 0..TASKS_PER_SUBMITTER {
                    let id = (submitter * TASKS_PER_SUBMITTER + i + 1) as u64;
                    let delay = Duration::from_millis(rng.random_range(0..50));
                    assert!(queue.push(noop_in(id, delay)));
                }
            })
        })
        .collect();

    for submitter in submitters {
        submitter.join().unwrap();
    }

    // Wait for the window to pass and the queue to drain, then stop poppers.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !queue.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    queue.close();
    for popper in poppers {
        popper.join().unwrap();
    }

    assert_eq!(total_pops.load(Ordering::SeqCst), TOTAL);
    assert_eq!(seen.lock().unwrap().len(), TOTAL);
}
