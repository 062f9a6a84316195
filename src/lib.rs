//! # Delaypool
//!
//! A thread-safe delayed/periodic task scheduler for data-service frameworks.
//!
//! This library provides the scheduling layer that drives retries, watchdogs,
//! periodic synchronization, and deferred cleanup inside a larger storage
//! framework. Tasks are opaque zero-argument bodies submitted with a delay
//! (and, for periodic tasks, an interval and repeat count); a bounded pool of
//! worker threads executes each task at its due time.
//!
//! ## Core Problem Solved
//!
//! Deferred work in a storage service has constraints that a plain thread pool
//! does not cover:
//!
//! - **Time ordering**: no task may run before its due time, and the earliest
//!   due task must be served first
//! - **Safe cancellation**: callers must be able to cancel work that is queued
//!   or already in flight, optionally blocking until the body has finished
//! - **Re-arming**: periodic tasks re-schedule themselves after each run until
//!   their repeat budget is exhausted
//! - **No lock-held execution**: a slow task body must never stall queue
//!   mutation or other workers
//!
//! ## Key Features
//!
//! - **Time-ordered registry**: binary heap keyed by due time with lazy
//!   tombstone cancellation (no O(n) heap removal)
//! - **Blocking pop**: workers sleep on a condition variable with a deadline
//!   derived from the head's due time, never spinning
//! - **Wait-for-completion removal**: `remove(id, wait = true)` returns only
//!   after an in-flight body has fully completed
//! - **On-demand worker growth**: the pool starts at its configured minimum
//!   concurrency and grows up to the maximum when submissions find no idle
//!   worker
//! - **Sentinel failure returns**: teardown and not-found conditions surface
//!   as `TaskId::INVALID` / `false`, never as panics
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use delaypool::config::SchedulerConfig;
//! use delaypool::runtime::SchedulerHandle;
//!
//! let scheduler = SchedulerHandle::new(SchedulerConfig::new()).unwrap();
//!
//! // One-shot task, 10ms from now.
//! let id = scheduler.execute(|| println!("deferred"), Duration::from_millis(10));
//! assert!(id.is_valid());
//!
//! // Periodic task: first run after 5ms, then every 20ms, three times.
//! let id = scheduler.schedule_with(
//!     || println!("tick"),
//!     Duration::from_millis(20),
//!     Duration::from_millis(5),
//!     3,
//! );
//!
//! // Cancel and wait until any in-flight run has finished.
//! scheduler.remove(id, true);
//! scheduler.shutdown();
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_pool_test.rs` - Full integration tests
//! - `tests/delay_queue_test.rs` - Queue-level concurrency tests

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling: task records, the time-ordered queue, and the worker pool.
pub mod core;
/// Configuration models for pool sizing and worker naming.
pub mod config;
/// Process-wide scheduling handle.
pub mod runtime;
/// Shared utilities.
pub mod util;
