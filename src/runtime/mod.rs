//! Process-wide scheduling handle.

pub mod handle;

pub use handle::SchedulerHandle;
