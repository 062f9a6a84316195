//! Telemetry helpers for structured logging.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is not set: crate-level info.
const DEFAULT_FILTER: &str = "delaypool=info";

/// Install an env-filtered fmt subscriber unless one is already set.
///
/// Scheduler internals log submissions and re-arms at `debug` and per-task
/// claim/removal events at `trace`; set `RUST_LOG=delaypool=trace` to see
/// them. Embedding applications that install their own subscriber first are
/// left untouched.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        assert!(tracing::dispatcher::has_been_set());
    }
}
