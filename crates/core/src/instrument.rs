//! Explicit timing instrumentation.
//!
//! Call sites wrap an operation in [`timed`] to get an elapsed-ms log line.
//! This replaces implicit per-method performance tracking with something
//! visible at the point of use.

use std::future::Future;
use std::time::Instant;

use tracing::debug;

/// Run `fut`, logging the operation name and elapsed milliseconds.
pub async fn timed<T, F>(op: &str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    debug!(op = op, elapsed_ms = start.elapsed().as_millis() as u64, "operation complete");
    out
}

/// Synchronous variant of [`timed`] for CPU-bound sections.
pub fn timed_blocking<T>(op: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    debug!(op = op, elapsed_ms = start.elapsed().as_millis() as u64, "operation complete");
    out
}
