//! Inter-source pacing.
//!
//! The orchestrator waits between sources so a full pipeline run does not
//! burst-load the upstream endpoints. The wait is derived from each
//! source's requests-per-minute limit and is cancellable so shutdown does
//! not hang on a long multi-source pass.

use std::time::Duration;

use tokio::sync::Notify;

/// Sleep for `duration` unless `shutdown` fires first.
///
/// Returns `true` when the full duration elapsed, `false` when the sleep
/// was interrupted by shutdown.
pub async fn cancellable_sleep(duration: Duration, shutdown: &Notify) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.notified() => false,
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn sleep_completes_without_shutdown() {
        let shutdown = Notify::new();
        let completed = cancellable_sleep(Duration::from_millis(5), &shutdown).await;
        assert!(completed);
    }

    #[tokio::test]
    async fn sleep_interrupted_by_shutdown() {
        let shutdown = Arc::new(Notify::new());
        let shutdown2 = shutdown.clone();
        let waiter = tokio::spawn(async move {
            cancellable_sleep(Duration::from_secs(30), &shutdown2).await
        });
        // Give the waiter a moment to register, then signal.
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.notify_waiters();
        let completed = waiter.await.unwrap();
        assert!(!completed);
    }
}
