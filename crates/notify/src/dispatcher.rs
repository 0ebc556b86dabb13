//! Fans one notification out to all configured channels.
//!
//! Individual channel failures are logged and recorded; they never block
//! other channels and never propagate into the sync result.

use crate::traits::{DispatchResult, Notification, Notifier};

/// Dispatches notifications to the configured channels.
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Create a dispatcher with no channels (notifications become no-ops).
    pub fn empty() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    pub fn has_channels(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Deliver `notification` through every channel, collecting per-channel
    /// results.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!("No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NotifyError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingNotifier {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Config("boom".to_string()))
            } else {
                Ok(())
            }
        }

        fn channel_name(&self) -> &str {
            self.name
        }
    }

    fn notification() -> Notification {
        Notification {
            subject: "s".to_string(),
            body: "b".to_string(),
            recipient_ids: Vec::new(),
            payload: serde_json::json!({}),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn failure_does_not_block_other_channels() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(vec![
            Box::new(RecordingNotifier {
                name: "failing",
                calls: calls_a.clone(),
                fail: true,
            }),
            Box::new(RecordingNotifier {
                name: "working",
                calls: calls_b.clone(),
                fail: false,
            }),
        ]);

        let results = dispatcher.dispatch(&notification()).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("boom"));
        assert!(results[1].success);
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_dispatcher_is_noop() {
        let dispatcher = Dispatcher::empty();
        assert!(!dispatcher.has_channels());
        assert!(dispatcher.dispatch(&notification()).await.is_empty());
    }
}
