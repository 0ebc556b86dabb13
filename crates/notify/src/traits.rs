//! Notifier trait definition and shared error types.

use std::collections::HashMap;

use uuid::Uuid;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// The rendered subject/title.
    pub subject: String,
    /// The rendered body content.
    pub body: String,
    /// Operator accounts this notification addresses.
    pub recipient_ids: Vec<Uuid>,
    /// Structured payload (counts, job id) forwarded verbatim.
    pub payload: serde_json::Value,
    /// Additional metadata (e.g. trigger kind).
    pub metadata: HashMap<String, String>,
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Test connectivity with a sample notification.
    async fn test(&self) -> Result<(), NotifyError> {
        let test_notification = Notification {
            subject: "[TEST] Review queue test".to_string(),
            body: "This is a test notification from the sync pipeline.".to_string(),
            recipient_ids: Vec::new(),
            payload: serde_json::json!({ "test": true }),
            metadata: HashMap::new(),
        };
        self.send(&test_notification).await
    }

    /// Human-readable name for this channel (e.g. "webhook").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
