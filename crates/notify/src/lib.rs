//! Notification engine for review-queue alerts.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook notifier implementation
//! - Minijinja template rendering for the aggregate sync summary
//! - Dispatcher that fans one notification out to all configured channels
//!
//! The pipeline sends at most one notification per sync run, and only when
//! new content reached the review queue — never for failures.

pub mod dispatcher;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use templating::{render_sync_summary, SummaryContext};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
