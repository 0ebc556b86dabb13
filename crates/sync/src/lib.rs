//! Sync orchestration: the ingestion pipeline's run loop, job lifecycle,
//! schedule policies, and stuck-job recovery.
//!
//! [`Orchestrator`] executes one pass over all active sources (fetch →
//! duplicate check → review-queue writes). [`SyncService`] owns the job
//! state machine around it: manual triggers and schedule ticks both enqueue
//! Pending jobs, a single sequential worker promotes them through the
//! store's atomic single-flight gate, and a staleness sweeper force-fails
//! runs that wedge.

pub mod error;
pub mod orchestrator;
pub mod schedule;
pub mod service;

pub use error::SyncError;
pub use orchestrator::Orchestrator;
pub use schedule::is_due;
pub use service::SyncService;
