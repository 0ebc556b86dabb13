use kasane_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A second concurrent run was attempted while one is in progress.
    /// Reported to the caller, never silently queued — queuing is the job
    /// service's concern, not the orchestrator's.
    #[error("a sync run is already in progress")]
    Busy,

    #[error("no active sources to sync")]
    NoActiveSources,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Busy => 409,
            Self::NoActiveSources => 422,
            Self::Store(e) => e.status_code(),
        }
    }
}
