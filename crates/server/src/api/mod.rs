//! Admin API route handlers.

pub mod health;
pub mod jobs;
pub mod review;
pub mod schedule;
pub mod sources;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use kasane_store::StoreError;

pub use health::health;
pub use jobs::{sync_job_cancel, sync_job_get, sync_jobs_list, sync_trigger};
pub use review::review_stats;
pub use schedule::{schedule_get, schedule_update};
pub use sources::{
    sources_create, sources_delete, sources_get, sources_list, sources_test, sources_update,
};

/// Map a store error to an HTTP response.
pub(crate) fn store_err(e: StoreError) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": e.to_string() })))
}
