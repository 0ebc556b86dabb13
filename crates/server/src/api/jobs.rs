//! Sync trigger and job-history handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::state::AppState;

use super::store_err;

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    /// Optional restriction to a subset of sources.
    #[serde(default)]
    pub source_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u64>,
}

/// POST /api/sync/trigger — enqueue a manual sync. Returns immediately;
/// the caller polls the job for progress.
pub async fn sync_trigger(
    State(state): State<Arc<AppState>>,
    body: Option<Json<TriggerRequest>>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let source_ids = body.and_then(|Json(req)| req.source_ids);
    let job = state
        .service
        .request_manual_sync(source_ids)
        .await
        .map_err(store_err)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job.id, "status": job.status })),
    ))
}

/// GET /api/sync/jobs — recent job history, newest first.
pub async fn sync_jobs_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = query.limit.unwrap_or(20).min(200);
    let jobs = state
        .service
        .list_recent_jobs(limit)
        .await
        .map_err(store_err)?;
    Ok(Json(serde_json::to_value(jobs).unwrap_or_default()))
}

/// GET /api/sync/jobs/{id}
pub async fn sync_job_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let job = state
        .service
        .get_job(id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("sync job not found: {}", id) })),
            )
        })?;
    Ok(Json(serde_json::to_value(job).unwrap_or_default()))
}

/// POST /api/sync/jobs/{id}/cancel — cancel a job that has not started.
pub async fn sync_job_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let job = state.service.cancel_pending(id).await.map_err(store_err)?;
    Ok(Json(serde_json::to_value(job).unwrap_or_default()))
}
