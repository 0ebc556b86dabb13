//! Schedule-config handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use kasane_core::model::ScheduleConfig;

use crate::state::AppState;

use super::store_err;

/// GET /api/sync/schedule
pub async fn schedule_get(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let config = state.service.get_schedule().await.map_err(store_err)?;
    Ok(Json(serde_json::to_value(config).unwrap_or_default()))
}

/// PUT /api/sync/schedule — validate, persist, and apply immediately.
pub async fn schedule_update(
    State(state): State<Arc<AppState>>,
    Json(config): Json<ScheduleConfig>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let config = state
        .service
        .update_schedule(config)
        .await
        .map_err(store_err)?;
    Ok(Json(serde_json::to_value(config).unwrap_or_default()))
}
