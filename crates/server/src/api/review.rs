//! Review-queue statistics handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use kasane_store::CatalogStore;

use crate::state::AppState;

use super::store_err;

/// GET /api/review/stats — aggregate statistics over the approval queue.
pub async fn review_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let stats = state.store.queue_stats().await.map_err(store_err)?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_default()))
}
