//! CRUD and connectivity-test handlers for sources.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use kasane_store::{CatalogStore, CreateSource, UpdateSource};

use crate::state::AppState;

use super::store_err;

/// GET /api/sources
pub async fn sources_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let sources = state.store.list_sources().await.map_err(store_err)?;
    Ok(Json(serde_json::to_value(sources).unwrap_or_default()))
}

/// POST /api/sources
pub async fn sources_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSource>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let source = state.store.create_source(req).await.map_err(store_err)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(source).unwrap_or_default()),
    ))
}

/// GET /api/sources/{id}
pub async fn sources_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let source = state
        .store
        .get_source(id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("source not found: {}", id) })),
            )
        })?;
    Ok(Json(serde_json::to_value(source).unwrap_or_default()))
}

/// PUT /api/sources/{id}
pub async fn sources_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSource>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let source = state
        .store
        .update_source(id, req)
        .await
        .map_err(store_err)?;
    Ok(Json(serde_json::to_value(source).unwrap_or_default()))
}

/// DELETE /api/sources/{id}
pub async fn sources_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    state.store.delete_source(id).await.map_err(store_err)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sources/{id}/test — live connectivity probe, persists nothing.
pub async fn sources_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let source = state
        .store
        .get_source(id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("source not found: {}", id) })),
            )
        })?;

    let probe = state.client.test_source(&source).await;
    Ok(Json(serde_json::to_value(probe).unwrap_or_default()))
}
