use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use service_core::error::AppError;

use crate::dtos::{EventListParams, EventListResponse};
use crate::models::WebhookEvent;
use crate::services::event_store::clamp_limit;
use crate::startup::AppState;

pub async fn list_events(
    State(state): State<AppState>,
    params: Result<Query<EventListParams>, QueryRejection>,
) -> Result<Json<EventListResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    let limit = clamp_limit(params.limit);

    let events = match params.repository.as_deref().map(str::trim) {
        Some(repository) if !repository.is_empty() => {
            state.store.list_by_repository(repository, limit).await
        }
        _ => state.store.list(limit).await,
    }
    .map_err(|e| AppError::StorageError(anyhow::anyhow!(e)))?;

    Ok(Json(events.into()))
}

pub async fn get_event(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<WebhookEvent>, AppError> {
    let Path(id) = id.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;

    state
        .store
        .get(&id)
        .await
        .map_err(|e| AppError::StorageError(anyhow::anyhow!(e)))?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Webhook event not found")))
}
