//! In-app notification feed routes.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::Notification;
use courier_engine::store::{NotificationOrder, NotificationStore};

use crate::middleware::caller::Caller;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notifications",
            get(list_notifications).delete(clear_notifications),
        )
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/read", delete(delete_read))
        .route("/api/notifications/{id}/read", post(mark_read))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub order: NotificationOrder,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/notifications — Page through the caller's feed.
async fn list_notifications(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = NotificationStore::list_by_user(
        &state.pool,
        caller.user_id,
        params.order,
        params.limit,
        params.offset,
    )
    .await?;
    Ok(Json(notifications))
}

/// GET /api/notifications/unread-count
async fn unread_count(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = NotificationStore::unread_count(&state.pool, caller.user_id).await?;
    Ok(Json(json!({ "unread": count })))
}

/// POST /api/notifications/:id/read — Idempotent.
async fn mark_read(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = NotificationStore::mark_read(&state.pool, caller.user_id, id).await?;
    Ok(Json(notification))
}

/// POST /api/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = NotificationStore::mark_all_read(&state.pool, caller.user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// DELETE /api/notifications/read — Delete every read entry.
async fn delete_read(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = NotificationStore::delete_read(&state.pool, caller.user_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// DELETE /api/notifications — Clear the whole feed.
async fn clear_notifications(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = NotificationStore::clear(&state.pool, caller.user_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
