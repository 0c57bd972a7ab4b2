//! Service-to-service routes used by business logic in other processes.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use courier_common::error::AppError;
use courier_common::types::NotificationDraft;
use courier_engine::service::NotificationService;
use courier_engine::unit_of_work::UnitOfWork;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/internal/notifications", post(enqueue_notification))
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    /// Feed rows written
    pub notifications: usize,
    /// Push intents handed to the dispatcher after commit
    pub queued: usize,
}

/// POST /internal/notifications — Feed write + push intent in one unit of work.
async fn enqueue_notification(
    State(state): State<AppState>,
    Json(draft): Json<NotificationDraft>,
) -> Result<Json<EnqueueResponse>, AppError> {
    let mut uow = UnitOfWork::begin(&state.pool, &state.bus).await?;
    let rows = NotificationService::enqueue_notification(&mut uow, &draft).await?;
    let queued = uow.commit().await?;

    Ok(Json(EnqueueResponse {
        notifications: rows.len(),
        queued,
    }))
}
