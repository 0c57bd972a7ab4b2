//! View dedup route for content services that keep view counters.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use courier_common::error::AppError;

use crate::middleware::caller::Caller;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/views/{subject_type}/{subject_id}", post(record_view))
}

/// POST /api/views/:subject_type/:subject_id — `counted` is false for a repeat view.
async fn record_view(
    State(state): State<AppState>,
    caller: Caller,
    Path((subject_type, subject_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut redis = state.redis.clone();
    let counted = state
        .views
        .should_count(
            &mut redis,
            &subject_type,
            &subject_id,
            &caller.user_id.to_string(),
        )
        .await?;
    Ok(Json(json!({ "counted": counted })))
}
