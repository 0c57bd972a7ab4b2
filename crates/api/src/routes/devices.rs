//! Push device registration and opt-in / opt-out routes.

use axum::extract::{Path, State};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Platform, PushDevice, RegisterDevice};
use courier_engine::service::NotificationService;

use crate::middleware::caller::{Caller, OptionalCaller};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/devices", post(register_device))
        .route("/api/devices/enabled", put(set_devices_enabled))
        .route("/api/devices/{id}/enable", post(enable_device))
}

/// Request body for device registration.
#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_id: String,
    pub push_token: String,
    pub platform: Platform,
    pub device_model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

/// POST /api/devices — Register or refresh a device; anonymous callers allowed.
async fn register_device(
    State(state): State<AppState>,
    caller: OptionalCaller,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<Json<PushDevice>, AppError> {
    let registration = RegisterDevice {
        user_id: caller.0,
        device_id: req.device_id,
        push_token: req.push_token,
        platform: req.platform,
        device_model: req.device_model,
    };
    let device =
        NotificationService::register_device(state.registry.as_ref(), registration).await?;
    Ok(Json(device))
}

/// PUT /api/devices/enabled — Turn push on or off for all of the caller's devices.
async fn set_devices_enabled(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<SetEnabledRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = NotificationService::set_user_device_enabled(
        state.registry.as_ref(),
        caller.user_id,
        req.enabled,
    )
    .await?;
    Ok(Json(json!({ "enabled": req.enabled, "updated": updated })))
}

/// POST /api/devices/:id/enable — Re-enable one of the caller's devices.
async fn enable_device(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<PushDevice>, AppError> {
    let device =
        NotificationService::enable_device(state.registry.as_ref(), caller.user_id, id).await?;
    Ok(Json(device))
}
