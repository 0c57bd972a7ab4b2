pub mod devices;
pub mod health;
pub mod internal;
pub mod notifications;
pub mod views;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(devices::router())
        .merge(notifications::router())
        .merge(views::router())
        .merge(internal::router())
        .with_state(state)
}
