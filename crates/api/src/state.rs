//! Shared application state for the Axum API server.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_engine::bus::EventBus;
use courier_engine::registry::DeviceRegistry;
use courier_engine::view_limiter::ViewLimiter;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub config: AppConfig,
    pub registry: Arc<dyn DeviceRegistry>,
    /// Producer side of the commit-gated dispatch queue
    pub bus: EventBus,
    pub views: Arc<ViewLimiter>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        config: AppConfig,
        registry: Arc<dyn DeviceRegistry>,
        bus: EventBus,
    ) -> Self {
        let views = Arc::new(ViewLimiter::new(config.view_dedup_window_secs));
        Self {
            pool,
            redis,
            config,
            registry,
            bus,
            views,
        }
    }
}
