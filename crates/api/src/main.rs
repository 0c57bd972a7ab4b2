//! Courier API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::db::{create_pool, run_migrations};
use courier_common::redis_pool::create_redis_pool;
use courier_engine::bus::EventBus;
use courier_engine::dispatcher::{DispatcherConfig, PushDispatcher};
use courier_engine::registry::{DeviceRegistry, PgDeviceRegistry};
use courier_notifier::HttpPushGateway;

use courier_api::routes::create_router;
use courier_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courier_api=debug,courier_engine=debug,courier_notifier=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Courier API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    // Create Redis connection
    let redis = create_redis_pool(&config.redis_url).await?;

    // Push gateway + device registry
    let gateway = HttpPushGateway::new(
        config.push_gateway_url.clone(),
        config.push_gateway_api_key.clone(),
        Duration::from_secs(config.push_gateway_timeout_secs),
    )?
    .with_max_batch_size(config.push_batch_size);
    let registry: Arc<dyn DeviceRegistry> = Arc::new(PgDeviceRegistry::new(pool.clone()));

    // Commit-gated queue feeding the dispatcher worker
    let (bus, receiver) = EventBus::new(config.push_queue_capacity);
    let dispatcher = PushDispatcher::new(
        registry.clone(),
        Arc::new(gateway),
        DispatcherConfig {
            batch_size: config.push_batch_size,
            max_concurrent_batches: config.push_max_concurrent_batches,
        },
    );
    let worker = dispatcher.spawn(receiver);

    // Build application state
    let port = config.api_port;
    let state = AppState::new(pool, redis, config, registry, bus);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    // In-flight dispatches are dropped on shutdown.
    worker.abort();

    tracing::info!("Courier API server stopped.");
    Ok(())
}
