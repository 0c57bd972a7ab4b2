use std::sync::Arc;
use std::time::Duration;

use courier_common::config::AppConfig;
use courier_common::db;
use courier_engine::registry::PgDeviceRegistry;
use courier_engine::sweeper::{RetentionSweeper, SweeperConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_sweeper=info,courier_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier device sweeper starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let sweeper = RetentionSweeper::new(
        Arc::new(PgDeviceRegistry::new(pool)),
        SweeperConfig::from_days(
            config.device_disabled_retention_days,
            config.device_deleted_retention_days,
        ),
    );

    // Cron-driven deployments run a single pass
    if config.sweeper_run_once {
        let report = sweeper.sweep().await;
        tracing::info!(
            soft_deleted = report.soft_deleted,
            hard_deleted = report.hard_deleted,
            errors = report.errors,
            "Single sweep complete"
        );
        return Ok(());
    }

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        _ = sweeper.run(Duration::from_secs(config.sweeper_interval_secs.max(1))) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Courier device sweeper stopped.");
    Ok(())
}
