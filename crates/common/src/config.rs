use serde::Deserialize;

use crate::error::AppError;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Port the API server listens on (default: 3000)
    pub api_port: u16,

    /// Push gateway endpoint accepting batched sends
    pub push_gateway_url: String,

    /// Bearer key for the push gateway
    pub push_gateway_api_key: Option<String>,

    /// Per-request timeout for gateway calls in seconds (default: 10)
    pub push_gateway_timeout_secs: u64,

    /// Maximum number of tokens per gateway call (default: 500)
    pub push_batch_size: usize,

    /// Gateway batches in flight per dispatch request (default: 4)
    pub push_max_concurrent_batches: usize,

    /// Capacity of the released-dispatch queue (default: 1024)
    pub push_queue_capacity: usize,

    /// Days a disabled device is kept before soft delete (default: 90)
    pub device_disabled_retention_days: i64,

    /// Days a soft-deleted device is kept before hard delete (default: 90)
    pub device_deleted_retention_days: i64,

    /// Seconds between sweeper runs (default: 86400 = daily)
    pub sweeper_interval_secs: u64,

    /// Run a single sweep and exit, for cron-driven deployments
    pub sweeper_run_once: bool,

    /// Window in seconds during which repeated views by one actor count once (default: 86400)
    pub view_dedup_window_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            api_port: parse_var("API_PORT", 3000)?,
            push_gateway_url: std::env::var("PUSH_GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:8080/v1/push/batch".to_string()),
            push_gateway_api_key: std::env::var("PUSH_GATEWAY_API_KEY").ok(),
            push_gateway_timeout_secs: parse_var("PUSH_GATEWAY_TIMEOUT_SECS", 10)?,
            push_batch_size: parse_var("PUSH_BATCH_SIZE", 500)?,
            push_max_concurrent_batches: parse_var("PUSH_MAX_CONCURRENT_BATCHES", 4)?,
            push_queue_capacity: parse_var("PUSH_QUEUE_CAPACITY", 1024)?,
            device_disabled_retention_days: parse_var("DEVICE_DISABLED_RETENTION_DAYS", 90)?,
            device_deleted_retention_days: parse_var("DEVICE_DELETED_RETENTION_DAYS", 90)?,
            sweeper_interval_secs: parse_var("SWEEPER_INTERVAL_SECS", 86_400)?,
            sweeper_run_once: parse_var("SWEEPER_RUN_ONCE", false)?,
            view_dedup_window_secs: parse_var("VIEW_DEDUP_WINDOW_SECS", 86_400)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the dispatcher or break Redis expiry.
    pub fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("DB_MAX_CONNECTIONS", self.db_max_connections as u64),
            ("PUSH_GATEWAY_TIMEOUT_SECS", self.push_gateway_timeout_secs),
            ("PUSH_BATCH_SIZE", self.push_batch_size as u64),
            ("PUSH_MAX_CONCURRENT_BATCHES", self.push_max_concurrent_batches as u64),
            ("PUSH_QUEUE_CAPACITY", self.push_queue_capacity as u64),
            ("SWEEPER_INTERVAL_SECS", self.sweeper_interval_secs),
            ("VIEW_DEDUP_WINDOW_SECS", self.view_dedup_window_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::Config(format!("{} must be greater than zero", name)));
        }

        if self.device_disabled_retention_days < 0 || self.device_deleted_retention_days < 0 {
            return Err(AppError::Config(
                "device retention days must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read an optional environment variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                name,
                std::any::type_name::<T>()
            )
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/courier".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            db_max_connections: 20,
            api_port: 3000,
            push_gateway_url: "http://localhost:8080/v1/push/batch".to_string(),
            push_gateway_api_key: None,
            push_gateway_timeout_secs: 10,
            push_batch_size: 500,
            push_max_concurrent_batches: 4,
            push_queue_capacity: 1024,
            device_disabled_retention_days: 90,
            device_deleted_retention_days: 90,
            sweeper_interval_secs: 86_400,
            sweeper_run_once: false,
            view_dedup_window_secs: 86_400,
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = AppConfig {
            push_batch_size: 0,
            ..valid_config()
        };
        match config.validate() {
            Err(AppError::Config(msg)) => assert!(msg.contains("PUSH_BATCH_SIZE")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_view_window_rejected() {
        let config = AppConfig {
            view_dedup_window_secs: 0,
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_negative_retention_rejected() {
        let config = AppConfig {
            device_deleted_retention_days: -1,
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_parse_var_default_when_unset() {
        let value: u64 = parse_var("COURIER_TEST_SURELY_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("COURIER_TEST_BAD_NUMBER", "not-a-number") };
        let result: anyhow::Result<u32> = parse_var("COURIER_TEST_BAD_NUMBER", 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_var_reads_bool() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("COURIER_TEST_RUN_ONCE", "true") };
        let value: bool = parse_var("COURIER_TEST_RUN_ONCE", false).unwrap();
        assert!(value);
    }
}
