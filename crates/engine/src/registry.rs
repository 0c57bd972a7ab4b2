//! Device registry — push device rows and their enabled/disabled/deleted lifecycle.
//!
//! Every state transition is a single conditional statement that only fires
//! when the row is still in the expected prior state, so concurrent
//! disable-by-token, user opt-in and sweeper passes cannot leave a row with an
//! inconsistent combination of flags.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{PushDevice, RegisterDevice};

/// `disabled_reason` stamped when a user turns push off.
pub const USER_OPT_OUT_REASON: &str = "USER_OPT_OUT";

/// `disabled_reason` stamped on a row whose token was registered by another row.
pub const TOKEN_REASSIGNED_REASON: &str = "TOKEN_REASSIGNED";

/// Storage for push devices.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Upsert a device and make it deliverable again.
    ///
    /// Keyed by `(user_id, device_id)` when the user is known (an anonymous row
    /// carrying the same token is claimed if no such row exists yet), and by
    /// `push_token` among anonymous rows otherwise. Any other enabled row
    /// carrying the token is disabled with [`TOKEN_REASSIGNED_REASON`].
    async fn register(&self, registration: RegisterDevice) -> Result<PushDevice, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<PushDevice>, AppError>;

    /// Enabled, non-deleted devices of the given users.
    async fn list_enabled_devices(&self, user_ids: &[Uuid]) -> Result<Vec<PushDevice>, AppError>;

    /// Disable every enabled device carrying `push_token`. Returns rows transitioned.
    async fn disable_by_token(&self, push_token: &str, reason: &str) -> Result<u64, AppError>;

    async fn disable_all_for_user(&self, user_id: Uuid, reason: &str) -> Result<u64, AppError>;

    /// Re-enable a device that has not been soft-deleted. Returns false if no
    /// such row, or if its token is active on another row.
    async fn enable_by_id(&self, id: Uuid) -> Result<bool, AppError>;

    /// Re-enable the user's disabled, non-deleted devices. A token already
    /// active elsewhere stays off; among the user's own rows sharing a token
    /// only the most recently active one comes back.
    async fn enable_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// Ids of disabled, non-deleted devices with `disabled_at < cutoff`,
    /// oldest first, skipping `exclude`.
    async fn disabled_before(
        &self,
        cutoff: DateTime<Utc>,
        exclude: &[Uuid],
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError>;

    /// Stamp `deleted_at = now` if the row is still disabled before `cutoff`.
    async fn soft_delete(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Ids of soft-deleted devices with `deleted_at < cutoff`, oldest first,
    /// skipping `exclude`.
    async fn soft_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
        exclude: &[Uuid],
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError>;

    /// Remove the row if it is still soft-deleted before `cutoff`.
    async fn hard_delete(&self, id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, AppError>;

    /// User-driven opt-in / opt-out for all of a user's devices.
    async fn set_user_devices_enabled(&self, user_id: Uuid, enabled: bool) -> Result<u64, AppError> {
        if enabled {
            self.enable_all_for_user(user_id).await
        } else {
            self.disable_all_for_user(user_id, USER_OPT_OUT_REASON).await
        }
    }
}

/// PostgreSQL-backed registry.
#[derive(Clone)]
pub struct PgDeviceRegistry {
    pool: PgPool,
}

impl PgDeviceRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn register(&self, registration: RegisterDevice) -> Result<PushDevice, AppError> {
        let reg = registration.validated()?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut existing: Option<PushDevice> = None;
        if let Some(user_id) = reg.user_id {
            existing = sqlx::query_as(
                "SELECT * FROM push_devices WHERE user_id = $1 AND device_id = $2 FOR UPDATE",
            )
            .bind(user_id)
            .bind(&reg.device_id)
            .fetch_optional(&mut *tx)
            .await?;
        }
        if existing.is_none() {
            existing = sqlx::query_as(
                r#"
                SELECT * FROM push_devices
                WHERE user_id IS NULL AND push_token = $1
                ORDER BY last_active_at DESC
                LIMIT 1
                FOR UPDATE
                "#,
            )
            .bind(&reg.push_token)
            .fetch_optional(&mut *tx)
            .await?;
        }

        let device_row = existing.as_ref().map_or_else(Uuid::new_v4, |row| row.id);

        // Free the token before claiming it; the active-token index allows one holder.
        let reassigned = sqlx::query(
            r#"
            UPDATE push_devices
            SET enabled = false, disabled_at = $3, disabled_reason = $4
            WHERE push_token = $1 AND id <> $2 AND enabled = true
            "#,
        )
        .bind(&reg.push_token)
        .bind(device_row)
        .bind(now)
        .bind(TOKEN_REASSIGNED_REASON)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let device: PushDevice = match existing {
            Some(_) => {
                sqlx::query_as(
                    r#"
                    UPDATE push_devices
                    SET user_id = $2, device_id = $3, push_token = $4, platform = $5,
                        device_model = $6, last_active_at = $7, enabled = true,
                        disabled_at = NULL, disabled_reason = NULL, deleted_at = NULL
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(device_row)
                .bind(reg.user_id)
                .bind(&reg.device_id)
                .bind(&reg.push_token)
                .bind(reg.platform.to_string())
                .bind(&reg.device_model)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    INSERT INTO push_devices
                        (id, user_id, device_id, push_token, platform, device_model,
                         last_active_at, enabled, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, true, $7)
                    RETURNING *
                    "#,
                )
                .bind(device_row)
                .bind(reg.user_id)
                .bind(&reg.device_id)
                .bind(&reg.push_token)
                .bind(reg.platform.to_string())
                .bind(&reg.device_model)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;

        tracing::info!(
            device_row = %device.id,
            user_id = ?device.user_id,
            platform = %device.platform,
            reassigned,
            "Push device registered"
        );

        Ok(device)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PushDevice>, AppError> {
        let device = sqlx::query_as("SELECT * FROM push_devices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    async fn list_enabled_devices(&self, user_ids: &[Uuid]) -> Result<Vec<PushDevice>, AppError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let devices: Vec<PushDevice> = sqlx::query_as(
            r#"
            SELECT * FROM push_devices
            WHERE user_id = ANY($1)
              AND enabled = true
              AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(devices)
    }

    async fn disable_by_token(&self, push_token: &str, reason: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE push_devices
            SET enabled = false, disabled_at = $3, disabled_reason = $2
            WHERE push_token = $1 AND enabled = true
            "#,
        )
        .bind(push_token)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let disabled = result.rows_affected();
        if disabled > 0 {
            tracing::info!(disabled, reason, "Push token disabled");
        }
        Ok(disabled)
    }

    async fn disable_all_for_user(&self, user_id: Uuid, reason: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE push_devices
            SET enabled = false, disabled_at = $3, disabled_reason = $2
            WHERE user_id = $1 AND enabled = true
            "#,
        )
        .bind(user_id)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, disabled = result.rows_affected(), reason, "User devices disabled");
        Ok(result.rows_affected())
    }

    async fn enable_by_id(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE push_devices d
            SET enabled = true, disabled_at = NULL, disabled_reason = NULL
            WHERE d.id = $1
              AND d.deleted_at IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM push_devices o
                  WHERE o.push_token = d.push_token AND o.enabled AND o.id <> d.id
              )
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn enable_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE push_devices
            SET enabled = true, disabled_at = NULL, disabled_reason = NULL
            WHERE id IN (
                SELECT DISTINCT ON (d.push_token) d.id
                FROM push_devices d
                WHERE d.user_id = $1
                  AND d.enabled = false
                  AND d.deleted_at IS NULL
                  AND NOT EXISTS (
                      SELECT 1 FROM push_devices o
                      WHERE o.push_token = d.push_token AND o.enabled
                  )
                ORDER BY d.push_token, d.last_active_at DESC
            )
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, enabled = result.rows_affected(), "User devices enabled");
        Ok(result.rows_affected())
    }

    async fn disabled_before(
        &self,
        cutoff: DateTime<Utc>,
        exclude: &[Uuid],
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM push_devices
            WHERE enabled = false AND deleted_at IS NULL AND disabled_at < $1
              AND id <> ALL($2)
            ORDER BY disabled_at, id
            LIMIT $3
            "#,
        )
        .bind(cutoff)
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE push_devices
            SET deleted_at = $3
            WHERE id = $1 AND enabled = false AND deleted_at IS NULL AND disabled_at < $2
            "#,
        )
        .bind(id)
        .bind(cutoff)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
        exclude: &[Uuid],
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM push_devices
            WHERE deleted_at IS NOT NULL AND deleted_at < $1
              AND id <> ALL($2)
            ORDER BY deleted_at, id
            LIMIT $3
            "#,
        )
        .bind(cutoff)
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn hard_delete(&self, id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM push_devices WHERE id = $1 AND deleted_at IS NOT NULL AND deleted_at < $2",
        )
        .bind(id)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
