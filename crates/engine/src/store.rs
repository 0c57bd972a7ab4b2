//! Notification store — the per-user in-app feed.

use chrono::Utc;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Notification, NotificationType};

/// Default and maximum page sizes for feed listing.
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Feed ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOrder {
    /// Unread entries first, newest first within each group.
    UnreadFirst,
    /// Newest first.
    #[default]
    Latest,
}

/// Feed entry to insert for one recipient.
#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub notification_type: NotificationType,
    pub title: &'a str,
    pub content: &'a str,
    pub link_url: Option<&'a str>,
    pub target_id: Option<&'a str>,
}

/// Service layer for feed persistence.
pub struct NotificationStore;

impl NotificationStore {
    /// Insert a feed row on the caller's connection (usually a unit of work).
    pub async fn insert(
        conn: &mut PgConnection,
        user_id: Uuid,
        entry: &NewNotification<'_>,
    ) -> Result<Notification, AppError> {
        let notification: Notification = sqlx::query_as(
            r#"
            INSERT INTO notifications
                (id, user_id, notification_type, title, content, link_url, target_id, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, false, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(entry.notification_type.to_string())
        .bind(entry.title)
        .bind(entry.content)
        .bind(entry.link_url)
        .bind(entry.target_id)
        .bind(Utc::now())
        .fetch_one(conn)
        .await?;

        Ok(notification)
    }

    /// List a user's feed page.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: Uuid,
        order: NotificationOrder,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Notification>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);

        let sql = match order {
            NotificationOrder::UnreadFirst => {
                "SELECT * FROM notifications WHERE user_id = $1 ORDER BY read ASC, created_at DESC, id LIMIT $2 OFFSET $3"
            }
            NotificationOrder::Latest => {
                "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC, id LIMIT $2 OFFSET $3"
            }
        };

        let notifications: Vec<Notification> = sqlx::query_as(sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(notifications)
    }

    pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read = false")
                .bind(user_id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    /// Mark one entry read. Marking an already-read entry keeps its `read_at`.
    pub async fn mark_read(
        pool: &PgPool,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Notification, AppError> {
        let notification: Notification = sqlx::query_as(
            r#"
            UPDATE notifications
            SET read = true, read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", notification_id)))?;

        Ok(notification)
    }

    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET read = true, read_at = $2 WHERE user_id = $1 AND read = false",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Bulk delete of a user's read entries.
    pub async fn delete_read(pool: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1 AND read = true")
            .bind(user_id)
            .execute(pool)
            .await?;

        tracing::info!(user_id = %user_id, deleted = result.rows_affected(), "Read notifications deleted");
        Ok(result.rows_affected())
    }

    /// Remove the user's whole feed.
    pub async fn clear(pool: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        tracing::info!(user_id = %user_id, deleted = result.rows_affected(), "Notification feed cleared");
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_default_is_latest() {
        assert_eq!(NotificationOrder::default(), NotificationOrder::Latest);
    }

    #[test]
    fn test_order_deserializes_snake_case() {
        let order: NotificationOrder = serde_json::from_str("\"unread_first\"").unwrap();
        assert_eq!(order, NotificationOrder::UnreadFirst);
    }
}
