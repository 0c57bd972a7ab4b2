//! Retention sweeper — ages disabled devices into soft-deleted, and
//! soft-deleted devices out of the table.
//!
//! Two passes run in order on every invocation:
//! 1. soft delete: disabled for longer than the disabled-retention window
//! 2. hard delete: soft-deleted for longer than the deleted-retention window
//!
//! Each row is transitioned with its own conditional statement, so a device
//! re-enabled between listing and updating is skipped, and one failing row
//! does not stop the rest of the pass. Rows that fail or are skipped are
//! excluded from later pages, so paging always moves forward.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::registry::DeviceRegistry;

/// Default retention for both windows.
const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Rows fetched per page.
const DEFAULT_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub disabled_retention: chrono::Duration,
    pub deleted_retention: chrono::Duration,
    pub page_size: i64,
}

impl SweeperConfig {
    pub fn from_days(disabled_days: i64, deleted_days: i64) -> Self {
        Self {
            disabled_retention: chrono::Duration::days(disabled_days),
            deleted_retention: chrono::Duration::days(deleted_days),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::from_days(DEFAULT_RETENTION_DAYS, DEFAULT_RETENTION_DAYS)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub soft_deleted: u64,
    pub hard_deleted: u64,
    /// Rows whose transition failed; retried on the next run
    pub errors: u64,
}

pub struct RetentionSweeper {
    registry: Arc<dyn DeviceRegistry>,
    config: SweeperConfig,
}

impl RetentionSweeper {
    pub fn new(registry: Arc<dyn DeviceRegistry>, config: SweeperConfig) -> Self {
        Self { registry, config }
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Run both passes as of `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let (soft_deleted, soft_errors) = self.soft_delete_pass(now).await;
        report.soft_deleted = soft_deleted;
        report.errors += soft_errors;

        let (hard_deleted, hard_errors) = self.hard_delete_pass(now).await;
        report.hard_deleted = hard_deleted;
        report.errors += hard_errors;

        tracing::info!(
            soft_deleted = report.soft_deleted,
            hard_deleted = report.hard_deleted,
            errors = report.errors,
            "Device retention sweep finished"
        );

        report
    }

    async fn soft_delete_pass(&self, now: DateTime<Utc>) -> (u64, u64) {
        let cutoff = now - self.config.disabled_retention;
        let page_size = self.config.page_size.max(1);
        let mut done = 0;
        let mut errors = 0;
        let mut skipped: Vec<Uuid> = Vec::new();

        loop {
            let ids = match self.registry.disabled_before(cutoff, &skipped, page_size).await {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not list disabled devices, soft-delete pass stopped");
                    errors += 1;
                    break;
                }
            };
            let page_len = ids.len() as i64;

            for id in ids {
                match self.registry.soft_delete(id, cutoff, now).await {
                    Ok(true) => done += 1,
                    // Re-enabled or already handled since listing.
                    Ok(false) => skipped.push(id),
                    Err(e) => {
                        tracing::warn!(device_row = %id, error = %e, "Soft delete failed");
                        errors += 1;
                        skipped.push(id);
                    }
                }
            }

            if page_len < page_size {
                break;
            }
        }

        (done, errors)
    }

    async fn hard_delete_pass(&self, now: DateTime<Utc>) -> (u64, u64) {
        let cutoff = now - self.config.deleted_retention;
        let page_size = self.config.page_size.max(1);
        let mut done = 0;
        let mut errors = 0;
        let mut skipped: Vec<Uuid> = Vec::new();

        loop {
            let ids = match self
                .registry
                .soft_deleted_before(cutoff, &skipped, page_size)
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not list soft-deleted devices, hard-delete pass stopped");
                    errors += 1;
                    break;
                }
            };
            let page_len = ids.len() as i64;

            for id in ids {
                match self.registry.hard_delete(id, cutoff).await {
                    Ok(true) => done += 1,
                    Ok(false) => skipped.push(id),
                    Err(e) => {
                        tracing::warn!(device_row = %id, error = %e, "Hard delete failed");
                        errors += 1;
                        skipped.push(id);
                    }
                }
            }

            if page_len < page_size {
                break;
            }
        }

        (done, errors)
    }

    /// Sweep every `interval` until the task is cancelled.
    pub async fn run(&self, interval: Duration) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            disabled_retention_days = self.config.disabled_retention.num_days(),
            deleted_retention_days = self.config.deleted_retention.num_days(),
            "Retention sweeper started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }
}
