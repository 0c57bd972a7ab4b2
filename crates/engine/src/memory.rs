//! In-memory device registry for tests and local runs without PostgreSQL.
//!
//! Mirrors the conditional-update semantics of [`crate::registry::PgDeviceRegistry`].
//! The clock can be pinned with [`InMemoryDeviceRegistry::set_now`] so that
//! retention windows can be exercised deterministically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{PushDevice, RegisterDevice};

use crate::registry::{DeviceRegistry, TOKEN_REASSIGNED_REASON};

#[derive(Default)]
struct State {
    devices: Vec<PushDevice>,
    now: Option<DateTime<Utc>>,
}

impl State {
    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

#[derive(Default)]
pub struct InMemoryDeviceRegistry {
    state: Mutex<State>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the registry clock; `None` goes back to wall-clock time.
    pub async fn set_now(&self, now: Option<DateTime<Utc>>) {
        self.state.lock().await.now = now;
    }

    /// Snapshot of every row, including disabled and soft-deleted ones.
    pub async fn all(&self) -> Vec<PushDevice> {
        self.state.lock().await.devices.clone()
    }
}

fn disable(device: &mut PushDevice, reason: &str, now: DateTime<Utc>) {
    device.enabled = false;
    device.disabled_at = Some(now);
    device.disabled_reason = Some(reason.to_string());
}

fn enable(device: &mut PushDevice) {
    device.enabled = true;
    device.disabled_at = None;
    device.disabled_reason = None;
}

/// Whether a row other than `id` holds `push_token` while enabled.
fn token_active_elsewhere(devices: &[PushDevice], push_token: &str, id: Uuid) -> bool {
    devices
        .iter()
        .any(|d| d.id != id && d.enabled && d.push_token == push_token)
}

#[async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn register(&self, registration: RegisterDevice) -> Result<PushDevice, AppError> {
        let reg = registration.validated()?;
        let mut state = self.state.lock().await;
        let now = state.now();

        let mut index = reg.user_id.and_then(|user_id| {
            state
                .devices
                .iter()
                .position(|d| d.user_id == Some(user_id) && d.device_id == reg.device_id)
        });
        if index.is_none() {
            index = state
                .devices
                .iter()
                .enumerate()
                .filter(|(_, d)| d.user_id.is_none() && d.push_token == reg.push_token)
                .max_by_key(|(_, d)| d.last_active_at)
                .map(|(i, _)| i);
        }

        let claimed = index.map(|i| state.devices[i].id);
        for other in state
            .devices
            .iter_mut()
            .filter(|d| d.push_token == reg.push_token && d.enabled && Some(d.id) != claimed)
        {
            disable(other, TOKEN_REASSIGNED_REASON, now);
        }

        let device = match index {
            Some(i) => {
                let device = &mut state.devices[i];
                device.user_id = reg.user_id;
                device.device_id = reg.device_id;
                device.push_token = reg.push_token;
                device.platform = reg.platform;
                device.device_model = reg.device_model;
                device.last_active_at = now;
                device.deleted_at = None;
                enable(device);
                device.clone()
            }
            None => {
                let device = PushDevice {
                    id: Uuid::new_v4(),
                    user_id: reg.user_id,
                    device_id: reg.device_id,
                    push_token: reg.push_token,
                    platform: reg.platform,
                    device_model: reg.device_model,
                    last_active_at: now,
                    enabled: true,
                    disabled_at: None,
                    disabled_reason: None,
                    deleted_at: None,
                    created_at: now,
                };
                state.devices.push(device.clone());
                device
            }
        };

        Ok(device)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PushDevice>, AppError> {
        let state = self.state.lock().await;
        Ok(state.devices.iter().find(|d| d.id == id).cloned())
    }

    async fn list_enabled_devices(&self, user_ids: &[Uuid]) -> Result<Vec<PushDevice>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .devices
            .iter()
            .filter(|d| d.is_deliverable())
            .filter(|d| d.user_id.is_some_and(|u| user_ids.contains(&u)))
            .cloned()
            .collect())
    }

    async fn disable_by_token(&self, push_token: &str, reason: &str) -> Result<u64, AppError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let mut count = 0;
        for device in state
            .devices
            .iter_mut()
            .filter(|d| d.push_token == push_token && d.enabled)
        {
            disable(device, reason, now);
            count += 1;
        }
        Ok(count)
    }

    async fn disable_all_for_user(&self, user_id: Uuid, reason: &str) -> Result<u64, AppError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let mut count = 0;
        for device in state
            .devices
            .iter_mut()
            .filter(|d| d.user_id == Some(user_id) && d.enabled)
        {
            disable(device, reason, now);
            count += 1;
        }
        Ok(count)
    }

    async fn enable_by_id(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let Some(i) = state
            .devices
            .iter()
            .position(|d| d.id == id && d.deleted_at.is_none())
        else {
            return Ok(false);
        };
        if token_active_elsewhere(&state.devices, &state.devices[i].push_token, id) {
            return Ok(false);
        }
        enable(&mut state.devices[i]);
        Ok(true)
    }

    async fn enable_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut state = self.state.lock().await;
        let mut candidates: Vec<usize> = state
            .devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.user_id == Some(user_id) && !d.enabled && d.deleted_at.is_none())
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by_key(|&i| std::cmp::Reverse(state.devices[i].last_active_at));

        let mut count = 0;
        for i in candidates {
            let device = &state.devices[i];
            if token_active_elsewhere(&state.devices, &device.push_token, device.id) {
                continue;
            }
            enable(&mut state.devices[i]);
            count += 1;
        }
        Ok(count)
    }

    async fn disabled_before(
        &self,
        cutoff: DateTime<Utc>,
        exclude: &[Uuid],
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let state = self.state.lock().await;
        let mut rows: Vec<(DateTime<Utc>, Uuid)> = state
            .devices
            .iter()
            .filter(|d| !d.enabled && d.deleted_at.is_none() && !exclude.contains(&d.id))
            .filter_map(|d| d.disabled_at.filter(|at| *at < cutoff).map(|at| (at, d.id)))
            .collect();
        rows.sort();
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let target = state.devices.iter_mut().find(|d| {
            d.id == id
                && !d.enabled
                && d.deleted_at.is_none()
                && d.disabled_at.is_some_and(|at| at < cutoff)
        });
        match target {
            Some(device) => {
                device.deleted_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
        exclude: &[Uuid],
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let state = self.state.lock().await;
        let mut rows: Vec<(DateTime<Utc>, Uuid)> = state
            .devices
            .iter()
            .filter(|d| !exclude.contains(&d.id))
            .filter_map(|d| d.deleted_at.filter(|at| *at < cutoff).map(|at| (at, d.id)))
            .collect();
        rows.sort();
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }

    async fn hard_delete(&self, id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let before = state.devices.len();
        state
            .devices
            .retain(|d| !(d.id == id && d.deleted_at.is_some_and(|at| at < cutoff)));
        Ok(state.devices.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::types::Platform;

    fn registration(user_id: Option<Uuid>, device_id: &str, token: &str) -> RegisterDevice {
        RegisterDevice {
            user_id,
            device_id: device_id.to_string(),
            push_token: token.to_string(),
            platform: Platform::Ios,
            device_model: Some("iPhone15,2".to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_then_list() {
        let registry = InMemoryDeviceRegistry::new();
        let user = Uuid::new_v4();
        let d1 = registry
            .register(registration(Some(user), "dev-1", "T1"))
            .await
            .unwrap();

        let devices = registry.list_enabled_devices(&[user]).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, d1.id);
    }

    #[tokio::test]
    async fn test_reregister_with_new_token_updates_same_row() {
        let registry = InMemoryDeviceRegistry::new();
        let user = Uuid::new_v4();
        let first = registry
            .register(registration(Some(user), "dev-1", "T1"))
            .await
            .unwrap();
        let second = registry
            .register(registration(Some(user), "dev-1", "T2"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.push_token, "T2");
        assert_eq!(registry.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_token() {
        let registry = InMemoryDeviceRegistry::new();
        let result = registry.register(registration(None, "dev-1", "")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(registry.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_device_claimed_on_login() {
        let registry = InMemoryDeviceRegistry::new();
        let anon = registry
            .register(registration(None, "dev-1", "T1"))
            .await
            .unwrap();
        assert!(anon.user_id.is_none());

        let user = Uuid::new_v4();
        let claimed = registry
            .register(registration(Some(user), "dev-1", "T1"))
            .await
            .unwrap();

        assert_eq!(anon.id, claimed.id);
        assert_eq!(claimed.user_id, Some(user));
        assert_eq!(registry.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_reenables_disabled_device() {
        let registry = InMemoryDeviceRegistry::new();
        let user = Uuid::new_v4();
        registry
            .register(registration(Some(user), "dev-1", "T1"))
            .await
            .unwrap();
        registry.disable_by_token("T1", "INVALID_TOKEN").await.unwrap();

        let device = registry
            .register(registration(Some(user), "dev-1", "T1-fresh"))
            .await
            .unwrap();
        assert!(device.enabled);
        assert!(device.disabled_at.is_none());
        assert!(device.disabled_reason.is_none());
    }

    #[tokio::test]
    async fn test_disable_by_token_is_idempotent() {
        let registry = InMemoryDeviceRegistry::new();
        let user = Uuid::new_v4();
        registry
            .register(registration(Some(user), "dev-1", "T1"))
            .await
            .unwrap();

        assert_eq!(registry.disable_by_token("T1", "INVALID_TOKEN").await.unwrap(), 1);
        let after_once = registry.all().await;
        assert_eq!(registry.disable_by_token("T1", "UNREGISTERED").await.unwrap(), 0);
        let after_twice = registry.all().await;

        assert_eq!(after_once[0].disabled_at, after_twice[0].disabled_at);
        assert_eq!(after_twice[0].disabled_reason.as_deref(), Some("INVALID_TOKEN"));
        assert!(registry.list_enabled_devices(&[user]).await.unwrap().is_empty());
    }

    async fn active_rows_with(registry: &InMemoryDeviceRegistry, token: &str) -> Vec<PushDevice> {
        registry
            .all()
            .await
            .into_iter()
            .filter(|d| d.push_token == token && d.enabled)
            .collect()
    }

    #[tokio::test]
    async fn test_token_moves_to_new_user_on_same_phone() {
        let registry = InMemoryDeviceRegistry::new();
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let first = registry.register(registration(Some(u1), "phone", "T")).await.unwrap();
        let second = registry.register(registration(Some(u2), "phone", "T")).await.unwrap();

        let active = active_rows_with(&registry, "T").await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert!(registry.list_enabled_devices(&[u1]).await.unwrap().is_empty());

        let old = registry.get(first.id).await.unwrap().unwrap();
        assert_eq!(old.disabled_reason.as_deref(), Some(TOKEN_REASSIGNED_REASON));

        // Anonymous re-registration takes the token over again.
        let anon = registry.register(registration(None, "phone", "T")).await.unwrap();
        let active = active_rows_with(&registry, "T").await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, anon.id);
    }

    #[tokio::test]
    async fn test_enable_by_id_refuses_token_held_elsewhere() {
        let registry = InMemoryDeviceRegistry::new();
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let first = registry.register(registration(Some(u1), "phone", "T")).await.unwrap();
        registry.register(registration(Some(u2), "phone", "T")).await.unwrap();

        assert!(!registry.enable_by_id(first.id).await.unwrap());
        assert_eq!(registry.set_user_devices_enabled(u1, true).await.unwrap(), 0);
        assert_eq!(active_rows_with(&registry, "T").await.len(), 1);
    }

    #[tokio::test]
    async fn test_enable_all_keeps_one_row_per_token() {
        let registry = InMemoryDeviceRegistry::new();
        let user = Uuid::new_v4();
        let t0 = Utc::now();
        registry.set_now(Some(t0)).await;
        registry.register(registration(Some(user), "old", "T")).await.unwrap();
        registry.set_now(Some(t0 + chrono::Duration::minutes(5))).await;
        let newer = registry.register(registration(Some(user), "new", "T")).await.unwrap();
        registry.set_user_devices_enabled(user, false).await.unwrap();

        assert_eq!(registry.set_user_devices_enabled(user, true).await.unwrap(), 1);
        let active = active_rows_with(&registry, "T").await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, newer.id);
    }

    #[tokio::test]
    async fn test_set_user_devices_enabled_round_trip() {
        let registry = InMemoryDeviceRegistry::new();
        let user = Uuid::new_v4();
        registry.register(registration(Some(user), "a", "T1")).await.unwrap();
        registry.register(registration(Some(user), "b", "T2")).await.unwrap();

        assert_eq!(registry.set_user_devices_enabled(user, false).await.unwrap(), 2);
        assert!(registry.list_enabled_devices(&[user]).await.unwrap().is_empty());
        assert!(registry.all().await.iter().all(|d| {
            d.disabled_reason.as_deref() == Some(crate::registry::USER_OPT_OUT_REASON)
        }));

        assert_eq!(registry.set_user_devices_enabled(user, true).await.unwrap(), 2);
        assert_eq!(registry.list_enabled_devices(&[user]).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_enable_by_id_refuses_soft_deleted() {
        let registry = InMemoryDeviceRegistry::new();
        let t0 = Utc::now();
        registry.set_now(Some(t0)).await;
        let device = registry
            .register(registration(Some(Uuid::new_v4()), "a", "T1"))
            .await
            .unwrap();
        registry.disable_by_token("T1", "INVALID_TOKEN").await.unwrap();
        let later = t0 + chrono::Duration::days(1);
        assert!(registry.soft_delete(device.id, later, later).await.unwrap());

        assert!(!registry.enable_by_id(device.id).await.unwrap());
        let row = registry.get(device.id).await.unwrap().unwrap();
        assert!(!row.enabled);
        assert!(row.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_list_unknown_users_is_empty() {
        let registry = InMemoryDeviceRegistry::new();
        let devices = registry
            .list_enabled_devices(&[Uuid::new_v4()])
            .await
            .unwrap();
        assert!(devices.is_empty());
    }
}
