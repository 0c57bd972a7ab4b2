//! Entry points called by business logic.

use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    Notification, NotificationDispatchRequest, NotificationDraft, PushDevice, RegisterDevice,
};

use crate::registry::DeviceRegistry;
use crate::store::{NewNotification, NotificationStore};
use crate::unit_of_work::UnitOfWork;

pub struct NotificationService;

impl NotificationService {
    /// Write one feed row per recipient and buffer the matching push intent,
    /// both inside the caller's unit of work.
    ///
    /// The push goes out only if `uow` later commits.
    pub async fn enqueue_notification(
        uow: &mut UnitOfWork,
        draft: &NotificationDraft,
    ) -> Result<Vec<Notification>, AppError> {
        if draft.title.trim().is_empty() {
            return Err(AppError::Validation("title must not be empty".to_string()));
        }

        let request = NotificationDispatchRequest::new(
            draft.recipient_user_ids.iter().copied(),
            draft.title.clone(),
            draft.body.clone(),
            draft.link_url.clone(),
        )?;

        let entry = NewNotification {
            notification_type: draft.notification_type,
            title: &draft.title,
            content: &draft.body,
            link_url: draft.link_url.as_deref(),
            target_id: draft.target_id.as_deref(),
        };

        let mut rows = Vec::with_capacity(request.recipient_user_ids().len());
        for user_id in request.recipient_user_ids() {
            rows.push(NotificationStore::insert(uow.conn(), *user_id, &entry).await?);
        }

        tracing::debug!(
            recipients = rows.len(),
            notification_type = %draft.notification_type,
            "Feed entries written, push intent buffered"
        );

        uow.enqueue(request);
        Ok(rows)
    }

    pub async fn register_device(
        registry: &dyn DeviceRegistry,
        registration: RegisterDevice,
    ) -> Result<PushDevice, AppError> {
        registry.register(registration).await
    }

    /// Opt a user's devices in or out of push. Returns rows changed.
    pub async fn set_user_device_enabled(
        registry: &dyn DeviceRegistry,
        user_id: Uuid,
        enabled: bool,
    ) -> Result<u64, AppError> {
        registry.set_user_devices_enabled(user_id, enabled).await
    }

    /// Re-enable one of the caller's own devices.
    pub async fn enable_device(
        registry: &dyn DeviceRegistry,
        user_id: Uuid,
        device_row: Uuid,
    ) -> Result<PushDevice, AppError> {
        let not_found = || AppError::NotFound(format!("Device {} not found", device_row));

        let device = registry.get(device_row).await?.ok_or_else(not_found)?;
        if device.user_id != Some(user_id) || device.deleted_at.is_some() {
            return Err(not_found());
        }
        if !registry.enable_by_id(device_row).await? {
            return Err(AppError::Validation(format!(
                "Push token of device {} is registered on another device",
                device_row
            )));
        }

        registry.get(device_row).await?.ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::types::Platform;

    use crate::memory::InMemoryDeviceRegistry;

    async fn registered(registry: &InMemoryDeviceRegistry, user: Uuid) -> PushDevice {
        NotificationService::register_device(
            registry,
            RegisterDevice {
                user_id: Some(user),
                device_id: "pixel-8".to_string(),
                push_token: "T1".to_string(),
                platform: Platform::Android,
                device_model: Some("Pixel 8".to_string()),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_enable_device_of_other_user_is_not_found() {
        let registry = InMemoryDeviceRegistry::new();
        let owner = Uuid::new_v4();
        let device = registered(&registry, owner).await;
        registry.disable_by_token("T1", "INVALID_TOKEN").await.unwrap();

        let result =
            NotificationService::enable_device(&registry, Uuid::new_v4(), device.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(!registry.get(device.id).await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_enable_device_whose_token_moved_is_rejected() {
        let registry = InMemoryDeviceRegistry::new();
        let owner = Uuid::new_v4();
        let device = registered(&registry, owner).await;
        // Another account signs in on the same handset.
        registered(&registry, Uuid::new_v4()).await;

        let result = NotificationService::enable_device(&registry, owner, device.id).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(!registry.get(device.id).await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_enable_own_device() {
        let registry = InMemoryDeviceRegistry::new();
        let owner = Uuid::new_v4();
        let device = registered(&registry, owner).await;
        NotificationService::set_user_device_enabled(&registry, owner, false)
            .await
            .unwrap();

        let enabled = NotificationService::enable_device(&registry, owner, device.id)
            .await
            .unwrap();
        assert!(enabled.enabled);
        assert!(enabled.disabled_reason.is_none());
    }
}
