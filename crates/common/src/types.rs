use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Device platform a push token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Ios => write!(f, "ios"),
            Platform::Android => write!(f, "android"),
            Platform::Web => write!(f, "web"),
        }
    }
}

/// Category of an in-app feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Notice,
    InquiryAnswer,
    Review,
    Comment,
    System,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::Notice => write!(f, "notice"),
            NotificationType::InquiryAnswer => write!(f, "inquiry_answer"),
            NotificationType::Review => write!(f, "review"),
            NotificationType::Comment => write!(f, "comment"),
            NotificationType::System => write!(f, "system"),
        }
    }
}

/// A registered push target.
///
/// `enabled` and `disabled_at` always move together; `deleted_at` is only
/// ever set on a disabled row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushDevice {
    pub id: Uuid,
    /// `None` while the app has not signed in yet
    pub user_id: Option<Uuid>,
    /// Client-supplied stable installation identifier
    pub device_id: String,
    pub push_token: String,
    pub platform: Platform,
    pub device_model: Option<String>,
    pub last_active_at: DateTime<Utc>,
    pub enabled: bool,
    pub disabled_at: Option<DateTime<Utc>>,
    pub disabled_reason: Option<String>,
    /// Soft-delete marker set by the retention sweeper
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PushDevice {
    /// Whether the row may receive pushes.
    pub fn is_deliverable(&self) -> bool {
        self.enabled && self.deleted_at.is_none()
    }
}

/// Input for device registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDevice {
    pub user_id: Option<Uuid>,
    pub device_id: String,
    pub push_token: String,
    pub platform: Platform,
    pub device_model: Option<String>,
}

impl RegisterDevice {
    /// Trim identifiers and reject empty ones.
    pub fn validated(mut self) -> Result<Self, AppError> {
        self.device_id = self.device_id.trim().to_string();
        self.push_token = self.push_token.trim().to_string();

        if self.device_id.is_empty() {
            return Err(AppError::Validation(
                "device_id must not be empty".to_string(),
            ));
        }
        if self.push_token.is_empty() {
            return Err(AppError::Validation(
                "push_token must not be empty".to_string(),
            ));
        }
        self.device_model = self
            .device_model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        Ok(self)
    }
}

/// A row of a user's in-app feed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub content: String,
    pub link_url: Option<String>,
    /// Opaque reference to the entity the entry is about
    pub target_id: Option<String>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Feed + push intent produced by business logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub recipient_user_ids: Vec<Uuid>,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub link_url: Option<String>,
    pub target_id: Option<String>,
}

/// Push intent released to the dispatcher once its unit of work commits.
///
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDispatchRequest {
    recipient_user_ids: Vec<Uuid>,
    pub title: String,
    pub body: String,
    pub link_url: Option<String>,
}

impl NotificationDispatchRequest {
    /// Build a request; recipients are de-duplicated keeping first occurrence order.
    pub fn new(
        recipient_user_ids: impl IntoIterator<Item = Uuid>,
        title: impl Into<String>,
        body: impl Into<String>,
        link_url: Option<String>,
    ) -> Result<Self, AppError> {
        let mut recipients: Vec<Uuid> = Vec::new();
        for id in recipient_user_ids {
            if !recipients.contains(&id) {
                recipients.push(id);
            }
        }

        if recipients.is_empty() {
            return Err(AppError::Validation(
                "recipient_user_ids must not be empty".to_string(),
            ));
        }

        Ok(Self {
            recipient_user_ids: recipients,
            title: title.into(),
            body: body.into(),
            link_url,
        })
    }

    pub fn recipient_user_ids(&self) -> &[Uuid] {
        &self.recipient_user_ids
    }
}
