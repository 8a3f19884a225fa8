// libs/notification-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Appointment,
    Message,
    Exercise,
    System,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationType::Appointment => "appointment",
            NotificationType::Message => "message",
            NotificationType::Exercise => "exercise",
            NotificationType::System => "system",
        };
        write!(f, "{}", s)
    }
}

/// One inbox entry. `related_object_*` points back at whatever triggered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_object_id: Option<Uuid>,
    pub related_object_type: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-user delivery toggles, one row per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub id: Uuid,
    pub user_id: Uuid,
    pub appointment_notifications: bool,
    pub message_notifications: bool,
    pub exercise_notifications: bool,
    pub system_notifications: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_object_id: Option<Uuid>,
    pub related_object_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub appointment_notifications: Option<bool>,
    pub message_notifications: Option<bool>,
    pub exercise_notifications: Option<bool>,
    pub system_notifications: Option<bool>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotFound,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
