// libs/notification-cell/src/services.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    CreateNotificationRequest, Notification, NotificationError, NotificationPreference,
    UpdatePreferencesRequest,
};

/// Recipient-scoped notification inbox plus per-user preferences.
pub struct NotificationService {
    supabase: Arc<SupabaseClient>,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub async fn list(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        auth_token: &str,
    ) -> Result<Vec<Notification>, NotificationError> {
        let mut parts = vec![format!("recipient_id=eq.{}", recipient_id)];
        if unread_only {
            parts.push("is_read=eq.false".to_string());
        }
        parts.push("order=created_at.desc".to_string());

        let path = format!("/rest/v1/notifications?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))
    }

    pub async fn create(
        &self,
        request: CreateNotificationRequest,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        if request.title.trim().is_empty() {
            return Err(NotificationError::ValidationError(
                "Title must not be empty".to_string(),
            ));
        }

        let inserted: Vec<Notification> = self
            .supabase
            .insert_returning(
                "notifications",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "recipient_id": request.recipient_id,
                    "notification_type": request.notification_type,
                    "title": request.title,
                    "message": request.message,
                    "related_object_id": request.related_object_id,
                    "related_object_type": request.related_object_type,
                    "is_read": false,
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        inserted
            .into_iter()
            .next()
            .ok_or_else(|| NotificationError::DatabaseError("Insert returned no row".to_string()))
    }

    /// Mark one of the recipient's notifications read. The recipient filter in
    /// the PATCH keeps one user from touching another's inbox.
    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        let updated: Vec<Notification> = self
            .supabase
            .update_returning(
                "notifications",
                &format!("id=eq.{}&recipient_id=eq.{}", notification_id, recipient_id),
                auth_token,
                json!({ "is_read": true }),
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(NotificationError::NotFound)
    }

    pub async fn mark_all_read(
        &self,
        recipient_id: Uuid,
        auth_token: &str,
    ) -> Result<usize, NotificationError> {
        let updated: Vec<Notification> = self
            .supabase
            .update_returning(
                "notifications",
                &format!("recipient_id=eq.{}&is_read=eq.false", recipient_id),
                auth_token,
                json!({ "is_read": true }),
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        info!("Marked {} notifications read for {}", updated.len(), recipient_id);
        Ok(updated.len())
    }

    pub async fn delete(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
        auth_token: &str,
    ) -> Result<(), NotificationError> {
        let deleted: Vec<Notification> = self
            .supabase
            .delete_returning(
                "notifications",
                &format!("id=eq.{}&recipient_id=eq.{}", notification_id, recipient_id),
                auth_token,
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        if deleted.is_empty() {
            return Err(NotificationError::NotFound);
        }
        Ok(())
    }

    /// Fetch preferences, creating the default row on first access.
    pub async fn get_preferences(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<NotificationPreference, NotificationError> {
        let path = format!("/rest/v1/notification_preferences?user_id=eq.{}", user_id);
        let existing: Vec<NotificationPreference> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        if let Some(prefs) = existing.into_iter().next() {
            return Ok(prefs);
        }

        debug!("Creating default notification preferences for {}", user_id);
        let inserted: Vec<NotificationPreference> = self
            .supabase
            .insert_returning(
                "notification_preferences",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "user_id": user_id,
                    "appointment_notifications": true,
                    "message_notifications": true,
                    "exercise_notifications": true,
                    "system_notifications": true,
                    "updated_at": Utc::now().to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        inserted
            .into_iter()
            .next()
            .ok_or_else(|| NotificationError::DatabaseError("Insert returned no row".to_string()))
    }

    pub async fn update_preferences(
        &self,
        user_id: Uuid,
        request: UpdatePreferencesRequest,
        auth_token: &str,
    ) -> Result<NotificationPreference, NotificationError> {
        // Make sure the row exists before patching it.
        self.get_preferences(user_id, auth_token).await?;

        let mut update = Map::new();
        if let Some(v) = request.appointment_notifications {
            update.insert("appointment_notifications".to_string(), json!(v));
        }
        if let Some(v) = request.message_notifications {
            update.insert("message_notifications".to_string(), json!(v));
        }
        if let Some(v) = request.exercise_notifications {
            update.insert("exercise_notifications".to_string(), json!(v));
        }
        if let Some(v) = request.system_notifications {
            update.insert("system_notifications".to_string(), json!(v));
        }
        if update.is_empty() {
            return Err(NotificationError::ValidationError("Nothing to update".to_string()));
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated: Vec<NotificationPreference> = self
            .supabase
            .update_returning(
                "notification_preferences",
                &format!("user_id=eq.{}", user_id),
                auth_token,
                Value::Object(update),
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(NotificationError::NotFound)
    }
}
