// libs/notification-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateNotificationRequest, NotificationError, UpdatePreferencesRequest};
use crate::services::NotificationService;

fn map_notification_error(e: NotificationError) -> AppError {
    match e {
        NotificationError::NotFound => AppError::NotFound(e.to_string()),
        NotificationError::Forbidden(msg) => AppError::Forbidden(msg),
        NotificationError::ValidationError(msg) => AppError::ValidationError(msg),
        NotificationError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn actor_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let notifications = NotificationService::new(&state)
        .list(actor_id(&user)?, false, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({
        "success": true,
        "count": notifications.len(),
        "notifications": notifications
    })))
}

#[axum::debug_handler]
pub async fn list_unread(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let notifications = NotificationService::new(&state)
        .list(actor_id(&user)?, true, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({
        "success": true,
        "count": notifications.len(),
        "notifications": notifications
    })))
}

/// System/staff entry point for pushing a notification into an inbox.
#[axum::debug_handler]
pub async fn create_notification(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can create notifications directly".to_string(),
        ));
    }

    let notification = NotificationService::new(&state)
        .create(request, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({ "success": true, "notification": notification })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<Arc<AppConfig>>,
    Path(notification_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let notification = NotificationService::new(&state)
        .mark_read(notification_id, actor_id(&user)?, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({ "success": true, "notification": notification })))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let marked = NotificationService::new(&state)
        .mark_all_read(actor_id(&user)?, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({ "success": true, "marked": marked })))
}

#[axum::debug_handler]
pub async fn delete_notification(
    State(state): State<Arc<AppConfig>>,
    Path(notification_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    NotificationService::new(&state)
        .delete(notification_id, actor_id(&user)?, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({ "success": true, "message": "Notification deleted" })))
}

#[axum::debug_handler]
pub async fn get_preferences(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let preferences = NotificationService::new(&state)
        .get_preferences(actor_id(&user)?, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({ "success": true, "preferences": preferences })))
}

#[axum::debug_handler]
pub async fn update_preferences(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdatePreferencesRequest>,
) -> Result<Json<Value>, AppError> {
    let preferences = NotificationService::new(&state)
        .update_preferences(actor_id(&user)?, request, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({
        "success": true,
        "preferences": preferences,
        "message": "Preferences updated"
    })))
}
