// libs/auth-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{TokenResponse, User};
use shared_models::error::AppError;
use shared_models::policy::Role;
use shared_utils::jwt;

use crate::models::{
    AuthError, LoginRequest, RegisterRequest, UpdatePatientProfileRequest,
    UpdatePhysiotherapistProfileRequest, UpdateProfileRequest,
};
use crate::services::AccountService;

fn map_auth_error(e: AuthError) -> AppError {
    match e {
        AuthError::InvalidCredentials => AppError::Auth(e.to_string()),
        AuthError::AccountLocked(_) => AppError::Locked(e.to_string()),
        AuthError::EmailTaken => AppError::BadRequest(e.to_string()),
        AuthError::ProfileNotFound => AppError::NotFound(e.to_string()),
        AuthError::ValidationError(msg) => AppError::ValidationError(msg),
        AuthError::Provider(msg) => AppError::ExternalService(msg),
        AuthError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// Helper function to extract token
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    if !auth_value.starts_with("Bearer ") {
        return Err(AppError::Auth("Invalid authorization header format".to_string()));
    }

    Ok(auth_value[7..].to_string())
}

#[axum::debug_handler]
pub async fn register(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AccountService::new(&config);
    let profile = service.register(request).await.map_err(map_auth_error)?;

    Ok(Json(json!({
        "success": true,
        "user": profile,
        "message": "Account created"
    })))
}

#[axum::debug_handler]
pub async fn login(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AccountService::new(&config);
    let session = service.login(request).await.map_err(map_auth_error)?;

    Ok(Json(json!({
        "success": true,
        "session": session
    })))
}

#[axum::debug_handler]
pub async fn validate_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = extract_bearer_token(&headers)?;

    match jwt::validate_token(&token, &config.supabase_jwt_secret) {
        Ok(user) => Ok(Json(TokenResponse {
            valid: true,
            user_id: user.id,
            email: user.email,
            role: user.role,
        })),
        Err(err) => Err(AppError::Auth(err.to_string())),
    }
}

#[axum::debug_handler]
pub async fn get_me(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    debug!("Getting profile for user: {}", user.id);

    let service = AccountService::new(&config);
    let profile = service
        .get_profile(&user.id, auth.token())
        .await
        .map_err(map_auth_error)?;
    let role_profile = service
        .get_role_profile(&user.id, &profile.role, auth.token())
        .await
        .map_err(map_auth_error)?;

    Ok(Json(json!({
        "success": true,
        "user": profile,
        "role_profile": role_profile
    })))
}

#[axum::debug_handler]
pub async fn update_patient_profile(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdatePatientProfileRequest>,
) -> Result<Json<Value>, AppError> {
    if user.clinic_role() != Role::Patient {
        return Err(AppError::Forbidden(
            "Only patients have a patient profile".to_string(),
        ));
    }

    let profile = AccountService::new(&config)
        .update_patient_profile(&user.id, request, auth.token())
        .await
        .map_err(map_auth_error)?;

    Ok(Json(json!({
        "success": true,
        "profile": profile,
        "message": "Profile updated"
    })))
}

#[axum::debug_handler]
pub async fn update_physiotherapist_profile(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdatePhysiotherapistProfileRequest>,
) -> Result<Json<Value>, AppError> {
    if user.clinic_role() != Role::Physiotherapist {
        return Err(AppError::Forbidden(
            "Only physiotherapists have a clinician profile".to_string(),
        ));
    }

    let profile = AccountService::new(&config)
        .update_physiotherapist_profile(&user.id, request, auth.token())
        .await
        .map_err(map_auth_error)?;

    Ok(Json(json!({
        "success": true,
        "profile": profile,
        "message": "Profile updated"
    })))
}

#[axum::debug_handler]
pub async fn get_profile_by_id(
    State(config): State<Arc<AppConfig>>,
    Path(user_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can read other profiles".to_string(),
        ));
    }

    let service = AccountService::new(&config);
    let profile = service
        .get_profile(&user_id.to_string(), auth.token())
        .await
        .map_err(map_auth_error)?;
    let role_profile = service
        .get_role_profile(&user_id.to_string(), &profile.role, auth.token())
        .await
        .map_err(map_auth_error)?;

    Ok(Json(json!({
        "success": true,
        "user": profile,
        "role_profile": role_profile
    })))
}

#[axum::debug_handler]
pub async fn update_me(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AccountService::new(&config);
    let profile = service
        .update_profile(&user.id, request, auth.token())
        .await
        .map_err(map_auth_error)?;

    Ok(Json(json!({
        "success": true,
        "user": profile,
        "message": "Profile updated"
    })))
}
