// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::policy::{AccessScope, Action, Resource};

use crate::models::{
    AppointmentError, AppointmentSearchQuery, BookAppointmentRequest, CancelAppointmentRequest,
    CompleteAppointmentRequest, ConflictCheckQuery, FeedbackRequest, UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::feedback::FeedbackService;

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::ConflictDetected => {
            AppError::Conflict("Appointment slot conflicts with an existing booking".to_string())
        }
        AppointmentError::InvalidTime(msg) => AppError::BadRequest(msg),
        AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
        AppointmentError::CancellationWindowExpired => AppError::BadRequest(e.to_string()),
        AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::FeedbackExists | AppointmentError::AppointmentNotCompleted => {
            AppError::BadRequest(e.to_string())
        }
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn actor_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

fn scope_for(user: &User, resource: Resource, action: Action) -> Result<AccessScope, AppError> {
    let scope = AccessScope::for_actor(actor_id(user)?, user.clinic_role(), resource, action);
    if scope.is_denied() {
        return Err(AppError::Forbidden(
            "Not authorized for this operation".to_string(),
        ));
    }
    Ok(scope)
}

// ==============================================================================
// BOOKING AND LISTING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    scope_for(&user, Resource::Appointment, Action::Create)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .book_appointment(request, &user, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment.to_view(Utc::now()),
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = scope_for(&user, Resource::Appointment, Action::Read)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    if !scope.permits_row(appointment.patient_id, appointment.physiotherapist_id) {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "appointment": appointment.to_view(Utc::now())
    })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AppointmentSearchQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = scope_for(&user, Resource::Appointment, Action::List)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .search_appointments(query, &scope, token)
        .await
        .map_err(map_appointment_error)?;

    let now = Utc::now();
    let views: Vec<_> = appointments.iter().map(|a| a.to_view(now)).collect();

    Ok(Json(json!({
        "success": true,
        "count": views.len(),
        "appointments": views
    })))
}

#[axum::debug_handler]
pub async fn get_upcoming_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = scope_for(&user, Resource::Appointment, Action::List)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .get_upcoming_appointments(&scope, token)
        .await
        .map_err(map_appointment_error)?;

    let now = Utc::now();
    let views: Vec<_> = appointments.iter().map(|a| a.to_view(now)).collect();

    Ok(Json(json!({
        "success": true,
        "count": views.len(),
        "appointments": views
    })))
}

#[axum::debug_handler]
pub async fn get_today_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = scope_for(&user, Resource::Appointment, Action::List)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .get_today_appointments(&scope, token)
        .await
        .map_err(map_appointment_error)?;

    let now = Utc::now();
    let views: Vec<_> = appointments.iter().map(|a| a.to_view(now)).collect();

    Ok(Json(json!({
        "success": true,
        "count": views.len(),
        "appointments": views
    })))
}

#[axum::debug_handler]
pub async fn get_appointment_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = scope_for(&user, Resource::Appointment, Action::List)?;

    let booking_service = AppointmentBookingService::new(&state);
    let stats = booking_service
        .get_appointment_stats(&scope, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "stats": stats
    })))
}

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<ConflictCheckQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);
    let response = booking_service
        .check_conflicts(
            query.physiotherapist_id,
            query.date,
            query.start_time,
            query.end_time,
            query.exclude_appointment_id,
            token,
        )
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "has_conflict": response.has_conflict,
        "conflicting_appointments": response.conflicting_appointments
    })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = scope_for(&user, Resource::Appointment, Action::Update)?;

    let booking_service = AppointmentBookingService::new(&state);
    let existing = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;
    if !scope.permits_row(existing.patient_id, existing.physiotherapist_id) {
        return Err(AppError::Forbidden(
            "Not authorized to modify this appointment".to_string(),
        ));
    }

    let appointment = booking_service
        .update_appointment(appointment_id, request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment.to_view(Utc::now()),
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Either party on the appointment may confirm it.
    let scope = scope_for(&user, Resource::Appointment, Action::Update)?;
    let booking_service = AppointmentBookingService::new(&state);
    let existing = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;
    if !scope.permits_row(existing.patient_id, existing.physiotherapist_id) {
        return Err(AppError::Forbidden(
            "Not authorized to confirm this appointment".to_string(),
        ));
    }

    let appointment = booking_service
        .confirm_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment.to_view(Utc::now()),
        "message": "Appointment confirmed"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = scope_for(&user, Resource::Appointment, Action::Update)?;

    let booking_service = AppointmentBookingService::new(&state);
    let existing = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;
    if !scope.permits_row(existing.patient_id, existing.physiotherapist_id) {
        return Err(AppError::Forbidden(
            "Not authorized to cancel this appointment".to_string(),
        ));
    }

    let appointment = booking_service
        .cancel_appointment(appointment_id, request, &user, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment.to_view(Utc::now()),
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .complete_appointment(appointment_id, request, &user, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment.to_view(Utc::now()),
        "message": "Appointment completed"
    })))
}

// ==============================================================================
// FEEDBACK HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn submit_feedback(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    scope_for(&user, Resource::AppointmentFeedback, Action::Create)?;

    let feedback_service = FeedbackService::new(&state);
    let feedback = feedback_service
        .submit_feedback(appointment_id, request, &user, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "feedback": feedback,
        "message": "Feedback submitted"
    })))
}

#[axum::debug_handler]
pub async fn get_feedback(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = scope_for(&user, Resource::AppointmentFeedback, Action::Read)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;
    if !scope.permits_row(appointment.patient_id, appointment.physiotherapist_id) {
        return Err(AppError::Forbidden(
            "Not authorized to view this feedback".to_string(),
        ));
    }

    let feedback_service = FeedbackService::new(&state);
    let feedback = feedback_service
        .get_feedback(appointment_id, token)
        .await
        .map_err(map_appointment_error)?
        .ok_or_else(|| AppError::NotFound("No feedback for this appointment".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "feedback": feedback
    })))
}
