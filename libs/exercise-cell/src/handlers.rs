// libs/exercise-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::policy::{AccessScope, Action, Resource};

use crate::models::{
    CreateCategoryRequest, CreateExerciseRequest, CreatePlanItemRequest, CreatePlanRequest,
    ExerciseError, ExerciseListQuery, LogProgressRequest, UpdateExerciseRequest,
};
use crate::services::catalog::CatalogService;
use crate::services::plans::PlanService;
use crate::services::progress::ProgressService;

fn map_exercise_error(e: ExerciseError) -> AppError {
    match e {
        ExerciseError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
        ExerciseError::DuplicateProgress => AppError::BadRequest(e.to_string()),
        ExerciseError::InvalidPlanTransition { .. } => AppError::BadRequest(e.to_string()),
        ExerciseError::Forbidden(msg) => AppError::Forbidden(msg),
        ExerciseError::ValidationError(msg) => AppError::ValidationError(msg),
        ExerciseError::DatabaseError(msg) => AppError::Database(msg),
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
// CATALOG HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_categories(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    scope_for(&user, Resource::ExerciseCatalog, Action::List)?;
    let categories = CatalogService::new(&state)
        .list_categories(auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "categories": categories })))
}

#[axum::debug_handler]
pub async fn create_category(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<Json<Value>, AppError> {
    scope_for(&user, Resource::ExerciseCatalog, Action::Create)?;
    let category = CatalogService::new(&state)
        .create_category(request, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "category": category })))
}

#[axum::debug_handler]
pub async fn list_exercises(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<ExerciseListQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    scope_for(&user, Resource::ExerciseCatalog, Action::List)?;
    let exercises = CatalogService::new(&state)
        .list_exercises(query, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({
        "success": true,
        "count": exercises.len(),
        "exercises": exercises
    })))
}

#[axum::debug_handler]
pub async fn get_exercise(
    State(state): State<Arc<AppConfig>>,
    Path(exercise_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    scope_for(&user, Resource::ExerciseCatalog, Action::Read)?;
    let exercise = CatalogService::new(&state)
        .get_exercise(exercise_id, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "exercise": exercise })))
}

#[axum::debug_handler]
pub async fn create_exercise(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateExerciseRequest>,
) -> Result<Json<Value>, AppError> {
    scope_for(&user, Resource::ExerciseCatalog, Action::Create)?;
    let exercise = CatalogService::new(&state)
        .create_exercise(request, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({
        "success": true,
        "exercise": exercise,
        "message": "Exercise created"
    })))
}

#[axum::debug_handler]
pub async fn update_exercise(
    State(state): State<Arc<AppConfig>>,
    Path(exercise_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateExerciseRequest>,
) -> Result<Json<Value>, AppError> {
    scope_for(&user, Resource::ExerciseCatalog, Action::Update)?;
    let exercise = CatalogService::new(&state)
        .update_exercise(exercise_id, request, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({
        "success": true,
        "exercise": exercise,
        "message": "Exercise updated"
    })))
}

// ==============================================================================
// PLAN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_plans(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_for(&user, Resource::ExercisePlan, Action::List)?;
    let plans = PlanService::new(&state)
        .list_plans(&scope, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "count": plans.len(), "plans": plans })))
}

#[axum::debug_handler]
pub async fn list_active_plans(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_for(&user, Resource::ExercisePlan, Action::List)?;
    let plans = PlanService::new(&state)
        .list_active_plans(&scope, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "count": plans.len(), "plans": plans })))
}

#[axum::debug_handler]
pub async fn get_plan(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_for(&user, Resource::ExercisePlan, Action::Read)?;

    let service = PlanService::new(&state);
    let plan = service
        .get_plan(plan_id, auth.token())
        .await
        .map_err(map_exercise_error)?;
    if !scope.permits_row(plan.patient_id, plan.physiotherapist_id) {
        return Err(AppError::Forbidden("Not authorized to view this plan".to_string()));
    }

    let items = service
        .list_plan_items(plan_id, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "plan": plan, "items": items })))
}

#[axum::debug_handler]
pub async fn create_plan(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePlanRequest>,
) -> Result<Json<Value>, AppError> {
    let plan = PlanService::new(&state)
        .create_plan(request, &user, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({
        "success": true,
        "plan": plan,
        "message": "Plan created"
    })))
}

#[axum::debug_handler]
pub async fn activate_plan(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let plan = PlanService::new(&state)
        .activate_plan(plan_id, &user, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "plan": plan, "message": "Plan activated" })))
}

#[axum::debug_handler]
pub async fn complete_plan(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let plan = PlanService::new(&state)
        .complete_plan(plan_id, &user, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "plan": plan, "message": "Plan completed" })))
}

#[axum::debug_handler]
pub async fn add_plan_item(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePlanItemRequest>,
) -> Result<Json<Value>, AppError> {
    let item = PlanService::new(&state)
        .add_plan_item(plan_id, request, &user, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "item": item, "message": "Item added" })))
}

// ==============================================================================
// PROGRESS HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn log_progress(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<LogProgressRequest>,
) -> Result<Json<Value>, AppError> {
    scope_for(&user, Resource::ExerciseProgress, Action::Create)?;
    let progress = ProgressService::new(&state)
        .log_progress(request, &user, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({
        "success": true,
        "progress": progress,
        "message": "Progress logged"
    })))
}

#[axum::debug_handler]
pub async fn list_progress(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_for(&user, Resource::ExerciseProgress, Action::List)?;
    let progress = ProgressService::new(&state)
        .list_progress(&scope, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({
        "success": true,
        "count": progress.len(),
        "progress": progress
    })))
}

#[axum::debug_handler]
pub async fn get_progress_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_for(&user, Resource::ExerciseProgress, Action::List)?;
    let stats = ProgressService::new(&state)
        .get_stats(&scope, auth.token())
        .await
        .map_err(map_exercise_error)?;

    Ok(Json(json!({ "success": true, "stats": stats })))
}
