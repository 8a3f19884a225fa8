// libs/exercise-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn exercise_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        // Catalog
        .route("/categories", get(handlers::list_categories))
        .route("/categories", post(handlers::create_category))
        .route("/", get(handlers::list_exercises))
        .route("/", post(handlers::create_exercise))
        // Plans
        .route("/plans", get(handlers::list_plans))
        .route("/plans", post(handlers::create_plan))
        .route("/plans/active", get(handlers::list_active_plans))
        .route("/plans/{plan_id}", get(handlers::get_plan))
        .route("/plans/{plan_id}/activate", post(handlers::activate_plan))
        .route("/plans/{plan_id}/complete", post(handlers::complete_plan))
        .route("/plans/{plan_id}/items", post(handlers::add_plan_item))
        // Progress
        .route("/progress", get(handlers::list_progress))
        .route("/progress", post(handlers::log_progress))
        .route("/progress/stats", get(handlers::get_progress_stats))
        // Catalog item routes come last so fixed paths above match first.
        .route("/{exercise_id}", get(handlers::get_exercise))
        .route("/{exercise_id}", put(handlers::update_exercise))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
