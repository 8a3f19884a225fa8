// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/search", get(handlers::search_appointments))
        .route("/upcoming", get(handlers::get_upcoming_appointments))
        .route("/today", get(handlers::get_today_appointments))
        .route("/stats", get(handlers::get_appointment_stats))
        .route("/conflicts/check", get(handlers::check_appointment_conflicts))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}", put(handlers::update_appointment))
        .route("/{appointment_id}/confirm", post(handlers::confirm_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/{appointment_id}/feedback", post(handlers::submit_feedback))
        .route("/{appointment_id}/feedback", get(handlers::get_feedback))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
