use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use auth_cell::router::auth_routes;
use chat_cell::router::chat_routes;
use exercise_cell::router::exercise_routes;
use library_cell::router::library_routes;
use notification_cell::router::notification_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Physio Clinic API is running!" }))
        .nest("/auth", auth_routes(state.clone()))
        .nest("/api/appointments", appointment_routes(state.clone()))
        .nest("/api/exercises", exercise_routes(state.clone()))
        .nest("/api/notifications", notification_routes(state.clone()))
        .nest("/api/chat", chat_routes(state.clone()))
        .nest("/api/books", library_routes(state))
}
