// libs/notification-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn notification_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/", post(handlers::create_notification))
        .route("/unread", get(handlers::list_unread))
        .route("/mark_all_read", post(handlers::mark_all_read))
        .route("/preferences", get(handlers::get_preferences))
        .route("/preferences", put(handlers::update_preferences))
        .route("/{notification_id}/mark_read", post(handlers::mark_read))
        .route("/{notification_id}", delete(handlers::delete_notification))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
