// libs/auth-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn auth_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/validate", get(handlers::validate_token));

    let protected_routes = Router::new()
        .route("/me", get(handlers::get_me))
        .route("/me", put(handlers::update_me))
        .route("/me/patient-profile", put(handlers::update_patient_profile))
        .route(
            "/me/physiotherapist-profile",
            put(handlers::update_physiotherapist_profile),
        )
        .route("/profiles/{user_id}", get(handlers::get_profile_by_id))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
