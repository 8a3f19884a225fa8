// libs/library-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn library_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_books))
        .route("/", post(handlers::create_book))
        .route("/categories", get(handlers::list_categories))
        .route("/categories", post(handlers::create_category))
        .route("/bookmarked", get(handlers::list_bookmarked))
        .route("/{book_id}", get(handlers::get_book))
        .route("/{book_id}", put(handlers::update_book))
        .route("/{book_id}/reviews", get(handlers::list_reviews))
        .route("/{book_id}/reviews", post(handlers::create_review))
        .route("/{book_id}/bookmark", post(handlers::toggle_bookmark))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
