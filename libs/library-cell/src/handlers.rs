// libs/library-cell/src/handlers.rs
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
    BookListQuery, CreateBookRequest, CreateCategoryRequest, CreateReviewRequest, LibraryError,
    UpdateBookRequest,
};
use crate::services::LibraryService;

fn map_library_error(e: LibraryError) -> AppError {
    match e {
        LibraryError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
        LibraryError::DuplicateReview | LibraryError::DuplicateIsbn => {
            AppError::BadRequest(e.to_string())
        }
        LibraryError::Forbidden(msg) => AppError::Forbidden(msg),
        LibraryError::ValidationError(msg) => AppError::ValidationError(msg),
        LibraryError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn require_scope(user: &User, resource: Resource, action: Action) -> Result<(), AppError> {
    let actor_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;
    if AccessScope::for_actor(actor_id, user.clinic_role(), resource, action).is_denied() {
        return Err(AppError::Forbidden("Not authorized for this operation".to_string()));
    }
    Ok(())
}

// ==============================================================================
// CATALOG HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_books(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<BookListQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_scope(&user, Resource::Book, Action::List)?;
    let books = LibraryService::new(&state)
        .list_books(query, auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({ "success": true, "count": books.len(), "books": books })))
}

#[axum::debug_handler]
pub async fn get_book(
    State(state): State<Arc<AppConfig>>,
    Path(book_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_scope(&user, Resource::Book, Action::Read)?;
    let book = LibraryService::new(&state)
        .get_book(book_id, auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({ "success": true, "book": book })))
}

#[axum::debug_handler]
pub async fn create_book(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBookRequest>,
) -> Result<Json<Value>, AppError> {
    require_scope(&user, Resource::Book, Action::Create)?;
    let book = LibraryService::new(&state)
        .create_book(request, auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({ "success": true, "book": book, "message": "Book added" })))
}

#[axum::debug_handler]
pub async fn update_book(
    State(state): State<Arc<AppConfig>>,
    Path(book_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateBookRequest>,
) -> Result<Json<Value>, AppError> {
    require_scope(&user, Resource::Book, Action::Update)?;
    let book = LibraryService::new(&state)
        .update_book(book_id, request, auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({ "success": true, "book": book, "message": "Book updated" })))
}

#[axum::debug_handler]
pub async fn list_categories(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_scope(&user, Resource::Book, Action::List)?;
    let categories = LibraryService::new(&state)
        .list_categories(auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({ "success": true, "categories": categories })))
}

#[axum::debug_handler]
pub async fn create_category(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<Json<Value>, AppError> {
    require_scope(&user, Resource::Book, Action::Create)?;
    let category = LibraryService::new(&state)
        .create_category(request, auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({ "success": true, "category": category })))
}

// ==============================================================================
// REVIEW AND BOOKMARK HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_reviews(
    State(state): State<Arc<AppConfig>>,
    Path(book_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_scope(&user, Resource::BookReview, Action::List)?;
    let reviews = LibraryService::new(&state)
        .list_reviews(book_id, auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({ "success": true, "count": reviews.len(), "reviews": reviews })))
}

#[axum::debug_handler]
pub async fn create_review(
    State(state): State<Arc<AppConfig>>,
    Path(book_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateReviewRequest>,
) -> Result<Json<Value>, AppError> {
    require_scope(&user, Resource::BookReview, Action::Create)?;
    let review = LibraryService::new(&state)
        .create_review(book_id, request, &user, auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({ "success": true, "review": review, "message": "Review added" })))
}

#[axum::debug_handler]
pub async fn toggle_bookmark(
    State(state): State<Arc<AppConfig>>,
    Path(book_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let result = LibraryService::new(&state)
        .toggle_bookmark(book_id, &user, auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({
        "success": true,
        "book_id": result.book_id,
        "bookmarked": result.bookmarked
    })))
}

#[axum::debug_handler]
pub async fn list_bookmarked(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let books = LibraryService::new(&state)
        .list_bookmarked_books(&user, auth.token())
        .await
        .map_err(map_library_error)?;

    Ok(Json(json!({ "success": true, "count": books.len(), "books": books })))
}
