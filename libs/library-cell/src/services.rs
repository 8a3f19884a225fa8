// libs/library-cell/src/services.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    Book, BookBookmark, BookCategory, BookListQuery, BookReview, BookmarkToggleResponse,
    CreateBookRequest, CreateCategoryRequest, CreateReviewRequest, LibraryError, UpdateBookRequest,
};

/// Book library: catalog, reviews, bookmarks.
pub struct LibraryService {
    supabase: Arc<SupabaseClient>,
}

impl LibraryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    // ==========================================================================
    // CATALOG
    // ==========================================================================

    pub async fn list_books(
        &self,
        query: BookListQuery,
        auth_token: &str,
    ) -> Result<Vec<Book>, LibraryError> {
        let mut parts = Vec::new();
        if let Some(category_id) = query.category_id {
            parts.push(format!("category_id=eq.{}", category_id));
        }
        if let Some(book_type) = query.book_type {
            parts.push(format!("book_type=eq.{}", book_type));
        }
        parts.push("order=title.asc".to_string());
        parts.push(format!("limit={}", query.limit.unwrap_or(100)));
        parts.push(format!("offset={}", query.offset.unwrap_or(0)));

        let path = format!("/rest/v1/books?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))
    }

    pub async fn get_book(&self, book_id: Uuid, auth_token: &str) -> Result<Book, LibraryError> {
        let path = format!("/rest/v1/books?id=eq.{}", book_id);
        let result: Vec<Book> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(LibraryError::NotFound("Book"))
    }

    pub async fn create_book(
        &self,
        request: CreateBookRequest,
        auth_token: &str,
    ) -> Result<Book, LibraryError> {
        if request.title.trim().is_empty() {
            return Err(LibraryError::ValidationError("Title must not be empty".to_string()));
        }

        let now = Utc::now();
        let inserted: Vec<Book> = self
            .supabase
            .insert_returning(
                "books",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "title": request.title,
                    "author": request.author,
                    "isbn": request.isbn,
                    "description": request.description,
                    "category_id": request.category_id,
                    "book_type": request.book_type,
                    "publication_date": request.publication_date.map(|d| d.to_string()),
                    "publisher": request.publisher,
                    "pages": request.pages,
                    "language": request.language,
                    "cover_image_url": request.cover_image_url,
                    "pdf_url": request.pdf_url,
                    "is_available": true,
                    "created_at": now.to_rfc3339(),
                    "updated_at": now.to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| match e {
                // Unique ISBN index.
                DbError::Conflict(_) => LibraryError::DuplicateIsbn,
                other => LibraryError::DatabaseError(other.to_string()),
            })?;

        let book = inserted
            .into_iter()
            .next()
            .ok_or_else(|| LibraryError::DatabaseError("Insert returned no row".to_string()))?;

        info!("Added book {} ({})", book.title, book.id);
        Ok(book)
    }

    pub async fn update_book(
        &self,
        book_id: Uuid,
        request: UpdateBookRequest,
        auth_token: &str,
    ) -> Result<Book, LibraryError> {
        let mut update = Map::new();
        if let Some(title) = request.title {
            update.insert("title".to_string(), json!(title));
        }
        if let Some(author) = request.author {
            update.insert("author".to_string(), json!(author));
        }
        if let Some(description) = request.description {
            update.insert("description".to_string(), json!(description));
        }
        if let Some(category_id) = request.category_id {
            update.insert("category_id".to_string(), json!(category_id));
        }
        if let Some(book_type) = request.book_type {
            update.insert("book_type".to_string(), json!(book_type));
        }
        if let Some(cover_image_url) = request.cover_image_url {
            update.insert("cover_image_url".to_string(), json!(cover_image_url));
        }
        if let Some(pdf_url) = request.pdf_url {
            update.insert("pdf_url".to_string(), json!(pdf_url));
        }
        if let Some(is_available) = request.is_available {
            update.insert("is_available".to_string(), json!(is_available));
        }
        if update.is_empty() {
            return Err(LibraryError::ValidationError("Nothing to update".to_string()));
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated: Vec<Book> = self
            .supabase
            .update_returning(
                "books",
                &format!("id=eq.{}", book_id),
                auth_token,
                Value::Object(update),
            )
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(LibraryError::NotFound("Book"))
    }

    pub async fn list_categories(
        &self,
        auth_token: &str,
    ) -> Result<Vec<BookCategory>, LibraryError> {
        self.supabase
            .request(
                Method::GET,
                "/rest/v1/book_categories?order=name.asc",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))
    }

    pub async fn create_category(
        &self,
        request: CreateCategoryRequest,
        auth_token: &str,
    ) -> Result<BookCategory, LibraryError> {
        if request.name.trim().is_empty() {
            return Err(LibraryError::ValidationError(
                "Category name must not be empty".to_string(),
            ));
        }

        let inserted: Vec<BookCategory> = self
            .supabase
            .insert_returning(
                "book_categories",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "name": request.name,
                    "description": request.description,
                }),
            )
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;

        inserted
            .into_iter()
            .next()
            .ok_or_else(|| LibraryError::DatabaseError("Insert returned no row".to_string()))
    }

    // ==========================================================================
    // REVIEWS
    // ==========================================================================

    pub async fn list_reviews(
        &self,
        book_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<BookReview>, LibraryError> {
        let path = format!(
            "/rest/v1/book_reviews?book_id=eq.{}&order=created_at.desc",
            book_id
        );
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))
    }

    pub async fn create_review(
        &self,
        book_id: Uuid,
        request: CreateReviewRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<BookReview, LibraryError> {
        if !(1..=5).contains(&request.rating) {
            return Err(LibraryError::ValidationError(
                "Rating must be between 1 and 5".to_string(),
            ));
        }

        // Confirm the book exists before attaching anything to it.
        self.get_book(book_id, auth_token).await?;

        let user_id = actor_uuid(actor)?;
        let existing: Vec<BookReview> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/book_reviews?book_id=eq.{}&user_id=eq.{}",
                    book_id, user_id
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
        if !existing.is_empty() {
            return Err(LibraryError::DuplicateReview);
        }

        let inserted: Vec<BookReview> = self
            .supabase
            .insert_returning(
                "book_reviews",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "book_id": book_id,
                    "user_id": user_id,
                    "rating": request.rating,
                    "review_text": request.review_text,
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => LibraryError::DuplicateReview,
                other => LibraryError::DatabaseError(other.to_string()),
            })?;

        inserted
            .into_iter()
            .next()
            .ok_or_else(|| LibraryError::DatabaseError("Insert returned no row".to_string()))
    }

    // ==========================================================================
    // BOOKMARKS
    // ==========================================================================

    /// Toggle: bookmark if absent, remove if present.
    pub async fn toggle_bookmark(
        &self,
        book_id: Uuid,
        actor: &User,
        auth_token: &str,
    ) -> Result<BookmarkToggleResponse, LibraryError> {
        let user_id = actor_uuid(actor)?;
        let filter = format!("book_id=eq.{}&user_id=eq.{}", book_id, user_id);

        let existing: Vec<BookBookmark> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/book_bookmarks?{}", filter),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;

        if existing.is_empty() {
            self.get_book(book_id, auth_token).await?;
            self.supabase
                .insert_returning::<BookBookmark>(
                    "book_bookmarks",
                    auth_token,
                    json!({
                        "id": Uuid::new_v4(),
                        "book_id": book_id,
                        "user_id": user_id,
                        "created_at": Utc::now().to_rfc3339(),
                    }),
                )
                .await
                .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
            debug!("User {} bookmarked book {}", user_id, book_id);
            Ok(BookmarkToggleResponse {
                book_id,
                bookmarked: true,
            })
        } else {
            self.supabase
                .delete_returning::<BookBookmark>("book_bookmarks", &filter, auth_token)
                .await
                .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
            debug!("User {} removed bookmark on book {}", user_id, book_id);
            Ok(BookmarkToggleResponse {
                book_id,
                bookmarked: false,
            })
        }
    }

    pub async fn list_bookmarked_books(
        &self,
        actor: &User,
        auth_token: &str,
    ) -> Result<Vec<Book>, LibraryError> {
        let user_id = actor_uuid(actor)?;
        let bookmarks: Vec<BookBookmark> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/book_bookmarks?user_id=eq.{}", user_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;

        if bookmarks.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = bookmarks.iter().map(|b| b.book_id.to_string()).collect();
        let path = format!("/rest/v1/books?id=in.({})&order=title.asc", ids.join(","));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))
    }
}

fn actor_uuid(user: &User) -> Result<Uuid, LibraryError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| LibraryError::ValidationError("Invalid user id".to_string()))
}
