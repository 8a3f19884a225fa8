// libs/library-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookType {
    Educational,
    Reference,
    Research,
    Guide,
    Manual,
}

impl fmt::Display for BookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookType::Educational => "educational",
            BookType::Reference => "reference",
            BookType::Research => "research",
            BookType::Guide => "guide",
            BookType::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

/// Library catalog entry. Files live in external storage; only URLs are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub category_id: Uuid,
    pub book_type: BookType,
    pub publication_date: Option<NaiveDate>,
    pub publisher: Option<String>,
    pub pages: Option<i32>,
    pub language: Option<String>,
    pub cover_image_url: Option<String>,
    pub pdf_url: Option<String>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One review per user per book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookReview {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub review_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookBookmark {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub category_id: Uuid,
    pub book_type: BookType,
    pub publication_date: Option<NaiveDate>,
    pub publisher: Option<String>,
    pub pages: Option<i32>,
    pub language: Option<String>,
    pub cover_image_url: Option<String>,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub book_type: Option<BookType>,
    pub cover_image_url: Option<String>,
    pub pdf_url: Option<String>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i16,
    pub review_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookListQuery {
    pub category_id: Option<Uuid>,
    pub book_type: Option<BookType>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookmarkToggleResponse {
    pub book_id: Uuid,
    pub bookmarked: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LibraryError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("You have already reviewed this book")]
    DuplicateReview,

    #[error("A book with this ISBN already exists")]
    DuplicateIsbn,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
