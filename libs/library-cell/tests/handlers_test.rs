use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use library_cell::handlers::*;
use library_cell::models::{CreateBookRequest, CreateReviewRequest};
use shared_models::{auth::User, error::AppError};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer(token).unwrap())
}

fn user_extension(test_user: &TestUser) -> Extension<User> {
    Extension(test_user.to_user())
}

fn book_row(id: Uuid, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "author": "J. Kisner",
        "isbn": "978-0803658509",
        "description": null,
        "category_id": Uuid::new_v4(),
        "book_type": "educational",
        "publication_date": null,
        "publisher": null,
        "pages": 1056,
        "language": "en",
        "cover_image_url": null,
        "pdf_url": "https://storage.example.com/books/kisner.pdf",
        "is_available": true,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

fn create_book_request(title: &str) -> CreateBookRequest {
    serde_json::from_value(json!({
        "title": title,
        "author": "J. Kisner",
        "isbn": "978-0803658509",
        "category_id": Uuid::new_v4(),
        "book_type": "educational",
        "pages": 1056,
        "language": "en",
        "pdf_url": "https://storage.example.com/books/kisner.pdf"
    }))
    .unwrap()
}

fn mock_book_by_id(book_id: Uuid) -> Mock {
    Mock::given(method("GET"))
        .and(path("/rest/v1/books"))
        .and(query_param("id", format!("eq.{}", book_id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([book_row(book_id, "Therapeutic Exercise")])),
        )
}

#[tokio::test]
async fn patient_cannot_add_books() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let result = create_book(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&patient),
        Json(create_book_request("Therapeutic Exercise")),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn physio_adds_a_book() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let physio = TestUser::physiotherapist("physio@example.com");
    let token = JwtTestUtils::create_test_token(&physio, &config.jwt_secret, None);

    Mock::given(method("POST"))
        .and(path("/rest/v1/books"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([book_row(Uuid::new_v4(), "Therapeutic Exercise")])),
        )
        .mount(&mock_server)
        .await;

    let result = create_book(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&physio),
        Json(create_book_request("Therapeutic Exercise")),
    )
    .await;

    let body = result.expect("create should succeed").0;
    assert_eq!(body["book"]["title"], "Therapeutic Exercise");
}

#[tokio::test]
async fn duplicate_isbn_is_a_bad_request() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let physio = TestUser::physiotherapist("physio@example.com");
    let token = JwtTestUtils::create_test_token(&physio, &config.jwt_secret, None);

    Mock::given(method("POST"))
        .and(path("/rest/v1/books"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"books_isbn_key\""
        })))
        .mount(&mock_server)
        .await;

    let result = create_book(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&physio),
        Json(create_book_request("Therapeutic Exercise")),
    )
    .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn review_rejects_out_of_range_rating() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let result = create_review(
        State(config.to_arc()),
        Path(Uuid::new_v4()),
        auth_header(&token),
        user_extension(&patient),
        Json(CreateReviewRequest {
            rating: 6,
            review_text: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::ValidationError(_))));
}

#[tokio::test]
async fn second_review_of_same_book_is_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let book_id = Uuid::new_v4();

    mock_book_by_id(book_id).mount(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/book_reviews"))
        .and(query_param("book_id", format!("eq.{}", book_id)))
        .and(query_param("user_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "book_id": book_id,
            "user_id": patient.id,
            "rating": 4,
            "review_text": "Helpful",
            "created_at": Utc::now().to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;

    let result = create_review(
        State(config.to_arc()),
        Path(book_id),
        auth_header(&token),
        user_extension(&patient),
        Json(CreateReviewRequest {
            rating: 5,
            review_text: Some("Still helpful".to_string()),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn patient_reviews_a_book() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let book_id = Uuid::new_v4();

    mock_book_by_id(book_id).mount(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/book_reviews"))
        .and(query_param("book_id", format!("eq.{}", book_id)))
        .and(query_param("user_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/book_reviews"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "book_id": book_id,
            "user_id": patient.id,
            "rating": 5,
            "review_text": "Clear progressions",
            "created_at": Utc::now().to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;

    let result = create_review(
        State(config.to_arc()),
        Path(book_id),
        auth_header(&token),
        user_extension(&patient),
        Json(CreateReviewRequest {
            rating: 5,
            review_text: Some("Clear progressions".to_string()),
        }),
    )
    .await;

    let body = result.expect("review should succeed").0;
    assert_eq!(body["review"]["rating"], 5);
}

#[tokio::test]
async fn bookmark_toggles_on_when_absent() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let book_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/book_bookmarks"))
        .and(query_param("book_id", format!("eq.{}", book_id)))
        .and(query_param("user_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    mock_book_by_id(book_id).mount(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/book_bookmarks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "book_id": book_id,
            "user_id": patient.id,
            "created_at": Utc::now().to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;

    let result = toggle_bookmark(
        State(config.to_arc()),
        Path(book_id),
        auth_header(&token),
        user_extension(&patient),
    )
    .await;

    let body = result.expect("toggle should succeed").0;
    assert_eq!(body["bookmarked"], true);
}

#[tokio::test]
async fn bookmark_toggles_off_when_present() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let book_id = Uuid::new_v4();
    let bookmark = json!({
        "id": Uuid::new_v4(),
        "book_id": book_id,
        "user_id": patient.id,
        "created_at": Utc::now().to_rfc3339()
    });

    Mock::given(method("GET"))
        .and(path("/rest/v1/book_bookmarks"))
        .and(query_param("book_id", format!("eq.{}", book_id)))
        .and(query_param("user_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([bookmark.clone()])))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/book_bookmarks"))
        .and(query_param("book_id", format!("eq.{}", book_id)))
        .and(query_param("user_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([bookmark])))
        .mount(&mock_server)
        .await;

    let result = toggle_bookmark(
        State(config.to_arc()),
        Path(book_id),
        auth_header(&token),
        user_extension(&patient),
    )
    .await;

    let body = result.expect("toggle should succeed").0;
    assert_eq!(body["bookmarked"], false);
}

#[tokio::test]
async fn bookmarked_list_resolves_books() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let book_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/book_bookmarks"))
        .and(query_param("user_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "book_id": book_id,
            "user_id": patient.id,
            "created_at": Utc::now().to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/books"))
        .and(query_param("id", format!("in.({})", book_id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([book_row(book_id, "Therapeutic Exercise")])),
        )
        .mount(&mock_server)
        .await;

    let result = list_bookmarked(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&patient),
    )
    .await;

    let body = result.expect("bookmarked list should succeed").0;
    assert_eq!(body["count"], 1);
    assert_eq!(body["books"][0]["id"], book_id.to_string());
}

#[tokio::test]
async fn listing_filters_by_book_type() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    Mock::given(method("GET"))
        .and(path("/rest/v1/books"))
        .and(query_param("book_type", "eq.guide"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([book_row(Uuid::new_v4(), "Home Exercise Guide")])),
        )
        .mount(&mock_server)
        .await;

    let query = serde_json::from_value(json!({ "book_type": "guide" })).unwrap();
    let result = list_books(
        State(config.to_arc()),
        axum::extract::Query(query),
        auth_header(&token),
        user_extension(&patient),
    )
    .await;

    let body = result.expect("list should succeed").0;
    assert_eq!(body["count"], 1);
}
