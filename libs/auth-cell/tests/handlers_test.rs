use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use headers::Authorization;
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_cell::handlers::*;
use auth_cell::models::{
    LoginRequest, RegisterRequest, UpdatePatientProfileRequest,
    UpdatePhysiotherapistProfileRequest,
};
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn profile_row(id: Uuid, email: &str, failed_attempts: i32, locked_until: Option<String>) -> Value {
    json!({
        "id": id,
        "email": email,
        "first_name": "Ada",
        "last_name": "Lovelace",
        "phone": null,
        "role": "patient",
        "failed_login_attempts": failed_attempts,
        "locked_until": locked_until,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z"
    })
}

fn session_body(user_id: Uuid, email: &str) -> Value {
    json!({
        "access_token": "test-access-token",
        "refresh_token": "test-refresh-token",
        "expires_in": 3600,
        "token_type": "bearer",
        "user": { "id": user_id, "email": email }
    })
}

fn patient_profile_row(user_id: Uuid) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "user_id": user_id,
        "medical_history": null,
        "emergency_contact_name": null,
        "emergency_contact_phone": null,
        "insurance_provider": null,
        "insurance_number": null
    })
}

async fn mock_profile_by_email(server: &MockServer, email: &str, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("email", format!("eq.{}", email)))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_succeeds_and_returns_session() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let user_id = Uuid::new_v4();
    let email = "ada@example.com";

    mock_profile_by_email(&mock_server, email, json!([profile_row(user_id, email, 0, None)]))
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(user_id, email)))
        .mount(&mock_server)
        .await;

    let result = login(
        State(config.to_arc()),
        Json(LoginRequest {
            email: email.to_string(),
            password: "correct-horse".to_string(),
        }),
    )
    .await;

    let body = result.expect("login should succeed").0;
    assert_eq!(body["success"], true);
    assert_eq!(body["session"]["access_token"], "test-access-token");
    assert_eq!(body["session"]["user"]["email"], email);
}

#[tokio::test]
async fn failed_login_returns_auth_error() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let user_id = Uuid::new_v4();
    let email = "ada@example.com";

    mock_profile_by_email(&mock_server, email, json!([profile_row(user_id, email, 0, None)]))
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&mock_server)
        .await;
    // Failure counter write.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([profile_row(user_id, email, 1, None)])),
        )
        .mount(&mock_server)
        .await;

    let result = login(
        State(config.to_arc()),
        Json(LoginRequest {
            email: email.to_string(),
            password: "wrong".to_string(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Auth(_))));
}

#[tokio::test]
async fn fifth_failure_locks_the_account() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let user_id = Uuid::new_v4();
    let email = "ada@example.com";

    // Four failures already on record.
    mock_profile_by_email(&mock_server, email, json!([profile_row(user_id, email, 4, None)]))
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([profile_row(
            user_id,
            email,
            5,
            Some((Utc::now() + Duration::minutes(30)).to_rfc3339())
        )])))
        .mount(&mock_server)
        .await;

    let result = login(
        State(config.to_arc()),
        Json(LoginRequest {
            email: email.to_string(),
            password: "wrong".to_string(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Locked(_))));
}

#[tokio::test]
async fn failures_after_an_expired_lock_count_up_again() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let user_id = Uuid::new_v4();
    let email = "ada@example.com";

    // One failure already in the window that started when the lock expired.
    let expired = (Utc::now() - Duration::hours(1)).to_rfc3339();
    mock_profile_by_email(
        &mock_server,
        email,
        json!([profile_row(user_id, email, 1, Some(expired))]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&mock_server)
        .await;
    // The counter must advance to 2 and the stale lock must be cleared.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .and(body_partial_json(json!({
            "failed_login_attempts": 2,
            "locked_until": null
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([profile_row(user_id, email, 2, None)])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = login(
        State(config.to_arc()),
        Json(LoginRequest {
            email: email.to_string(),
            password: "wrong".to_string(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Auth(_))));
}

#[tokio::test]
async fn expired_lock_restarts_the_counting_window() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let user_id = Uuid::new_v4();
    let email = "ada@example.com";

    // The counter still holds the 5 that triggered the now-expired lock.
    let expired = (Utc::now() - Duration::hours(1)).to_rfc3339();
    mock_profile_by_email(
        &mock_server,
        email,
        json!([profile_row(user_id, email, 5, Some(expired))]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .and(body_partial_json(json!({
            "failed_login_attempts": 1,
            "locked_until": null
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([profile_row(user_id, email, 1, None)])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = login(
        State(config.to_arc()),
        Json(LoginRequest {
            email: email.to_string(),
            password: "wrong".to_string(),
        }),
    )
    .await;

    // A single failure after expiry is invalid credentials, not a re-lock.
    assert!(matches!(result, Err(AppError::Auth(_))));
}

#[tokio::test]
async fn locked_account_rejects_login_without_touching_auth_provider() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let user_id = Uuid::new_v4();
    let email = "ada@example.com";

    let locked_until = (Utc::now() + Duration::minutes(10)).to_rfc3339();
    mock_profile_by_email(
        &mock_server,
        email,
        json!([profile_row(user_id, email, 5, Some(locked_until))]),
    )
    .await;
    // No GoTrue mock mounted: a call to it would fail the test via a 404
    // transport-level error rather than the expected lockout.

    let result = login(
        State(config.to_arc()),
        Json(LoginRequest {
            email: email.to_string(),
            password: "correct-horse".to_string(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Locked(_))));
}

#[tokio::test]
async fn register_creates_account_and_profile() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let user_id = Uuid::new_v4();
    let email = "new@example.com";

    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(user_id, email)))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/profiles"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([profile_row(user_id, email, 0, None)])),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/patient_profiles"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([patient_profile_row(user_id)])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = register(
        State(config.to_arc()),
        Json(RegisterRequest {
            email: email.to_string(),
            password: "long-enough-password".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: None,
        }),
    )
    .await;

    let body = result.expect("register should succeed").0;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["role"], "patient");
    // Lockout bookkeeping never leaves the service layer.
    assert!(body["user"].get("failed_login_attempts").is_none());
}

#[tokio::test]
async fn register_rejects_short_password() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());

    let result = register(
        State(config.to_arc()),
        Json(RegisterRequest {
            email: "new@example.com".to_string(),
            password: "short".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::ValidationError(_))));
}

#[tokio::test]
async fn patient_updates_their_medical_details() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let user_id = Uuid::parse_str(&patient.id).unwrap();

    let mut row = patient_profile_row(user_id);
    row["medical_history"] = json!("ACL reconstruction 2024");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patient_profiles"))
        .and(query_param("user_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let result = update_patient_profile(
        State(config.to_arc()),
        TypedHeader(Authorization::bearer(&token).unwrap()),
        Extension(patient.to_user()),
        Json(UpdatePatientProfileRequest {
            medical_history: Some("ACL reconstruction 2024".to_string()),
            emergency_contact_name: None,
            emergency_contact_phone: None,
            insurance_provider: None,
            insurance_number: None,
        }),
    )
    .await;

    let body = result.expect("update should succeed").0;
    assert_eq!(body["profile"]["medical_history"], "ACL reconstruction 2024");
}

#[tokio::test]
async fn patient_cannot_touch_clinician_profile() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let result = update_physiotherapist_profile(
        State(config.to_arc()),
        TypedHeader(Authorization::bearer(&token).unwrap()),
        Extension(patient.to_user()),
        Json(UpdatePhysiotherapistProfileRequest {
            license_number: Some("PT-0000".to_string()),
            specializations: None,
            years_of_experience: None,
            education: None,
            certifications: None,
            consultation_fee: None,
            is_available: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn non_admin_cannot_read_other_profiles() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let physio = TestUser::physiotherapist("physio@example.com");
    let token = JwtTestUtils::create_test_token(&physio, &config.jwt_secret, None);

    let result = get_profile_by_id(
        State(config.to_arc()),
        axum::extract::Path(Uuid::new_v4()),
        TypedHeader(Authorization::bearer(&token).unwrap()),
        Extension(physio.to_user()),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn validate_endpoint_accepts_valid_token() {
    let config = TestConfig::default();
    let test_user = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&test_user, &config.jwt_secret, None);

    let mut headers = HeaderMap::new();
    headers.insert("Authorization", format!("Bearer {}", token).parse().unwrap());

    let result = validate_token(State(config.to_arc()), headers).await;
    let body = result.expect("token should validate").0;
    assert!(body.valid);
    assert_eq!(body.user_id, test_user.id);
}

#[tokio::test]
async fn validate_endpoint_rejects_bad_signature() {
    let config = TestConfig::default();
    let test_user = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_invalid_signature_token(&test_user);

    let mut headers = HeaderMap::new();
    headers.insert("Authorization", format!("Bearer {}", token).parse().unwrap());

    let result = validate_token(State(config.to_arc()), headers).await;
    assert!(matches!(result, Err(AppError::Auth(_))));
}
