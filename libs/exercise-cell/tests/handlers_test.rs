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

use exercise_cell::handlers::*;
use exercise_cell::models::*;
use shared_models::{auth::User, error::AppError};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer(token).unwrap())
}

fn user_extension(test_user: &TestUser) -> Extension<User> {
    Extension(test_user.to_user())
}

fn plan_row(id: Uuid, patient_id: &str, physio_id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "name": "Knee recovery",
        "description": null,
        "patient_id": patient_id,
        "physiotherapist_id": physio_id,
        "start_date": "2026-09-01",
        "end_date": null,
        "status": status,
        "created_at": "2026-08-01T00:00:00Z",
        "updated_at": "2026-08-01T00:00:00Z"
    })
}

fn plan_item_row(id: Uuid, plan_id: Uuid, exercise_id: Uuid) -> Value {
    json!({
        "id": id,
        "plan_id": plan_id,
        "exercise_id": exercise_id,
        "day_of_week": 1,
        "week_number": 1,
        "custom_repetitions": null,
        "custom_sets": null,
        "notes": null
    })
}

// ==============================================================================
// CATALOG
// ==============================================================================

#[tokio::test]
async fn patient_cannot_create_exercise() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let result = create_exercise(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&patient),
        Json(CreateExerciseRequest {
            name: "Wall slides".to_string(),
            description: "Slide against a wall".to_string(),
            category_id: Uuid::new_v4(),
            difficulty: Difficulty::Beginner,
            duration_minutes: Some(5),
            repetitions: Some(10),
            sets: Some(3),
            video_url: None,
            image_url: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn physio_creates_exercise() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let physio = TestUser::physiotherapist("physio@example.com");
    let token = JwtTestUtils::create_test_token(&physio, &config.jwt_secret, None);
    let category_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/exercises"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "name": "Wall slides",
            "description": "Slide against a wall",
            "category_id": category_id,
            "difficulty": "beginner",
            "duration_minutes": 5,
            "repetitions": 10,
            "sets": 3,
            "video_url": null,
            "image_url": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;

    let result = create_exercise(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&physio),
        Json(CreateExerciseRequest {
            name: "Wall slides".to_string(),
            description: "Slide against a wall".to_string(),
            category_id,
            difficulty: Difficulty::Beginner,
            duration_minutes: Some(5),
            repetitions: Some(10),
            sets: Some(3),
            video_url: None,
            image_url: None,
        }),
    )
    .await;

    let body = result.expect("create should succeed").0;
    assert_eq!(body["exercise"]["name"], "Wall slides");
    assert_eq!(body["exercise"]["difficulty"], "beginner");
}

// ==============================================================================
// PLANS
// ==============================================================================

#[tokio::test]
async fn patient_cannot_create_plan() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let result = create_plan(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&patient),
        Json(CreatePlanRequest {
            name: "My own plan".to_string(),
            description: None,
            patient_id: Uuid::parse_str(&patient.id).unwrap(),
            start_date: "2026-09-01".parse().unwrap(),
            end_date: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn owner_activates_draft_plan() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let physio = TestUser::physiotherapist("physio@example.com");
    let token = JwtTestUtils::create_test_token(&physio, &config.jwt_secret, None);

    let plan_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4().to_string();
    Mock::given(method("GET"))
        .and(path("/rest/v1/exercise_plans"))
        .and(query_param("id", format!("eq.{}", plan_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            &patient_id,
            &physio.id,
            "draft"
        )])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/exercise_plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            &patient_id,
            &physio.id,
            "active"
        )])))
        .mount(&mock_server)
        .await;

    let result = activate_plan(
        State(config.to_arc()),
        Path(plan_id),
        auth_header(&token),
        user_extension(&physio),
    )
    .await;

    let body = result.expect("activation should succeed").0;
    assert_eq!(body["plan"]["status"], "active");
}

#[tokio::test]
async fn non_owner_cannot_activate_plan() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let other = TestUser::physiotherapist("other@example.com");
    let token = JwtTestUtils::create_test_token(&other, &config.jwt_secret, None);

    let plan_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/exercise_plans"))
        .and(query_param("id", format!("eq.{}", plan_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            "draft"
        )])))
        .mount(&mock_server)
        .await;

    let result = activate_plan(
        State(config.to_arc()),
        Path(plan_id),
        auth_header(&token),
        user_extension(&other),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn completed_plan_cannot_be_activated() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let physio = TestUser::physiotherapist("physio@example.com");
    let token = JwtTestUtils::create_test_token(&physio, &config.jwt_secret, None);

    let plan_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/exercise_plans"))
        .and(query_param("id", format!("eq.{}", plan_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            &Uuid::new_v4().to_string(),
            &physio.id,
            "completed"
        )])))
        .mount(&mock_server)
        .await;

    let result = activate_plan(
        State(config.to_arc()),
        Path(plan_id),
        auth_header(&token),
        user_extension(&physio),
    )
    .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

// ==============================================================================
// PROGRESS
// ==============================================================================

async fn mock_item_and_plan(
    server: &MockServer,
    item_id: Uuid,
    plan_id: Uuid,
    patient_id: &str,
    physio_id: &str,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/exercise_plan_items"))
        .and(query_param("id", format!("eq.{}", item_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_item_row(
            item_id,
            plan_id,
            Uuid::new_v4()
        )])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/exercise_plans"))
        .and(query_param("id", format!("eq.{}", plan_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id, patient_id, physio_id, "active"
        )])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn patient_logs_progress() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let item_id = Uuid::new_v4();
    let plan_id = Uuid::new_v4();
    let physio_id = Uuid::new_v4().to_string();
    mock_item_and_plan(&mock_server, item_id, plan_id, &patient.id, &physio_id).await;

    // No duplicate on record.
    Mock::given(method("GET"))
        .and(path("/rest/v1/exercise_progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/exercise_progress"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "patient_id": patient.id,
            "physiotherapist_id": physio_id,
            "plan_item_id": item_id,
            "date_completed": Utc::now().date_naive().to_string(),
            "completed_repetitions": 10,
            "completed_sets": 3,
            "difficulty_rating": 3,
            "pain_level": 1,
            "notes": null,
            "created_at": Utc::now().to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;

    let result = log_progress(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&patient),
        Json(LogProgressRequest {
            plan_item_id: item_id,
            date_completed: Utc::now().date_naive(),
            completed_repetitions: Some(10),
            completed_sets: Some(3),
            difficulty_rating: 3,
            pain_level: 1,
            notes: None,
        }),
    )
    .await;

    let body = result.expect("progress log should succeed").0;
    assert_eq!(body["progress"]["difficulty_rating"], 3);
}

#[tokio::test]
async fn duplicate_progress_for_same_day_is_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let item_id = Uuid::new_v4();
    let plan_id = Uuid::new_v4();
    let physio_id = Uuid::new_v4().to_string();
    mock_item_and_plan(&mock_server, item_id, plan_id, &patient.id, &physio_id).await;

    let today = Utc::now().date_naive();
    Mock::given(method("GET"))
        .and(path("/rest/v1/exercise_progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "patient_id": patient.id,
            "physiotherapist_id": physio_id,
            "plan_item_id": item_id,
            "date_completed": today.to_string(),
            "completed_repetitions": 10,
            "completed_sets": 3,
            "difficulty_rating": 3,
            "pain_level": 1,
            "notes": null,
            "created_at": Utc::now().to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;

    let result = log_progress(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&patient),
        Json(LogProgressRequest {
            plan_item_id: item_id,
            date_completed: today,
            completed_repetitions: Some(10),
            completed_sets: Some(3),
            difficulty_rating: 3,
            pain_level: 1,
            notes: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn progress_rejects_out_of_range_pain_level() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let result = log_progress(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&patient),
        Json(LogProgressRequest {
            plan_item_id: Uuid::new_v4(),
            date_completed: Utc::now().date_naive(),
            completed_repetitions: None,
            completed_sets: None,
            difficulty_rating: 3,
            pain_level: 9,
            notes: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::ValidationError(_))));
}

#[tokio::test]
async fn physio_cannot_log_progress() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let physio = TestUser::physiotherapist("physio@example.com");
    let token = JwtTestUtils::create_test_token(&physio, &config.jwt_secret, None);

    let result = log_progress(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&physio),
        Json(LogProgressRequest {
            plan_item_id: Uuid::new_v4(),
            date_completed: Utc::now().date_naive(),
            completed_repetitions: None,
            completed_sets: None,
            difficulty_rating: 3,
            pain_level: 1,
            notes: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn stats_aggregate_visible_rows() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_base_url(&mock_server.uri());
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let today = Utc::now().date_naive();
    let physio_id = Uuid::new_v4().to_string();
    let row = |date: String, difficulty: i16, pain: i16| {
        json!({
            "id": Uuid::new_v4(),
            "patient_id": patient.id,
            "physiotherapist_id": physio_id,
            "plan_item_id": Uuid::new_v4(),
            "date_completed": date,
            "completed_repetitions": 10,
            "completed_sets": 3,
            "difficulty_rating": difficulty,
            "pain_level": pain,
            "notes": null,
            "created_at": Utc::now().to_rfc3339()
        })
    };
    Mock::given(method("GET"))
        .and(path("/rest/v1/exercise_progress"))
        .and(query_param("patient_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row(today.to_string(), 2, 0),
            row(today.to_string(), 4, 2),
        ])))
        .mount(&mock_server)
        .await;

    let result = get_progress_stats(
        State(config.to_arc()),
        auth_header(&token),
        user_extension(&patient),
    )
    .await;

    let body = result.expect("stats should succeed").0;
    assert_eq!(body["stats"]["total_sessions"], 2);
    assert_eq!(body["stats"]["sessions_this_week"], 2);
    assert_eq!(body["stats"]["average_difficulty"], 3.0);
    assert_eq!(body["stats"]["average_pain_level"], 1.0);
}
