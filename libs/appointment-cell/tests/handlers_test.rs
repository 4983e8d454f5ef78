use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use appointment_cell::services::watch::AppointmentWatchService;
use shared_utils::test_utils::{JwtTestUtils, MockDatastoreResponses, TestConfig, TestUser};

fn create_test_app(config: &TestConfig) -> Router {
    appointment_routes(config.to_arc(), AppointmentWatchService::new())
}

fn bearer(user: &TestUser, config: &TestConfig) -> String {
    format!("Bearer {}", JwtTestUtils::create_test_token(user, &config.jwt_secret, Some(1)))
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn mount_booked(mock_server: &MockServer, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id,time,status,date"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let config = TestConfig::default();
    let app = create_test_app(&config);

    let request = Request::builder()
        .uri("/slots")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_unauthorized() {
    let config = TestConfig::default();
    let app = create_test_app(&config);
    let user = TestUser::reception("desk@example.com");
    let token = JwtTestUtils::create_expired_token(&user, &config.jwt_secret);

    let request = Request::builder()
        .uri("/slots")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_slot_grid_endpoint() {
    let config = TestConfig::default();
    let app = create_test_app(&config);
    let user = TestUser::doctor("doc@example.com");

    let request = Request::builder()
        .uri("/slots")
        .header("authorization", bearer(&user, &config))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["total"], 19);
    assert_eq!(body["slots"][0], "08:00 AM");
    assert_eq!(body["slots"][18], "05:00 PM");
}

#[tokio::test]
async fn test_availability_endpoint_lists_open_slots() {
    let mock_server = MockServer::start().await;
    mount_booked(&mock_server, json!([
        MockDatastoreResponses::appointment_record("a", "2024-05-01", "09:00 AM", "scheduled"),
        MockDatastoreResponses::appointment_record("b", "2024-05-01", "02:00 PM", "completed"),
    ])).await;

    let config = TestConfig::with_mock_server(&mock_server.uri());
    let app = create_test_app(&config);
    let user = TestUser::reception("desk@example.com");

    let request = Request::builder()
        .uri("/availability?date=2024-05-01")
        .header("authorization", bearer(&user, &config))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["total_slots"], 19);
    let slots = body["available_slots"].as_array().unwrap();
    assert_eq!(slots.len(), 17);
    assert!(!slots.contains(&json!("09:00 AM")));
}

#[tokio::test]
async fn test_doctor_cannot_book() {
    let config = TestConfig::default();
    let app = create_test_app(&config);
    let user = TestUser::doctor("doc@example.com");

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", bearer(&user, &config))
        .header("content-type", "application/json")
        .body(Body::from(json!({
            "patient_id": "patient-1",
            "date": "2024-05-01",
            "time": "09:00 AM",
            "reason": "Fever"
        }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_booking_taken_slot_returns_conflict_with_options() {
    let mock_server = MockServer::start().await;
    mount_booked(&mock_server, json!([
        MockDatastoreResponses::appointment_record("a", "2024-05-01", "09:00 AM", "scheduled"),
    ])).await;

    let config = TestConfig::with_mock_server(&mock_server.uri());
    let app = create_test_app(&config);
    let user = TestUser::reception("desk@example.com");

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", bearer(&user, &config))
        .header("content-type", "application/json")
        .body(Body::from(json!({
            "patient_id": "patient-1",
            "date": "2024-05-01",
            "time": "9:00 AM",
            "reason": "Fever"
        }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = read_json(response).await;
    let options = body["details"]["available_slots"].as_array().unwrap();
    assert_eq!(options.len(), 18);
    assert_eq!(body["details"]["time"], "09:00 AM");
}

#[tokio::test]
async fn test_doctor_limited_to_clinical_fields() {
    let config = TestConfig::default();
    let app = create_test_app(&config);
    let user = TestUser::doctor("doc@example.com");

    let request = Request::builder()
        .method("PUT")
        .uri("/apt-1")
        .header("authorization", bearer(&user, &config))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "date": "2024-05-02" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_role_read_from_storage_when_not_claimed() {
    let mock_server = MockServer::start().await;
    let user = TestUser::unassigned("desk@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockDatastoreResponses::user_role_record(Some("reception"))
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", "eq.apt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_mock_server(&mock_server.uri());
    let app = create_test_app(&config);

    let request = Request::builder()
        .method("DELETE")
        .uri("/apt-1")
        .header("authorization", bearer(&user, &config))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_transition_is_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", "eq.apt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockDatastoreResponses::appointment_record("apt-1", "2024-05-01", "09:00 AM", "completed")
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_mock_server(&mock_server.uri());
    let app = create_test_app(&config);
    let user = TestUser::doctor("doc@example.com");

    let request = Request::builder()
        .method("PATCH")
        .uri("/apt-1/status")
        .header("authorization", bearer(&user, &config))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": "cancelled" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
