// libs/appointment-cell/tests/integration_test.rs
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn test_app(config: &AppConfig) -> Router {
    appointment_routes(Arc::new(config.clone()))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn appointment_routes_require_authentication() {
    let config = TestConfig::default().to_app_config();
    let app = test_app(&config);

    let request = Request::builder()
        .method("GET")
        .uri("/my")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let config = TestConfig::default().to_app_config();
    let app = test_app(&config);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_expired_token(&user, &config.supabase_jwt_secret);

    let request = Request::builder()
        .method("GET")
        .uri("/my")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn my_appointments_round_trip() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let app = test_app(&config);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let mut past = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(),
        &user.id,
        &Uuid::new_v4().to_string(),
        "completed",
    );
    past["date"] = json!("2026-01-05");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([past])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/my")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["next"].as_array().unwrap().len(), 0);
    assert_eq!(body["archive"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn patient_confirm_round_trip() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let app = test_app(&config);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let appointment_id = Uuid::new_v4();

    let stored = MockSupabaseResponses::appointment_response(
        &appointment_id.to_string(),
        &user.id,
        &Uuid::new_v4().to_string(),
        "in-progress",
    );
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    let mut confirmed = stored.clone();
    confirmed["patient_confirmed"] = json!(true);
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_confirmed", "is.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([confirmed])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/completion_confirmations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": Uuid::new_v4()}])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": Uuid::new_v4()}])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("PUT")
        .uri(&format!("/{}/patient-confirm", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["completed"], false);
}

#[tokio::test]
async fn delete_appointment_blocked_for_patients() {
    let config = TestConfig::default().to_app_config();
    let app = test_app(&config);

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let request = Request::builder()
        .method("DELETE")
        .uri(&format!("/{}", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
