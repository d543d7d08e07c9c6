// libs/appointment-cell/tests/handlers_test.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use assert_matches::assert_matches;
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::*;
use appointment_cell::models::{ReorderQueueRequest, UpdateAppointmentRequest};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};
use shared_utils::time::regional_now;

fn mock_config(mock_server: &MockServer) -> Arc<AppConfig> {
    TestConfig::with_supabase_url(&mock_server.uri()).to_arc()
}

fn user_extension(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

fn auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer(token).unwrap())
}

fn token_for(user: &TestUser) -> String {
    let secret = TestConfig::default().jwt_secret;
    JwtTestUtils::create_test_token(user, &secret, Some(24))
}

async fn mount_notification_sink(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": Uuid::new_v4()}])))
        .mount(mock_server)
        .await;
}

async fn mount_confirmation_sink(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/completion_confirmations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": Uuid::new_v4()}])))
        .mount(mock_server)
        .await;
}

// ==============================================================================
// TWO-KEY COMPLETION TESTS
// ==============================================================================

#[tokio::test]
async fn first_confirmation_waits_for_the_other_party() {
    let mock_server = MockServer::start().await;
    let practitioner = TestUser::practitioner("nurse@example.com");
    let token = token_for(&practitioner);
    let patient_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();

    let stored = MockSupabaseResponses::appointment_response(
        &appointment_id.to_string(),
        &patient_id,
        &practitioner.id,
        "in-progress",
    );

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    let mut confirmed = stored.clone();
    confirmed["practitioner_confirmed"] = json!(true);
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("practitioner_confirmed", "is.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([confirmed])))
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_confirmation_sink(&mock_server).await;
    mount_notification_sink(&mock_server).await;

    let result = practitioner_confirm_completion(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&practitioner),
        Path(appointment_id),
    )
    .await;

    let response = result.expect("first confirmation should succeed").0;
    assert_eq!(response["success"], true);
    assert_eq!(response["completed"], false);
    assert_eq!(response["appointment"]["practitioner_confirmed"], true);
    assert_eq!(response["appointment"]["patient_confirmed"], false);
}

#[tokio::test]
async fn second_confirmation_completes_and_settles_once() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient);
    let practitioner_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();

    let mut stored = MockSupabaseResponses::appointment_response(
        &appointment_id.to_string(),
        &patient.id,
        &practitioner_id,
        "in-progress",
    );
    stored["practitioner_confirmed"] = json!(true);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    // The conditional update returns the row with the other key already set.
    let mut both = stored.clone();
    both["patient_confirmed"] = json!(true);
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_confirmed", "is.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([both])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut completed = both.clone();
    completed["status"] = json!("completed");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param_is_missing("patient_confirmed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([completed])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/settle_appointment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transaction": MockSupabaseResponses::transaction_response(
                &Uuid::new_v4().to_string(),
                &practitioner_id,
                "home-care",
                "completed",
                1000.0,
                100.0,
            ),
            "already_settled": false,
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_confirmation_sink(&mock_server).await;
    mount_notification_sink(&mock_server).await;

    let result = patient_confirm_completion(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&patient),
        Path(appointment_id),
    )
    .await;

    let response = result.expect("second confirmation should complete").0;
    assert_eq!(response["success"], true);
    assert_eq!(response["completed"], true);
    assert_eq!(response["appointment"]["status"], "completed");
}

#[tokio::test]
async fn confirming_a_cancelled_appointment_is_rejected_without_settlement() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient);
    let appointment_id = Uuid::new_v4();

    let mut stored = MockSupabaseResponses::appointment_response(
        &appointment_id.to_string(),
        &patient.id,
        &Uuid::new_v4().to_string(),
        "cancelled",
    );
    stored["practitioner_confirmed"] = json!(true);

    // Only the lookup is mocked. No PATCH and no settle_appointment mock
    // exists, so any write attempt fails the test.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    let result = patient_confirm_completion(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&patient),
        Path(appointment_id),
    )
    .await;

    assert_matches!(
        result.unwrap_err(),
        AppError::BadRequest(msg) if msg.contains("cancelled")
    );
}

#[tokio::test]
async fn repeated_confirmation_is_a_structured_non_success() {
    let mock_server = MockServer::start().await;
    let practitioner = TestUser::practitioner("nurse@example.com");
    let token = token_for(&practitioner);
    let appointment_id = Uuid::new_v4();

    let mut stored = MockSupabaseResponses::appointment_response(
        &appointment_id.to_string(),
        &Uuid::new_v4().to_string(),
        &practitioner.id,
        "in-progress",
    );
    stored["practitioner_confirmed"] = json!(true);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    // The flag is already set, so the conditional update matches nothing.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("practitioner_confirmed", "is.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = practitioner_confirm_completion(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&practitioner),
        Path(appointment_id),
    )
    .await;

    let response = result.expect("repeat confirmation is not an error").0;
    assert_eq!(response["success"], false);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .contains("already confirmed"));
}

#[tokio::test]
async fn unassigned_practitioner_cannot_confirm() {
    let mock_server = MockServer::start().await;
    let practitioner = TestUser::practitioner("other@example.com");
    let token = token_for(&practitioner);
    let appointment_id = Uuid::new_v4();

    let stored = MockSupabaseResponses::appointment_response(
        &appointment_id.to_string(),
        &Uuid::new_v4().to_string(),
        &Uuid::new_v4().to_string(),
        "in-progress",
    );
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    let result = practitioner_confirm_completion(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&practitioner),
        Path(appointment_id),
    )
    .await;

    assert_matches!(result.unwrap_err(), AppError::Auth(_));
}

// ==============================================================================
// LIFECYCLE HANDLER TESTS
// ==============================================================================

#[tokio::test]
async fn accepting_an_unassigned_home_care_request_claims_it() {
    let mock_server = MockServer::start().await;
    let practitioner = TestUser::practitioner("nurse@example.com");
    let token = token_for(&practitioner);
    let appointment_id = Uuid::new_v4();

    let mut stored = MockSupabaseResponses::appointment_response(
        &appointment_id.to_string(),
        &Uuid::new_v4().to_string(),
        &practitioner.id,
        "requested",
    );
    stored["practitioner_id"] = json!(null);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    let mut accepted = stored.clone();
    accepted["status"] = json!("confirmed");
    accepted["practitioner_id"] = json!(practitioner.id);
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.requested"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([accepted])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = accept_appointment(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&practitioner),
        Path(appointment_id),
    )
    .await;

    let response = result.expect("accept should succeed").0;
    assert_eq!(response["success"], true);
    assert_eq!(response["appointment"]["status"], "confirmed");
    assert_eq!(response["appointment"]["practitioner_id"], practitioner.id);
}

#[tokio::test]
async fn cancelling_a_completed_appointment_is_rejected() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient);
    let appointment_id = Uuid::new_v4();

    let stored = MockSupabaseResponses::appointment_response(
        &appointment_id.to_string(),
        &patient.id,
        &Uuid::new_v4().to_string(),
        "completed",
    );
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    let result = cancel_appointment(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&patient),
        Path(appointment_id),
        None,
    )
    .await;

    assert_matches!(result.unwrap_err(), AppError::BadRequest(msg) if msg.contains("completed"));
}

#[tokio::test]
async fn patient_patch_cannot_set_status() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient);
    let appointment_id = Uuid::new_v4();

    let stored = MockSupabaseResponses::appointment_response(
        &appointment_id.to_string(),
        &patient.id,
        &Uuid::new_v4().to_string(),
        "confirmed",
    );
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    // No PATCH mock mounted: a stripped-to-empty patch must not write.
    let result = update_appointment(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&patient),
        Path(appointment_id),
        Json(UpdateAppointmentRequest {
            status: Some(appointment_cell::models::AppointmentStatus::Completed),
            ..Default::default()
        }),
    )
    .await;

    let response = result.expect("stripped patch should be a no-op").0;
    assert_eq!(response["appointment"]["status"], "confirmed");
}

#[tokio::test]
async fn soft_delete_is_admin_only() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient);

    let result = delete_appointment(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&patient),
        Path(Uuid::new_v4()),
    )
    .await;

    assert_matches!(result.unwrap_err(), AppError::Auth(_));
}

// ==============================================================================
// QUEUE TESTS
// ==============================================================================

#[tokio::test]
async fn queue_reports_position_and_wait() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient);
    let practitioner_id = Uuid::new_v4();
    let first_patient = Uuid::new_v4();
    let today = regional_now().date_naive();

    let mut first = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(),
        &first_patient.to_string(),
        &practitioner_id.to_string(),
        "confirmed",
    );
    first["date"] = json!(today);
    first["time"] = json!("23:58:00");
    first["queue_order"] = json!(1);

    let mut mine = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(),
        &patient.id,
        &practitioner_id.to_string(),
        "confirmed",
    );
    mine["date"] = json!(today);
    mine["time"] = json!("23:59:00");
    mine["queue_order"] = json!(2);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("date", format!("eq.{}", today)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([first, mine])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"full_name": "Ama Mensah"}
        ])))
        .mount(&mock_server)
        .await;

    let result = get_practitioner_queue(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&patient),
        Path(practitioner_id),
    )
    .await;

    let response = result.expect("queue lookup should succeed").0;
    assert_eq!(response["in_queue"], true);
    assert_eq!(response["position"], 2);
    assert_eq!(response["estimated_wait_minutes"], 15);
    assert_eq!(response["queue_length"], 2);
    assert_eq!(response["next_patient_name"], "Ama Mensah");
}

#[tokio::test]
async fn queue_without_own_appointment_is_structured() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient);
    let today = regional_now().date_naive();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("date", format!("eq.{}", today)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = get_practitioner_queue(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&patient),
        Path(Uuid::new_v4()),
    )
    .await;

    let response = result.expect("empty queue is not an error").0;
    assert_eq!(response["success"], true);
    assert_eq!(response["in_queue"], false);
    assert_eq!(response["queue_length"], 0);
}

#[tokio::test]
async fn reorder_requires_owning_every_appointment() {
    let mock_server = MockServer::start().await;
    let practitioner = TestUser::practitioner("nurse@example.com");
    let token = token_for(&practitioner);
    let ids = vec![Uuid::new_v4(), Uuid::new_v4()];

    // Only one of the two listed appointments belongs to the caller.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": ids[0]}])))
        .mount(&mock_server)
        .await;

    let result = reorder_queue(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&practitioner),
        Json(ReorderQueueRequest {
            appointment_ids: ids,
        }),
    )
    .await;

    assert_matches!(result.unwrap_err(), AppError::Auth(_));
}

#[tokio::test]
async fn reorder_runs_through_a_single_rpc() {
    let mock_server = MockServer::start().await;
    let practitioner = TestUser::practitioner("nurse@example.com");
    let token = token_for(&practitioner);
    let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": ids[0]}, {"id": ids[1]}, {"id": ids[2]}
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reorder_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(3)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = reorder_queue(
        State(mock_config(&mock_server)),
        auth_header(&token),
        user_extension(&practitioner),
        Json(ReorderQueueRequest {
            appointment_ids: ids,
        }),
    )
    .await;

    let response = result.expect("reorder should succeed").0;
    assert_eq!(response["success"], true);
    assert_eq!(response["reordered"], 3);
}
