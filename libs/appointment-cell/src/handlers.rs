// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, CancelAppointmentRequest, CompletionOutcome, ConfirmerRole,
    CreateAppointmentRequest, ReorderQueueRequest, UpdateAppointmentRequest,
};
use crate::services::appointments::AppointmentService;
use crate::services::completion::CompletionService;
use crate::services::queue::QueueService;

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => {
                AppError::NotFound("Appointment not found".to_string())
            }
            AppointmentError::Unauthorized => {
                AppError::Auth("Not authorized for this appointment".to_string())
            }
            AppointmentError::InvalidTransition { from, to } => {
                AppError::BadRequest(format!("Cannot move appointment from {} to {}", from, to))
            }
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Conflict(msg) => AppError::Conflict(msg),
            AppointmentError::Settlement(inner) => AppError::from(inner),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

fn completion_response(outcome: CompletionOutcome) -> Value {
    match outcome {
        CompletionOutcome::AlreadyConfirmed => json!({
            "success": false,
            "message": "You have already confirmed this appointment",
        }),
        CompletionOutcome::AwaitingOtherParty(appointment) => json!({
            "success": true,
            "completed": false,
            "message": "Confirmation recorded, waiting for the other party",
            "appointment": appointment,
        }),
        CompletionOutcome::Completed(appointment) => json!({
            "success": true,
            "completed": true,
            "appointment": appointment,
        }),
    }
}

// ==============================================================================
// APPOINTMENT CRUD HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);
    let appointment = service
        .create_appointment(request, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn get_my_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);
    let listing = service.list_my(&user, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "next": listing.next,
        "archive": listing.archive,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);
    let appointment = service
        .get_appointment(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(patch): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);
    let appointment = service
        .update_appointment(appointment_id, patch, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn accept_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);
    let appointment = service
        .accept_appointment(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    body: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let reason = body.and_then(|Json(b)| b.reason);
    let service = AppointmentService::new(&state);
    let appointment = service
        .cancel_appointment(appointment_id, reason, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(&state);
    service
        .delete_appointment(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted",
    })))
}

// ==============================================================================
// COMPLETION HANDLERS
// ==============================================================================

/// Single-key practitioner completion kept for older clients.
#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = CompletionService::new(&state);
    let outcome = service
        .complete_legacy(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(completion_response(outcome)))
}

#[axum::debug_handler]
pub async fn practitioner_confirm_completion(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = CompletionService::new(&state);
    let outcome = service
        .confirm_completion(
            appointment_id,
            &user,
            ConfirmerRole::Practitioner,
            auth.token(),
        )
        .await?;

    Ok(Json(completion_response(outcome)))
}

#[axum::debug_handler]
pub async fn patient_confirm_completion(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = CompletionService::new(&state);
    let outcome = service
        .confirm_completion(appointment_id, &user, ConfirmerRole::Patient, auth.token())
        .await?;

    Ok(Json(completion_response(outcome)))
}

// ==============================================================================
// QUEUE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_practitioner_queue(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(practitioner_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = QueueService::new(&state);
    let view = service
        .get_practitioner_queue(practitioner_id, &user, auth.token())
        .await?;

    Ok(Json(json!(view)))
}

#[axum::debug_handler]
pub async fn reorder_queue(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReorderQueueRequest>,
) -> Result<Json<Value>, AppError> {
    let service = QueueService::new(&state);
    let reordered = service
        .reorder_queue(&request.appointment_ids, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "reordered": reordered,
    })))
}
