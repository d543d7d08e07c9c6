// libs/settlement-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    BalanceUpdateOutcome, HistoryQuery, PageQuery, PaymentRequestBody, RejectBody,
    SettlementError, TransactionStatus, TransactionType, UpdateBalanceRequest,
};
use crate::services::balance::BalanceService;
use crate::services::ledger::LedgerService;
use crate::services::payment::PaymentService;
use crate::services::withdrawal::WithdrawalService;

const DEFAULT_REQUEST_PAGE_LIMIT: i64 = 20;

impl From<SettlementError> for AppError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::NotFound => AppError::NotFound("Transaction not found".to_string()),
            SettlementError::BalanceNotFound => {
                AppError::NotFound("Balance not found".to_string())
            }
            SettlementError::Unauthorized => {
                AppError::Auth("Not authorized for this ledger operation".to_string())
            }
            SettlementError::ValidationError(msg) => AppError::ValidationError(msg),
            SettlementError::Conflict(msg) => AppError::Conflict(msg),
            SettlementError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub practitioner_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    #[serde(rename = "type")]
    pub tx_type: Option<TransactionType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Auth("Administrator access required".to_string()))
    }
}

fn actor_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Token subject is not a valid id".to_string()))
}

// ==============================================================================
// LEDGER HISTORY HANDLERS
// ==============================================================================

/// Practitioners see their own ledger; admins see everything, optionally
/// narrowed to one practitioner.
#[axum::debug_handler]
pub async fn get_transaction_history(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let practitioner_id = if user.is_admin() {
        params.practitioner_id
    } else {
        Some(actor_id(&user)?)
    };

    let query = HistoryQuery {
        status: params.status,
        tx_type: params.tx_type,
        start_date: params.start_date,
        end_date: params.end_date,
        page: params.page,
        limit: params.limit,
    };

    let ledger = LedgerService::new(Arc::new(SupabaseClient::new(&state)));
    let history = ledger
        .transaction_history(practitioner_id, &query, token)
        .await?;

    Ok(Json(json!({
        "success": true,
        "transactions": history.transactions,
        "total": history.total,
        "fee": history.fee,
        "summary": history.summary,
        "pagination": history.pagination,
    })))
}

// ==============================================================================
// WITHDRAWAL HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn request_withdrawal(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_practitioner() {
        return Err(AppError::Auth(
            "Only practitioners can request withdrawals".to_string(),
        ));
    }
    let practitioner_id = actor_id(&user)?;

    let service = WithdrawalService::new(&state);
    let outcome = service
        .request_withdrawal(practitioner_id, auth.token())
        .await?;

    Ok(Json(serde_json::to_value(outcome).map_err(|e| {
        AppError::Internal(format!("Failed to serialize response: {}", e))
    })?))
}

#[axum::debug_handler]
pub async fn get_withdrawal_requests(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = WithdrawalService::new(&state);
    let (requests, pagination) = service
        .list_requests(
            params.status.unwrap_or(TransactionStatus::Requested),
            params.page.unwrap_or(1).max(1),
            params.limit.unwrap_or(DEFAULT_REQUEST_PAGE_LIMIT).max(1),
            auth.token(),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "requests": requests,
        "pagination": pagination,
    })))
}

#[axum::debug_handler]
pub async fn approve_withdrawal(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = WithdrawalService::new(&state);
    let receipt = service
        .approve_withdrawal(withdrawal_id, auth.token())
        .await?;

    Ok(Json(json!(receipt)))
}

#[axum::debug_handler]
pub async fn reject_withdrawal(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(withdrawal_id): Path<Uuid>,
    body: Option<Json<RejectBody>>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let reason = body.and_then(|Json(b)| b.reason);
    let service = WithdrawalService::new(&state);
    let rejected = service
        .reject_withdrawal(withdrawal_id, reason, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "transaction": rejected,
    })))
}

// ==============================================================================
// PAYMENT (DEBT REPAYMENT) HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn request_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(body): Json<PaymentRequestBody>,
) -> Result<Json<Value>, AppError> {
    if !user.is_practitioner() {
        return Err(AppError::Auth(
            "Only practitioners can submit payments".to_string(),
        ));
    }
    let practitioner_id = actor_id(&user)?;

    let service = PaymentService::new(&state);
    let receipt = service
        .request_payment(practitioner_id, body, auth.token())
        .await?;

    Ok(Json(json!(receipt)))
}

#[axum::debug_handler]
pub async fn get_payment_requests(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = PaymentService::new(&state);
    let (requests, pagination) = service
        .list_requests(
            params.status.unwrap_or(TransactionStatus::Requested),
            params.page.unwrap_or(1).max(1),
            params.limit.unwrap_or(DEFAULT_REQUEST_PAGE_LIMIT).max(1),
            auth.token(),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "requests": requests,
        "pagination": pagination,
    })))
}

#[axum::debug_handler]
pub async fn approve_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = PaymentService::new(&state);
    let approved = service.approve_payment(payment_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "transaction": approved,
    })))
}

#[axum::debug_handler]
pub async fn reject_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<Uuid>,
    body: Option<Json<RejectBody>>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let reason = body.and_then(|Json(b)| b.reason);
    let service = PaymentService::new(&state);
    let rejected = service
        .reject_payment(payment_id, reason, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "transaction": rejected,
    })))
}

// ==============================================================================
// BALANCE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_balances(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = BalanceService::new(&state);
    let (balances, pagination) = service.list_balances(&params, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "balances": balances,
        "pagination": pagination,
    })))
}

#[axum::debug_handler]
pub async fn get_my_balance(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_practitioner() {
        return Err(AppError::Auth(
            "Only practitioners have a balance".to_string(),
        ));
    }
    let practitioner_id = actor_id(&user)?;

    let service = BalanceService::new(&state);
    let balance = service.get_balance(practitioner_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "balance": balance,
    })))
}

#[axum::debug_handler]
pub async fn update_balance(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(practitioner_id): Path<Uuid>,
    Json(body): Json<UpdateBalanceRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let admin_id = actor_id(&user)?;

    let service = BalanceService::new(&state);
    let outcome = service
        .update_balance(practitioner_id, admin_id, body, auth.token())
        .await?;

    let response = match outcome {
        BalanceUpdateOutcome::NoChange(balance) => json!({
            "success": true,
            "message": "No change",
            "balance": balance,
        }),
        BalanceUpdateOutcome::Updated(balance) => json!({
            "success": true,
            "message": "Balance updated",
            "balance": balance,
        }),
    };

    Ok(Json(response))
}
