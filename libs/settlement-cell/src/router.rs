// libs/settlement-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

/// Ledger, withdrawal and payment routes, mounted under `/transactions`.
pub fn transaction_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/history", get(handlers::get_transaction_history))
        .route("/withdraw/request", post(handlers::request_withdrawal))
        .route("/withdraw/requests", get(handlers::get_withdrawal_requests))
        .route("/withdraw/approve/{withdrawal_id}", post(handlers::approve_withdrawal))
        .route("/withdraw/reject/{withdrawal_id}", post(handlers::reject_withdrawal))
        .route("/payment/request", post(handlers::request_payment))
        .route("/payment/requests", get(handlers::get_payment_requests))
        .route("/payment/approve/{payment_id}", post(handlers::approve_payment))
        .route("/payment/reject/{payment_id}", post(handlers::reject_payment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

/// Balance routes, mounted under `/finance`.
pub fn finance_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/balances", get(handlers::get_balances))
        .route("/my-balance", get(handlers::get_my_balance))
        .route("/balance/update/{practitioner_id}", put(handlers::update_balance))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
