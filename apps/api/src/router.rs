use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use settlement_cell::router::{finance_routes, transaction_routes};
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "CareLink API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/transactions", transaction_routes(state.clone()))
        .nest("/finance", finance_routes(state.clone()))
}
