pub mod error;
mod loan_requests;
pub mod rate_limit;
mod session;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

pub fn create_router() -> Router<Arc<AppState>> {
    let api_routes = Router::new()
        // Session gate (cookie auth)
        .route("/session", get(session::current_session))
        .route("/session/events", get(session::session_events))
        .route("/auth/refresh", post(session::refresh))
        .route(
            "/deals/:deal_id/loan-request/autosave",
            post(loan_requests::autosave),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
