use axum::{extract::State, Json};
use serde::Serialize;

use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
}

/// Health check - GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "ok",
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}
