//! REST API handlers for formation actions.
//!
//! The five orchestration operations: scale layers, scale containers,
//! balance, calculate, converge. A converge with per-node failures is
//! still a 200 — the report carries the breakdown; only structural
//! errors become 4xx.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use flotilla_orchestrator::OrchestratorError;

use crate::ApiState;
use crate::handlers::{ApiResponse, error_response};

/// Map an orchestrator error to a response with the right status.
pub(crate) fn orchestrator_error(e: OrchestratorError) -> impl IntoResponse {
    let status = match &e {
        OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
        OrchestratorError::NoCapacity(_) | OrchestratorError::InFlightConflict { .. } => {
            StatusCode::CONFLICT
        }
        OrchestratorError::Lifecycle(_) | OrchestratorError::State(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(&e.to_string(), status)
}

/// POST /api/v1/formations/:id/scale/layers
///
/// Body: layer name → desired node count. Returns the added/removed
/// node ids immediately; provisioning continues in the background.
pub async fn scale_layers(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(targets): Json<BTreeMap<String, u32>>,
) -> impl IntoResponse {
    match state.orchestrator.scale_layers(&id, &targets).await {
        Ok(summary) => ApiResponse::ok(summary).into_response(),
        Err(e) => orchestrator_error(e).into_response(),
    }
}

/// POST /api/v1/formations/:id/scale/containers
///
/// Body: process type → desired replica count.
pub async fn scale_containers(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(targets): Json<BTreeMap<String, u32>>,
) -> impl IntoResponse {
    match state.orchestrator.scale_containers(&id, targets).await {
        Ok(placement) => ApiResponse::ok(placement).into_response(),
        Err(e) => orchestrator_error(e).into_response(),
    }
}

/// POST /api/v1/formations/:id/balance
pub async fn balance(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.balance(&id).await {
        Ok(placement) => ApiResponse::ok(placement).into_response(),
        Err(e) => orchestrator_error(e).into_response(),
    }
}

/// POST /api/v1/formations/:id/calculate
pub async fn calculate(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.calculate(&id) {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => orchestrator_error(e).into_response(),
    }
}

/// POST /api/v1/formations/:id/converge
pub async fn converge(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    info!(formation = %id, "converge requested");
    match state.orchestrator.converge(&id).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => orchestrator_error(e).into_response(),
    }
}
