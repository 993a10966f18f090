// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. `health` is public. Every other
// endpoint requires a valid Bearer token via the `AuthBearer` extractor.
// This is a read-only view onto engine state plus two narrow control
// endpoints — there is no position, order, or account surface here.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::types::Intent;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/gates", get(gates))
        .route("/api/v1/control/intent", post(control_intent))
        .route("/api/v1/control/arm", post(control_arm))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn full_state(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.datahub.get_latest() {
        Some(snapshot) => Json(snapshot.as_ref().clone()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "engine has not published a snapshot yet")
            .into_response(),
    }
}

async fn gates(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.datahub.get_latest() {
        Some(snapshot) => Json(snapshot.gates.clone()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "engine has not published a snapshot yet")
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct IntentRequest {
    intent: Intent,
}

async fn control_intent(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(body): Json<IntentRequest>,
) -> impl IntoResponse {
    let cmd_id = state.push_intent(body.intent);
    info!(cmd_id, intent = %body.intent, "control_intent accepted");
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "cmd_id": cmd_id })))
}

#[derive(Debug, Deserialize)]
struct ArmRequest {
    arm: bool,
}

async fn control_arm(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(body): Json<ArmRequest>,
) -> impl IntoResponse {
    let cmd_id = state.push_arm(body.arm);
    info!(cmd_id, arm = body.arm, "control_arm accepted");
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "cmd_id": cmd_id })))
}
