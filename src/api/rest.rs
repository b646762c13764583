// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Public endpoints (health) require no
// authentication. All other endpoints require a valid Bearer token checked
// via the `AuthBearer` extractor. Every mutation journals an Alert row.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::config::BotConfig;
use crate::engine::Engine;
use crate::scheduler::Scheduler;

/// Shared state for every handler.
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub scheduler: Arc<Scheduler>,
    /// Tenant the operator surface acts for unless overridden per request.
    pub default_user: String,
}

/// Optional per-request tenant override: `?user=<id>`.
#[derive(Debug, Deserialize)]
struct UserParam {
    user: Option<String>,
}

impl UserParam {
    fn resolve(&self, state: &ApiState) -> String {
        self.user.clone().unwrap_or_else(|| state.default_user.clone())
    }
}

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/state", get(engine_state))
        .route("/api/v1/positions", get(positions))
        .route("/api/v1/trades", get(trades))
        .route("/api/v1/trades/stats", get(trade_stats))
        .route("/api/v1/signals", get(signals))
        .route("/api/v1/alerts", get(alerts))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/config", post(set_config))
        .route("/api/v1/control/start", post(control_start))
        .route("/api/v1/control/stop", post(control_stop))
        .route("/api/v1/control/emergency-stop", post(control_emergency_stop))
        .route("/api/v1/control/resume", post(control_resume))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, axum::Json<serde_json::Value>) {
    warn!(error = %err, "operator API request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({ "error": err.to_string() })),
    )
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// State snapshot
// =============================================================================

async fn engine_state(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    let running = state.scheduler.is_running(&user_id);
    let bot_state = state.engine.state_snapshot(&user_id);
    let config = state.engine.load_config(&user_id).ok();

    Json(serde_json::json!({
        "user": user_id,
        "running": running,
        "state": bot_state,
        "config": config,
        "server_time": chrono::Utc::now().timestamp_millis(),
    }))
}

// =============================================================================
// Journals
// =============================================================================

async fn positions(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    match state.engine.store.open_positions(&user_id) {
        Ok(positions) => Json(positions).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn trades(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    match state.engine.store.trades(&user_id, 200) {
        Ok(trades) => Json(trades).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn trade_stats(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    match state.engine.store.trade_stats(&user_id) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn signals(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    match state.engine.store.signals(&user_id, 200) {
        Ok(signals) => Json(signals).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn alerts(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    match state.engine.store.alerts(&user_id, 200) {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

// =============================================================================
// Config
// =============================================================================

async fn get_config(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    match state.engine.load_config(&user_id) {
        Ok(config) => Json(config).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn set_config(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
    Json(config): Json<BotConfig>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    match state.engine.update_config(&user_id, &config) {
        Ok(()) => {
            info!(user_id, "bot config updated via operator API");
            Json(serde_json::json!({ "updated": true })).into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}

// =============================================================================
// Engine control
// =============================================================================

async fn control_start(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    match state.scheduler.start(&user_id) {
        Ok(started) => Json(serde_json::json!({ "started": started })).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn control_stop(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    let stopped = state.scheduler.stop(&user_id);
    Json(serde_json::json!({ "stopped": stopped }))
}

#[derive(Debug, Deserialize)]
struct EmergencyStopRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn control_emergency_stop(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
    Json(request): Json<EmergencyStopRequest>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    let reason = request
        .reason
        .unwrap_or_else(|| "operator emergency stop".to_string());

    // Stop the tick loop first so the flatten is not racing a tick.
    state.scheduler.stop(&user_id);

    match state.engine.emergency_stop(&user_id, &reason).await {
        Ok(()) => Json(serde_json::json!({ "stopped": true })).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    justification: String,
}

async fn control_resume(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(user): Query<UserParam>,
    Json(request): Json<ResumeRequest>,
) -> impl IntoResponse {
    let user_id = user.resolve(&state);
    match state.engine.resume(&user_id, &request.justification) {
        Ok(()) => Json(serde_json::json!({ "resumed": true })).into_response(),
        Err(e) => (
            StatusCode::CONFLICT,
            axum::Json(serde_json::json!({ "error": e })),
        )
            .into_response(),
    }
}
