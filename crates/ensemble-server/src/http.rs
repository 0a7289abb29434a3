//! HTTP surface: submit, list, and fetch runs.
//!
//! Submission is asynchronous by contract: the handler sanitizes the task
//! description, hands it to the orchestrator, and answers `202 Accepted`
//! with the run id before any planning or execution happens. Execution
//! errors never surface synchronously; they arrive through the event
//! stream and the stored terminal record.
//!
//! A `GET` for an unknown run answers 404 with an "unknown or still
//! running" message — readers must not interpret absence as failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use ensemble_core::ids::RunId;
use ensemble_runtime::orchestrator::Orchestrator;
use ensemble_runtime::store::RunStore;

use crate::config::ServerConfig;
use crate::health;
use crate::rooms::RoomRegistry;
use crate::ws;

/// Longest accepted task description, in characters.
const MAX_TASK_DESCRIPTION_LEN: usize = 1500;

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct AppState {
    /// Drives runs end-to-end.
    pub orchestrator: Arc<Orchestrator>,
    /// Event rooms for WebSocket subscribers.
    pub rooms: Arc<RoomRegistry>,
    /// Terminal-result storage.
    pub store: Arc<RunStore>,
    /// Live WebSocket connection counter.
    pub connections: Arc<AtomicUsize>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: ServerConfig,
}

/// Build the router with all HTTP and WebSocket routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/runs", post(submit_run).get(list_runs))
        .route("/runs/{run_id}", get(get_run))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Body of `POST /runs`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// The natural-language task to run.
    pub task_description: String,
}

/// Body of a `202 Accepted` submission response.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// Identifier of the accepted run.
    pub run_id: String,
}

/// `POST /runs` — accept a task and start a run.
async fn submit_run(State(state): State<AppState>, Json(req): Json<SubmitRequest>) -> Response {
    let task_description = sanitize_task_description(&req.task_description);
    if task_description.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing or invalid 'task_description'"})),
        )
            .into_response();
    }

    let run_id = state.orchestrator.submit(task_description);
    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            run_id: run_id.into_inner(),
        }),
    )
        .into_response()
}

/// `GET /runs` — snapshot of all known run identifiers.
async fn list_runs(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "run_ids": state.store.run_ids() }))
}

/// `GET /runs/{run_id}` — the full terminal record, an owned copy.
async fn get_run(State(state): State<AppState>, Path(run_id): Path<String>) -> Response {
    let Ok(run_id) = RunId::parse(&run_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid run_id format"})),
        )
            .into_response();
    };

    match state.store.get(run_id.as_str()) {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!(
                    "Results not found for run_id: {run_id}. It may still be running or failed to start."
                )
            })),
        )
            .into_response(),
    }
}

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> Json<health::HealthResponse> {
    let connections = state.connections.load(Ordering::Relaxed);
    Json(health::health_check(
        state.start_time,
        connections,
        state.orchestrator.active_count(),
    ))
}

/// Strip a submitted task description to the accepted character set and
/// length: alphanumerics, underscores, whitespace, and `,.!?-`, capped at
/// 1500 characters, trimmed.
#[must_use]
pub fn sanitize_task_description(raw: &str) -> String {
    raw.chars()
        .take(MAX_TASK_DESCRIPTION_LEN)
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace() || ",.!?-".contains(*c))
        .collect::<String>()
        .trim()
        .to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
