use crate::logging::TraceId;
use crate::scan::{ScanError, TriggerError};
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_RECENT_LIMIT: usize = 100;
const MAX_RECENT_LIMIT: usize = 1000;

/// Response envelope shared by every endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 0 on success
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn success_empty_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: 0,
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "unauthorized" => 1002,
        "conflict" => 1005,
        "scan_running" => 1201,
        "lookup_failed" => 1202,
        "scan_configuration" => 1203,
        "trigger_not_configured" => 1204,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

fn scan_error_response(trace_id: &str, err: &ScanError) -> Response {
    tracing::error!(error = %err, stage = %err.stage(), "Triggered scan failed");
    match err {
        ScanError::Configuration(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            trace_id,
            "scan_configuration",
            &err.to_string(),
        ),
        ScanError::Lookup(_) => {
            error_response(StatusCode::BAD_GATEWAY, trace_id, "lookup_failed", &err.to_string())
        }
        ScanError::Persistence { .. } => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            trace_id,
            "storage_error",
            &err.to_string(),
        ),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
    scan_running: bool,
}

async fn health(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
            scan_running: state.trigger.is_running(),
        },
    )
}

async fn run_scan(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> impl IntoResponse {
    match state.trigger.run_now().await {
        Ok(result) => success_response(StatusCode::OK, &trace_id, result),
        Err(TriggerError::AlreadyRunning) => error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "scan_running",
            "a scan cycle is already running",
        ),
        Err(TriggerError::Scan(e)) => scan_error_response(&trace_id, &e),
    }
}

async fn run_scan_async(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.trigger.spawn() {
        Ok(()) => success_empty_response(StatusCode::ACCEPTED, &trace_id, "scan started"),
        Err(TriggerError::AlreadyRunning) => error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "scan_running",
            "a scan cycle is already running",
        ),
        Err(TriggerError::Scan(e)) => scan_error_response(&trace_id, &e),
    }
}

#[derive(Debug, Deserialize)]
struct RecentScansParams {
    limit: Option<usize>,
}

async fn recent_scans(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<RecentScansParams>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    match state.results.recent_scans(limit) {
        Ok(scans) => success_response(StatusCode::OK, &trace_id, scans),
        Err(e) => {
            tracing::error!(error = %e, "Failed to query recent scans");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &trace_id, "storage_error", "storage error")
        }
    }
}

async fn stats(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> impl IntoResponse {
    match state.results.domain_stats() {
        Ok(stats) => success_response(StatusCode::OK, &trace_id, stats),
        Err(e) => {
            tracing::error!(error = %e, "Failed to query domain stats");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &trace_id, "storage_error", "storage error")
        }
    }
}

async fn list_domains(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.list_active() {
        Ok(domains) => success_response(StatusCode::OK, &trace_id, domains),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list domains");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &trace_id, "storage_error", "storage error")
        }
    }
}

async fn list_categories(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.list_categories() {
        Ok(categories) => success_response(StatusCode::OK, &trace_id, categories),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list categories");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &trace_id, "storage_error", "storage error")
        }
    }
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/v1/health", get(health))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/scan", post(run_scan))
        .route("/v1/scan/async", post(run_scan_async))
        .route("/v1/scans/recent", get(recent_scans))
        .route("/v1/stats", get(stats))
        .route("/v1/domains", get(list_domains))
        .route("/v1/categories", get(list_categories))
}
