use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::error_response;
use crate::logging::TraceId;
use crate::state::AppState;

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Bearer-secret middleware guarding the scan trigger endpoints.
///
/// With no secret configured every protected request is refused with 500,
/// so an unconfigured deployment can never be triggered anonymously.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let Some(secret) = state.config.trigger.secret.as_deref().filter(|s| !s.is_empty()) else {
        tracing::error!("Trigger secret not configured, refusing request");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &trace_id,
            "trigger_not_configured",
            "trigger secret not configured",
        );
    };

    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let rejection = match token {
        Some(token) if constant_time_eq(token.as_bytes(), secret.as_bytes()) => None,
        Some(_) => Some("invalid token"),
        None => Some("missing authorization header"),
    };

    match rejection {
        None => next.run(req).await,
        Some(msg) => error_response(StatusCode::UNAUTHORIZED, &trace_id, "unauthorized", msg),
    }
}
