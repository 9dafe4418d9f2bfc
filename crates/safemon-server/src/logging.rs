use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tracing::Level;

const TRACE_HEADER: &str = "X-Trace-Id";
const HEALTH_PATH: &str = "/v1/health";
const BODY_PREVIEW_CHARS: usize = 200;

/// Per-request correlation id, carried in request extensions and echoed
/// back in the `X-Trace-Id` response header.
#[derive(Clone)]
pub struct TraceId(pub String);

impl TraceId {
    fn new() -> Self {
        Self(format!("{:016x}", rand::random::<u64>()))
    }
}

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

fn body_preview(bytes: &[u8], limit: usize) -> String {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return "<binary>".to_string();
    };
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn human_elapsed(elapsed: Duration) -> String {
    match elapsed.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.1}s", elapsed.as_secs_f64()),
    }
}

fn level_for(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() {
        Level::WARN
    } else {
        Level::INFO
    }
}

fn log_response(trace_id: &str, status: StatusCode, elapsed: &str, preview: &str) {
    let status_code = status.as_u16();
    let level = level_for(status);
    if level == Level::ERROR {
        tracing::error!(trace_id, status = status_code, elapsed, body = preview, "<-- response");
    } else if level == Level::WARN {
        tracing::warn!(trace_id, status = status_code, elapsed, body = preview, "<-- response");
    } else {
        tracing::info!(trace_id, status = status_code, elapsed, body = preview, "<-- response");
    }
}

/// Logs each request and its response with a shared trace id.
///
/// Scans can take a while, so the elapsed time is part of every response
/// line. Health checks only get the trace header.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = TraceId::new();
    req.extensions_mut().insert(trace_id.clone());

    if req.uri().path() == HEALTH_PATH {
        return with_trace_header(next.run(req).await, &trace_id);
    }

    let method = req.method().clone();
    let target = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), |pq| pq.to_string());
    let agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    tracing::info!(trace_id = trace_id.0.as_str(), method = %method, path = %target, ua = %agent, "--> request");

    let started = Instant::now();
    let (parts, body) = next.run(req).await.into_parts();
    let elapsed = human_elapsed(started.elapsed());

    let json_body = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let preview = if json_body {
        body_preview(&bytes, BODY_PREVIEW_CHARS)
    } else {
        String::new()
    };

    log_response(&trace_id, parts.status, &elapsed, &preview);

    with_trace_header(Response::from_parts(parts, Body::from(bytes)), &trace_id)
}

fn with_trace_header(mut response: Response, trace_id: &TraceId) -> Response {
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    response
}
