//! Inbound rate limiting.
//!
//! Applies the fixed-window limiter per client identity and limit class,
//! translating denials into 429 responses with the standard quota headers.

use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use pipeline::rate_limit::{LimitClass, RateLimitDecision};

use crate::app::AppState;
use crate::audit::AuditKind;
use crate::middleware::client_identity::client_identity;

/// Which policy covers a path. `/health` stays unmetered for probes.
fn class_for_path(path: &str) -> Option<LimitClass> {
    if path == "/health" {
        return None;
    }
    if path == "/usage" || path.starts_with("/usage/") {
        return Some(LimitClass::Admin);
    }
    Some(LimitClass::Api)
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(class) = class_for_path(request.uri().path()) else {
        return next.run(request).await;
    };

    let identity = client_identity(request.headers());
    let decision = state.limiter.check(&identity, class);
    let max_requests = state.limiter.class_config(class).max_requests;

    if !decision.allowed {
        state.audit.record(
            AuditKind::RateLimitDenied,
            &identity,
            format!("{} {}", class, request.uri().path()),
        );

        let mut response = (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
        apply_quota_headers(&mut response, max_requests, &decision);
        if let Some(retry_after) = decision.retry_after {
            set_header(&mut response, RETRY_AFTER.as_str(), retry_after.to_string());
        }
        return response;
    }

    let mut response = next.run(request).await;
    apply_quota_headers(&mut response, max_requests, &decision);
    response
}

fn apply_quota_headers(response: &mut Response, limit: u32, decision: &RateLimitDecision) {
    set_header(response, "x-ratelimit-limit", limit.to_string());
    set_header(response, "x-ratelimit-remaining", decision.remaining.to_string());
    set_header(response, "x-ratelimit-reset", decision.reset_at.to_rfc3339());
}

fn set_header(response: &mut Response, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        response.headers_mut().insert(name, value);
    }
}
