//! Client identity extraction for rate limiting.

use axum::http::HeaderMap;

/// Identity key for rate limiting: first proxy-reported IP (or "unknown")
/// plus a truncated user-agent, so distinct clients behind one NAT are not
/// lumped together.
///
/// Priority: `x-forwarded-for` (first entry), then `x-real-ip`.
pub fn client_identity(headers: &HeaderMap) -> String {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
        })
        .unwrap_or("unknown");

    let user_agent = headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");
    let user_agent: String = user_agent.chars().take(50).collect();

    format!("{ip}:{user_agent}")
}
