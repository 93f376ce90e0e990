//! Usage monitoring endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use pipeline::{Admission, ServiceUsageSnapshot, UsageReport};

use crate::app::AppState;
use crate::routes::ApiError;

/// `GET /usage` — consolidated snapshot across every configured service.
pub async fn all_usage_handler(State(state): State<AppState>) -> Json<UsageReport> {
    Json(state.monitor.check_all_apis().await)
}

#[derive(Deserialize)]
pub struct UsageQuery {
    /// Preview admission for this many requests
    pub requests: Option<u64>,
    /// ... and this many tokens
    pub tokens: Option<u64>,
}

#[derive(Serialize)]
pub struct ServiceUsageResponse {
    pub service: String,
    pub usage: ServiceUsageSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission: Option<Admission>,
}

/// `GET /usage/{service}` — one service's usage; pass `?requests=&tokens=`
/// to preview an admission decision without consuming quota.
pub async fn service_usage_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<ServiceUsageResponse>, ApiError> {
    let usage = state
        .monitor
        .get_current_usage(&service)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown service: {service}")))?;

    let admission = match (query.requests, query.tokens) {
        (None, None) => None,
        (requests, tokens) => Some(
            state
                .monitor
                .can_make_request(&service, requests.unwrap_or(1), tokens.unwrap_or(0))
                .await,
        ),
    };

    Ok(Json(ServiceUsageResponse {
        service,
        usage,
        admission,
    }))
}
