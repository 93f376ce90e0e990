//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    queue: QueueHealth,
}

#[derive(Serialize)]
pub struct QueueHealth {
    status: String,
    pending_jobs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Returns 200 when the job store answers, 503 otherwise.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let queue = match state.jobs.get_jobs_by_status(pipeline::JobStatus::Pending).await {
        Ok(pending) => QueueHealth {
            status: "ok".to_string(),
            pending_jobs: pending.len(),
            error: None,
        },
        Err(e) => QueueHealth {
            status: "error".to_string(),
            pending_jobs: 0,
            error: Some(e.to_string()),
        },
    };

    let healthy = queue.status == "ok";
    (
        if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            queue,
        }),
    )
}
