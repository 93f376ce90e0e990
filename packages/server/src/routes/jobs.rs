//! Pipeline job endpoints: submit, inspect, list.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pipeline::{JobStatus, ScrapingJob};

use crate::app::AppState;
use crate::audit::AuditKind;
use crate::routes::ApiError;

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub url: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Serialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
}

/// `POST /pipeline/jobs` — enqueue a scraping job for a URL.
pub async fn create_job_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let parsed = url::Url::parse(&body.url)
        .map_err(|_| ApiError::BadRequest(format!("invalid url: {}", body.url)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::BadRequest(format!(
            "unsupported url scheme: {}",
            parsed.scheme()
        )));
    }

    let job = ScrapingJob::new(&body.url).with_priority(body.priority);
    let job = state.jobs.create_job(&job).await?;

    state
        .audit
        .record(AuditKind::JobSubmitted, job.id.to_string(), body.url);
    tracing::info!(job_id = %job.id, url = %job.target_url, "scraping job enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateJobResponse { job_id: job.id }),
    ))
}

/// `GET /pipeline/jobs/{id}` — job status, errors, and collected payload.
pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScrapingJob>, ApiError> {
    let job = state
        .jobs
        .get_job(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job not found: {id}")))?;
    Ok(Json(job))
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
}

/// `GET /pipeline/jobs?status=` — jobs in one status (default pending).
pub async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<ScrapingJob>>, ApiError> {
    let status = match query.status.as_deref() {
        None => JobStatus::Pending,
        Some(raw) => raw
            .parse::<JobStatus>()
            .map_err(ApiError::BadRequest)?,
    };

    let jobs = state.jobs.get_jobs_by_status(status).await?;
    Ok(Json(jobs))
}
