//! Application state and router assembly.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use pipeline::{ApiUsageMonitor, JobStore, RateLimiter, TruckStore};

use crate::audit::AuditLog;
use crate::middleware::rate_limit_middleware;
use crate::routes::{health, jobs, trucks, usage};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub trucks: Arc<dyn TruckStore>,
    pub monitor: Arc<ApiUsageMonitor>,
    pub limiter: Arc<RateLimiter>,
    pub audit: AuditLog,
}

/// Build the Axum application router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/pipeline/jobs",
            post(jobs::create_job_handler).get(jobs::list_jobs_handler),
        )
        .route("/pipeline/jobs/:id", get(jobs::get_job_handler))
        .route("/trucks", get(trucks::list_trucks_handler))
        .route("/trucks/rescore", post(trucks::rescore_handler))
        .route("/trucks/:id", get(trucks::get_truck_handler))
        .route("/usage", get(usage::all_usage_handler))
        .route("/usage/:service", get(usage::service_usage_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pipeline::rate_limit::{LimitClass, RateLimitConfig};
    use pipeline::MemoryStore;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(limiter: RateLimiter) -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState {
            jobs: store.clone(),
            trucks: store.clone(),
            monitor: Arc::new(ApiUsageMonitor::new(store.clone())),
            limiter: Arc::new(limiter),
            audit: AuditLog::spawn(),
        };
        (store, state)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (_, state) = test_state(RateLimiter::new());
        let app = build_app(state);

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn submitting_a_job_stores_it_pending() {
        let (store, state) = test_state(RateLimiter::new());
        let app = build_app(state);

        let response = app
            .oneshot(post_json(
                "/pipeline/jobs",
                r#"{"url":"https://example-truck.com"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(store.job_count(), 1);
        let pending = store
            .get_jobs_by_status(pipeline::JobStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending[0].target_url, "https://example-truck.com");
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected() {
        let (store, state) = test_state(RateLimiter::new());
        let app = build_app(state);

        let response = app
            .clone()
            .oneshot(post_json("/pipeline/jobs", r#"{"url":"not a url"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                "/pipeline/jobs",
                r#"{"url":"file:///etc/passwd"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(store.job_count(), 0);
    }

    #[tokio::test]
    async fn unknown_job_returns_not_found() {
        let (_, state) = test_state(RateLimiter::new());
        let app = build_app(state);

        let uri = format!("/pipeline/jobs/{}", uuid::Uuid::now_v7());
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn usage_endpoints_serve_known_services() {
        let (_, state) = test_state(RateLimiter::new());
        let app = build_app(state);

        let response = app.clone().oneshot(get("/usage")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get("/usage/llm")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/usage/telemetry")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rate_limit_counts_down_then_denies_with_headers() {
        let limiter = RateLimiter::new().with_config(
            LimitClass::Api,
            RateLimitConfig {
                window: Duration::from_secs(60),
                max_requests: 2,
                block_duration: Duration::from_secs(60),
                skip_successful_requests: false,
            },
        );
        let (_, state) = test_state(limiter);
        let app = build_app(state);

        let first = app.clone().oneshot(get("/pipeline/jobs")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-ratelimit-limit"], "2");
        assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

        let second = app.clone().oneshot(get("/pipeline/jobs")).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

        let third = app.clone().oneshot(get("/pipeline/jobs")).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(third.headers()["x-ratelimit-remaining"], "0");
        assert!(third.headers().contains_key("retry-after"));
        assert!(third.headers().contains_key("x-ratelimit-reset"));
    }

    #[tokio::test]
    async fn health_probe_is_exempt_from_rate_limiting() {
        let limiter = RateLimiter::new().with_config(
            LimitClass::Api,
            RateLimitConfig {
                window: Duration::from_secs(60),
                max_requests: 1,
                block_duration: Duration::from_secs(60),
                skip_successful_requests: false,
            },
        );
        let (_, state) = test_state(limiter);
        let app = build_app(state);

        for _ in 0..5 {
            let response = app.clone().oneshot(get("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn trucks_listing_is_empty_until_pipeline_runs() {
        let (_, state) = test_state(RateLimiter::new());
        let app = build_app(state);

        let response = app.oneshot(get("/trucks")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
