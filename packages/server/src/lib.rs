//! Operational API and worker for the scraping pipeline.
//!
//! Exposes the HTTP surface (job submission, job status, usage snapshots,
//! truck review endpoints) behind the fixed-window rate limiter, and runs
//! the background worker that drains the job queue through the pipeline
//! processor.

pub mod app;
pub mod audit;
pub mod config;
pub mod middleware;
pub mod routes;
pub mod worker;

pub use app::{build_app, AppState};
pub use audit::{AuditKind, AuditLog};
pub use config::Config;
pub use worker::{Worker, WorkerConfig};
