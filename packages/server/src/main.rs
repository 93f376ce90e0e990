// Main entry point for the pipeline API server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeline::{
    ApiUsageMonitor, HttpFetcher, JobStore, MarkdownExtractor, PipelineProcessor, RateLimiter,
    TruckStore, UsageLedger,
};
use server_core::{build_app, AppState, AuditLog, Config, Worker, WorkerConfig};

type Stores = (Arc<dyn JobStore>, Arc<dyn TruckStore>, Arc<dyn UsageLedger>);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,pipeline=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting food truck ingestion API");

    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let (jobs, trucks, ledger) = build_stores(&config).await?;

    let monitor = Arc::new(ApiUsageMonitor::new(ledger));
    let limiter = Arc::new(RateLimiter::new());
    let audit = AuditLog::spawn();

    let fetcher = Arc::new(HttpFetcher::new().context("Failed to build HTTP fetcher")?);
    let extractor = Arc::new(MarkdownExtractor::new());
    let processor = Arc::new(PipelineProcessor::new(
        jobs.clone(),
        trucks.clone(),
        monitor.clone(),
        fetcher,
        extractor,
    ));

    // Background worker drains the job queue until shutdown.
    let shutdown = CancellationToken::new();
    let worker = Worker::new(processor, jobs.clone()).with_config(WorkerConfig {
        poll_interval: config.worker_poll_interval,
        stale_job_threshold: config.stale_job_threshold,
        reap_interval: Duration::from_secs(60),
    });
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let state = AppState {
        jobs,
        trucks,
        monitor,
        limiter,
        audit,
    };
    let app = build_app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    // Let the worker finish its current job before exiting.
    shutdown.cancel();
    worker_handle.await.ok();

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

async fn build_stores(config: &Config) -> Result<Stores> {
    #[cfg(feature = "postgres")]
    if let Some(database_url) = &config.database_url {
        tracing::info!("Connecting to database...");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        tracing::info!("Database connected");

        let store = Arc::new(pipeline::PostgresStore::new(pool));
        return Ok((store.clone(), store.clone(), store));
    }

    #[cfg(not(feature = "postgres"))]
    if config.database_url.is_some() {
        tracing::warn!(
            "DATABASE_URL is set but the postgres feature is not compiled in; using memory store"
        );
    }

    tracing::info!("Using in-memory store (single-instance mode, data lost on restart)");
    let store = Arc::new(pipeline::MemoryStore::new());
    Ok((store.clone(), store.clone(), store))
}
