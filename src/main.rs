use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use print_relay::app_state::AppState;
use print_relay::config::ServerConfig;
use print_relay::db;
use print_relay::routes;
use print_relay::services::{
    credentials::CredentialStore, jobs::JobService, storage::ArtifactStore, tokens::TokenService,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing print-relay queue service");

    if config.agent_tokens.is_empty() {
        tracing::warn!("AGENT_TOKENS is empty; agent endpoints will reject every request");
    }

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("print_jobs_submitted_total", "Total print jobs submitted");
    metrics::describe_counter!(
        "print_jobs_completed_total",
        "Total print jobs reported done"
    );
    metrics::describe_counter!("print_jobs_failed_total", "Total print jobs reported failed");
    metrics::describe_gauge!(
        "print_queue_depth",
        "Current number of queued jobs waiting for an agent"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to SQLite database");
    ensure_sqlite_parent_dir(&config.database_url);
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize artifact storage
    tracing::info!(upload_dir = %config.upload_dir, "Initializing artifact storage");
    let artifacts = ArtifactStore::new(&config.upload_dir);
    artifacts
        .init()
        .await
        .expect("Failed to initialize artifact storage");

    // Seed default users
    CredentialStore::new(db_pool.clone())
        .seed_default_users(&config.default_users)
        .await
        .expect("Failed to seed default users");

    // Create shared application state
    let tokens = TokenService::new(
        &config.app_secret,
        config.access_token_ttl_seconds,
        config.agent_tokens.clone(),
    );
    let jobs = JobService::new(db_pool.clone(), artifacts);
    let state = AppState::new(db_pool, jobs, tokens);

    // Build API routes
    let app = routes::build_router(state, config.max_upload_bytes)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        );

    tracing::info!("Starting print-relay on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}

/// Create the parent directory for a `sqlite://path` URL so first
/// startup works on an empty data directory.
fn ensure_sqlite_parent_dir(database_url: &str) {
    let Some(path) = database_url.strip_prefix("sqlite://") else {
        return;
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.starts_with(':') {
        // ":memory:" has no backing file
        return;
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
}
