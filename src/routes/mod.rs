pub mod agent;
pub mod auth;
pub mod health;
pub mod jobs;
pub mod metrics;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Assemble the queue service router. The `/metrics` scrape route is
/// wired separately by the server binary because it carries its own
/// state (the Prometheus handle).
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/upload", post(jobs::upload))
        .route("/api/jobs", get(jobs::list_jobs))
        .route("/api/agent/jobs/next", get(agent::next_job))
        .route("/api/agent/jobs/{id}/download", get(agent::download))
        .route("/api/agent/jobs/{id}/done", post(agent::done))
        .route("/api/agent/jobs/{id}/failed", post(agent::failed))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
