use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::services::tokens::AgentPrincipal;

/// GET /api/agent/jobs/next — atomically claim the oldest queued job.
/// 204 when the queue is empty. Intentionally not idempotent: each
/// call is a single-shot claim attempt.
pub async fn next_job(
    agent: AgentPrincipal,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    match state.jobs.claim_next(&agent.agent_id).await? {
        Some(job) => Ok(Json(job).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// GET /api/agent/jobs/{id}/download — raw artifact bytes, only for
/// the agent currently holding the claim.
pub async fn download(
    agent: AgentPrincipal,
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Response, ApiError> {
    let (job, bytes) = state.jobs.get_artifact(job_id, &agent.agent_id).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(disposition) = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        job.original_name.replace('"', "")
    )) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok((headers, bytes).into_response())
}

/// POST /api/agent/jobs/{id}/done — report successful printing.
pub async fn done(
    agent: AgentPrincipal,
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.jobs.mark_done(job_id, &agent.agent_id).await?;
    Ok(Json(json!({ "status": "done" })))
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub reason: Option<String>,
}

/// POST /api/agent/jobs/{id}/failed — report a failed print, with an
/// optional reason. The body is optional, so it is parsed leniently
/// rather than through the Json extractor.
pub async fn failed(
    agent: AgentPrincipal,
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reason = serde_json::from_slice::<FailRequest>(&body)
        .ok()
        .and_then(|b| b.reason)
        .filter(|r| !r.is_empty());
    state
        .jobs
        .mark_failed(job_id, &agent.agent_id, reason.as_deref())
        .await?;
    Ok(Json(json!({ "status": "failed" })))
}
