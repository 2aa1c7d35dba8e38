use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::job::Job;
use crate::services::storage::sanitize_filename;
use crate::services::tokens::UserPrincipal;

/// Extensions accepted for upload, enforced server-side regardless of
/// any front-end restrictions.
const ALLOWED_EXTENSIONS: &[&str] = &[".cpp", ".py", ".c", ".java", ".pdf"];

fn allowed_extension(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Keep the multipart error's own status; a body over the configured
/// limit must surface as 413, not a generic bad request.
fn multipart_error(err: MultipartError) -> ApiError {
    match err.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge("File too large".to_string()),
        _ => ApiError::BadRequest(err.to_string()),
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: i64,
    pub filename: String,
    pub status: String,
    pub requested_by: String,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

/// POST /api/upload — accept a file and enqueue a print job.
pub async fn upload(
    UserPrincipal(user): UserPrincipal,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(sanitize_filename)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| ApiError::BadRequest("filename is empty".to_string()))?;
            let data = field.bytes().await.map_err(multipart_error)?;
            upload = Some((filename, data.to_vec()));
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| ApiError::BadRequest("'file' is required".to_string()))?;

    if !allowed_extension(&filename) {
        return Err(ApiError::UnsupportedMediaType(format!(
            "File extension not allowed: {filename}"
        )));
    }

    let job = state
        .jobs
        .create_job(user.id, &user.team_name, &filename, &data)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            job_id: job.id,
            filename: job.original_name,
            status: job.status.as_str().to_string(),
            requested_by: job.requested_by,
        }),
    ))
}

/// GET /api/jobs — the caller's own jobs, most recent first.
pub async fn list_jobs(
    UserPrincipal(user): UserPrincipal,
    State(state): State<AppState>,
) -> Result<Json<JobListResponse>, ApiError> {
    let jobs = state.jobs.list_jobs(user.id).await?;
    Ok(Json(JobListResponse { jobs }))
}
