use sqlx::SqlitePool;

use crate::db::queries;
use crate::models::job::{Job, JobStatus};
use crate::services::storage::{ArtifactStore, StorageError};

const MAX_LISTED_JOBS: i64 = 100;
const MAX_FAILURE_REASON_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The Job Store: the single source of truth for the job state machine
/// and the owner of the artifact blob area. All state transitions go
/// through its operations; nothing else touches job rows or artifact
/// files.
pub struct JobService {
    pool: SqlitePool,
    artifacts: ArtifactStore,
}

impl JobService {
    pub fn new(pool: SqlitePool, artifacts: ArtifactStore) -> Self {
        Self { pool, artifacts }
    }

    /// Create a job in `queued` state. The artifact is made durable
    /// before the row becomes visible to claim queries; if the row
    /// insert fails, the just-written artifact is removed so no file
    /// is orphaned and no row ever references a missing artifact.
    pub async fn create_job(
        &self,
        owner_user_id: i64,
        requested_by: &str,
        original_name: &str,
        data: &[u8],
    ) -> Result<Job, JobError> {
        let stored_path = self.artifacts.save(original_name, data).await?;

        let job = match queries::insert_job(
            &self.pool,
            owner_user_id,
            requested_by,
            original_name,
            &stored_path,
        )
        .await
        {
            Ok(job) => job,
            Err(e) => {
                if let Err(cleanup_err) = self.artifacts.delete(&stored_path).await {
                    tracing::warn!(
                        stored_path,
                        error = %cleanup_err,
                        "Failed to remove artifact after insert failure"
                    );
                }
                return Err(e.into());
            }
        };

        metrics::counter!("print_jobs_submitted_total").increment(1);
        self.refresh_queue_depth().await;

        tracing::info!(
            job_id = job.id,
            owner_user_id,
            original_name,
            "Job queued"
        );
        Ok(job)
    }

    /// List the owner's jobs, most recent first. No cross-user
    /// visibility.
    pub async fn list_jobs(&self, owner_user_id: i64) -> Result<Vec<Job>, JobError> {
        Ok(queries::list_jobs_for_owner(&self.pool, owner_user_id, MAX_LISTED_JOBS).await?)
    }

    /// Atomically claim the oldest queued job for `agent_id`, or
    /// `None` when the queue is empty.
    pub async fn claim_next(&self, agent_id: &str) -> Result<Option<Job>, JobError> {
        let claimed = queries::claim_next(&self.pool, agent_id).await?;

        if let Some(job) = &claimed {
            self.refresh_queue_depth().await;
            tracing::info!(job_id = job.id, agent_id, "Job claimed");
        }
        Ok(claimed)
    }

    /// Return the artifact bytes for a job currently claimed by
    /// `agent_id`. Terminal `done` jobs have no artifact anymore and
    /// report NotFound; any other state mismatch is Forbidden.
    pub async fn get_artifact(
        &self,
        job_id: i64,
        agent_id: &str,
    ) -> Result<(Job, Vec<u8>), JobError> {
        let job = queries::get_job(&self.pool, job_id)
            .await?
            .ok_or(JobError::NotFound)?;

        match job.status {
            JobStatus::Claimed => {}
            JobStatus::Done => return Err(JobError::NotFound),
            _ => {
                return Err(JobError::Forbidden(format!(
                    "Job is not downloadable in state '{}'",
                    job.status.as_str()
                )))
            }
        }
        if job.claimed_by.as_deref() != Some(agent_id) {
            return Err(JobError::Forbidden(
                "Job is claimed by a different agent".to_string(),
            ));
        }

        let bytes = self.artifacts.load(&job.stored_path).await?;
        Ok((job, bytes))
    }

    /// Report successful printing. Requires the job to be `claimed` by
    /// the caller; the artifact is deleted here, exactly once.
    pub async fn mark_done(&self, job_id: i64, agent_id: &str) -> Result<(), JobError> {
        match queries::mark_done(&self.pool, job_id, agent_id).await? {
            Some(stored_path) => {
                if let Err(e) = self.artifacts.delete(&stored_path).await {
                    tracing::warn!(job_id, stored_path, error = %e, "Artifact cleanup failed");
                }
                metrics::counter!("print_jobs_completed_total").increment(1);
                tracing::info!(job_id, agent_id, "Job done");
                Ok(())
            }
            None => Err(self.report_precondition_error(job_id).await?),
        }
    }

    /// Report a failed print. Requires the job to be `claimed` by the
    /// caller. The artifact stays on disk for operator inspection but
    /// the job is never offered for claiming again.
    pub async fn mark_failed(
        &self,
        job_id: i64,
        agent_id: &str,
        reason: Option<&str>,
    ) -> Result<(), JobError> {
        let truncated = reason.map(|r| truncate_chars(r, MAX_FAILURE_REASON_CHARS));
        let won = queries::mark_failed(&self.pool, job_id, agent_id, truncated.as_deref()).await?;

        if !won {
            return Err(self.report_precondition_error(job_id).await?);
        }
        metrics::counter!("print_jobs_failed_total").increment(1);
        tracing::warn!(job_id, agent_id, reason = truncated.as_deref(), "Job failed");
        Ok(())
    }

    /// Distinguish NotFound from Conflict after a guarded transition
    /// affected zero rows.
    async fn report_precondition_error(&self, job_id: i64) -> Result<JobError, sqlx::Error> {
        match queries::get_job(&self.pool, job_id).await? {
            None => Ok(JobError::NotFound),
            Some(job) => Ok(JobError::Conflict(format!(
                "Job is in state '{}' (claimed_by: {})",
                job.status.as_str(),
                job.claimed_by.as_deref().unwrap_or("nobody")
            ))),
        }
    }

    async fn refresh_queue_depth(&self) {
        match queries::queued_count(&self.pool).await {
            Ok(n) => metrics::gauge!("print_queue_depth").set(n as f64),
            Err(e) => tracing::debug!(error = %e, "Could not refresh queue depth gauge"),
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
