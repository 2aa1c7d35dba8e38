//! Dispatch agent: a single-worker polling loop that claims at most
//! one job at a time, downloads its artifact into a scoped spool file,
//! hands it to the print backend and reports the outcome. The outer
//! loop is the only retry mechanism; a job whose print fails is
//! reported `failed` and never retried here.

pub mod printer;

use reqwest::StatusCode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;

use crate::services::storage::sanitize_filename;
use printer::{PrintBackend, PrintError};

const MAX_REPORTED_REASON_CHARS: usize = 500;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The subset of the job representation the agent needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimedJob {
    pub id: i64,
    pub original_name: String,
    pub requested_by: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server rejected request ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Report conflict: {0}")]
    Conflict(String),

    #[error("Spool I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Print(#[from] PrintError),
}

/// HTTP client for the queue service's agent endpoints.
pub struct QueueClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    agent_id: String,
}

impl QueueClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            agent_id: agent_id.into(),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn reject(response: reqwest::Response) -> AgentError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            AgentError::Conflict(message)
        } else {
            AgentError::Server {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Single-shot claim attempt. `None` when the queue is empty.
    pub async fn claim_next(&self) -> Result<Option<ClaimedJob>, AgentError> {
        let response = self
            .http
            .get(self.url("/api/agent/jobs/next"))
            .query(&[("agent_id", &self.agent_id)])
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }
        Ok(Some(response.json().await?))
    }

    /// Download the artifact of a job this agent has claimed.
    pub async fn download(&self, job_id: i64) -> Result<Vec<u8>, AgentError> {
        let response = self
            .http
            .get(self.url(&format!("/api/agent/jobs/{job_id}/download")))
            .query(&[("agent_id", &self.agent_id)])
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn report_done(&self, job_id: i64) -> Result<(), AgentError> {
        let response = self
            .http
            .post(self.url(&format!("/api/agent/jobs/{job_id}/done")))
            .query(&[("agent_id", &self.agent_id)])
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }
        Ok(())
    }

    pub async fn report_failed(&self, job_id: i64, reason: &str) -> Result<(), AgentError> {
        let response = self
            .http
            .post(self.url(&format!("/api/agent/jobs/{job_id}/failed")))
            .query(&[("agent_id", &self.agent_id)])
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "reason": reason }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }
        Ok(())
    }
}

/// Scoped local spool file for one poll cycle. The file is removed on
/// drop, on every exit path, so nothing is ever left behind across
/// cycles.
pub struct SpoolFile {
    path: PathBuf,
}

impl SpoolFile {
    pub fn new(work_dir: &Path, job_id: i64, original_name: &str) -> Self {
        let name = format!("{job_id}_{}", sanitize_filename(original_name));
        Self {
            path: work_dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, data: &[u8]) -> Result<(), std::io::Error> {
        tokio::fs::write(&self.path, data).await
    }
}

impl Drop for SpoolFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Spool cleanup failed");
            }
        }
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Queue was empty.
    Idle,
    /// A job was processed and reported done.
    Completed(i64),
    /// A job was processed and reported failed.
    Failed(i64),
}

/// One poll cycle: claim, download, print, report.
///
/// Transport errors bubble up and are retried implicitly by the next
/// cycle; a job-level failure (rejected download, render/print error)
/// is terminal for the job and reported as `failed`. A failed report
/// call is logged and the job is left `claimed` server-side.
pub async fn run_cycle<P: PrintBackend + ?Sized>(
    client: &QueueClient,
    printer: &P,
    work_dir: &Path,
) -> Result<CycleOutcome, AgentError> {
    let Some(job) = client.claim_next().await? else {
        return Ok(CycleOutcome::Idle);
    };

    tracing::info!(
        job_id = job.id,
        file = %job.original_name,
        requested_by = %job.requested_by,
        "Processing print job"
    );

    // From here on the spool file is cleaned up no matter how the
    // cycle ends.
    let spool = SpoolFile::new(work_dir, job.id, &job.original_name);

    let result = fetch_and_print(client, printer, &job, &spool).await;

    match result {
        Ok(()) => {
            match client.report_done(job.id).await {
                Ok(()) => tracing::info!(job_id = job.id, "Job done"),
                Err(e) => log_report_failure(job.id, &e),
            }
            Ok(CycleOutcome::Completed(job.id))
        }
        // A transport error talking to the queue service: leave the
        // job claimed and let the next cycle retry the network, not
        // the job.
        Err(AgentError::Network(e)) => Err(AgentError::Network(e)),
        Err(e) => {
            let reason: String = e.to_string().chars().take(MAX_REPORTED_REASON_CHARS).collect();
            tracing::warn!(job_id = job.id, reason = %reason, "Job processing failed");
            match client.report_failed(job.id, &reason).await {
                Ok(()) => {}
                Err(report_err) => log_report_failure(job.id, &report_err),
            }
            Ok(CycleOutcome::Failed(job.id))
        }
    }
}

async fn fetch_and_print<P: PrintBackend + ?Sized>(
    client: &QueueClient,
    printer: &P,
    job: &ClaimedJob,
    spool: &SpoolFile,
) -> Result<(), AgentError> {
    let bytes = client.download(job.id).await?;
    spool.write(&bytes).await?;
    printer.render_and_print(spool.path(), job).await?;
    Ok(())
}

fn log_report_failure(job_id: i64, err: &AgentError) {
    match err {
        AgentError::Conflict(msg) => {
            // Someone else already resolved this job; abandon it.
            tracing::warn!(job_id, conflict = %msg, "Report conflicted, abandoning job locally");
        }
        other => {
            tracing::error!(job_id, error = %other, "Report call failed; job stays claimed");
        }
    }
}

/// The outer poll loop: sleeps between empty polls and after
/// transport errors, and keeps exactly one job in flight.
pub async fn run<P: PrintBackend + ?Sized>(
    client: &QueueClient,
    printer: &P,
    work_dir: &Path,
    poll_interval: Duration,
) {
    loop {
        match run_cycle(client, printer, work_dir).await {
            Ok(CycleOutcome::Idle) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(poll_interval).await;
            }
            Ok(outcome) => {
                tracing::debug!(?outcome, "Cycle finished, checking for next job");
            }
            Err(e) => {
                tracing::error!(error = %e, "Poll cycle failed, will retry");
                sleep(poll_interval).await;
            }
        }
    }
}
