//! Dispatch agent tests against a real listening queue service:
//! the poll cycle contract and guaranteed spool cleanup.

mod helpers;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use print_relay::agent::printer::{PrintBackend, PrintError};
use print_relay::agent::{run_cycle, ClaimedJob, CycleOutcome, QueueClient};

use helpers::{spawn_app, TestApp, AGENT_TOKEN};

/// Records what reached the "printer" instead of spooling anything.
#[derive(Default)]
struct MockPrinter {
    fail_with: Option<String>,
    printed: Mutex<Vec<(i64, Vec<u8>)>>,
}

#[async_trait]
impl PrintBackend for MockPrinter {
    async fn render_and_print(&self, path: &Path, job: &ClaimedJob) -> Result<(), PrintError> {
        if let Some(reason) = &self.fail_with {
            return Err(PrintError::Spooler(reason.clone()));
        }
        let bytes = std::fs::read(path)?;
        self.printed.lock().unwrap().push((job.id, bytes));
        Ok(())
    }
}

/// Serve the app on an ephemeral port; returns its base URL.
async fn serve(app: &TestApp) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let router = app.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn upload_via_http(base_url: &str, filename: &str, data: &[u8]) -> i64 {
    let client = reqwest::Client::new();

    let login: serde_json::Value = client
        .post(format!("{base_url}/api/auth/login"))
        .json(&serde_json::json!({ "username": "alice", "password": "alice-pw" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = login["access_token"].as_str().unwrap().to_string();

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(data.to_vec()).file_name(filename.to_string()),
    );
    let response: serde_json::Value = client
        .post(format!("{base_url}/api/upload"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    response["job_id"].as_i64().unwrap()
}

async fn job_status(app: &TestApp, job_id: i64) -> (String, Option<String>) {
    let job = print_relay::db::queries::get_job(&app.state.db, job_id)
        .await
        .unwrap()
        .unwrap();
    (job.status.as_str().to_string(), job.failure_reason)
}

fn spool_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

fn work_dir() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().to_path_buf();
    (tmp, path)
}

#[tokio::test]
async fn empty_queue_yields_an_idle_cycle() {
    let app = spawn_app().await;
    let base_url = serve(&app).await;
    let client = QueueClient::new(&base_url, AGENT_TOKEN, "agent-1").unwrap();
    let printer = MockPrinter::default();
    let (_tmp, dir) = work_dir();

    let outcome = run_cycle(&client, &printer, &dir).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Idle);
    assert!(printer.printed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn successful_cycle_prints_reports_done_and_cleans_spool() {
    let app = spawn_app().await;
    let base_url = serve(&app).await;
    let job_id = upload_via_http(&base_url, "main.cpp", b"int main() {}").await;

    let client = QueueClient::new(&base_url, AGENT_TOKEN, "agent-1").unwrap();
    let printer = MockPrinter::default();
    let (_tmp, dir) = work_dir();

    let outcome = run_cycle(&client, &printer, &dir).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Completed(job_id));

    // The printer saw the exact uploaded bytes.
    let printed = printer.printed.lock().unwrap();
    assert_eq!(printed.as_slice(), &[(job_id, b"int main() {}".to_vec())]);

    // Reported back, artifact purged server-side, spool cleaned.
    let (status, _) = job_status(&app, job_id).await;
    assert_eq!(status, "done");
    assert_eq!(helpers::artifact_count(&app), 0);
    assert!(spool_is_empty(&dir));
}

#[tokio::test]
async fn print_failure_reports_failed_with_reason_and_cleans_spool() {
    let app = spawn_app().await;
    let base_url = serve(&app).await;
    let job_id = upload_via_http(&base_url, "main.cpp", b"int main() {}").await;

    let client = QueueClient::new(&base_url, AGENT_TOKEN, "agent-1").unwrap();
    let printer = MockPrinter {
        fail_with: Some("out of toner".to_string()),
        printed: Mutex::new(Vec::new()),
    };
    let (_tmp, dir) = work_dir();

    let outcome = run_cycle(&client, &printer, &dir).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Failed(job_id));

    let (status, reason) = job_status(&app, job_id).await;
    assert_eq!(status, "failed");
    assert!(reason.unwrap().contains("out of toner"));

    // Print failures are terminal for the job: the next cycle is idle.
    let outcome = run_cycle(&client, &printer, &dir).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Idle);
    assert!(spool_is_empty(&dir));
}

#[tokio::test]
async fn unreachable_server_surfaces_a_transient_error() {
    // Nothing listens here; the cycle must fail with a network error
    // rather than panic, leaving retry to the outer loop.
    let client = QueueClient::new("http://127.0.0.1:9", AGENT_TOKEN, "agent-1").unwrap();
    let printer = MockPrinter::default();
    let (_tmp, dir) = work_dir();

    assert!(run_cycle(&client, &printer, &dir).await.is_err());
}

#[tokio::test]
async fn claimed_job_stays_with_its_agent_across_cycles() {
    let app = spawn_app().await;
    let base_url = serve(&app).await;
    let job_id = upload_via_http(&base_url, "main.cpp", b"x").await;

    // agent-1 claims but never manages to report.
    let client1 = QueueClient::new(&base_url, AGENT_TOKEN, "agent-1").unwrap();
    let claimed = client1.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, job_id);

    // Another agent's poll does not reclaim the held job.
    let client2 = QueueClient::new(&base_url, AGENT_TOKEN, "agent-2").unwrap();
    assert!(client2.claim_next().await.unwrap().is_none());

    let (status, _) = job_status(&app, job_id).await;
    assert_eq!(status, "claimed");

    // Only the holder can resolve it.
    client1.report_done(job_id).await.unwrap();
    let (status, _) = job_status(&app, job_id).await;
    assert_eq!(status, "done");
}
