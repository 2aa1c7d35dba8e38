//! Shared test harness: a queue service wired against a temp SQLite
//! database and a temp artifact directory.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

use print_relay::app_state::AppState;
use print_relay::db;
use print_relay::routes::build_router;
use print_relay::services::credentials::CredentialStore;
use print_relay::services::jobs::JobService;
use print_relay::services::storage::ArtifactStore;
use print_relay::services::tokens::TokenService;

pub const AGENT_TOKEN: &str = "agent-secret";
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

pub struct TestApp {
    pub state: AppState,
    pub upload_dir: PathBuf,
    _tmp: TempDir,
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), MAX_UPLOAD_BYTES)
    }
}

/// Stand up a fresh app with users alice and bob seeded.
pub async fn spawn_app() -> TestApp {
    let tmp = tempfile::tempdir().expect("tempdir");
    let db_url = format!("sqlite://{}/test.db?mode=rwc", tmp.path().display());

    let pool = db::init_pool(&db_url).await.expect("pool");
    db::run_migrations(&pool).await.expect("migrations");

    let upload_dir = tmp.path().join("uploads");
    let artifacts = ArtifactStore::new(&upload_dir);
    artifacts.init().await.expect("artifact dir");

    CredentialStore::new(pool.clone())
        .seed_default_users(&["alice:alice-pw".to_string(), "bob:bob-pw".to_string()])
        .await
        .expect("seed users");

    let tokens = TokenService::new("test-secret", 3600, vec![AGENT_TOKEN.to_string()]);
    let jobs = JobService::new(pool.clone(), artifacts);
    let state = AppState::new(pool, jobs, tokens);

    TestApp {
        state,
        upload_dir,
        _tmp: tmp,
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Log in through the router and return the access token.
pub async fn login(app: &TestApp, username: &str, password: &str) -> String {
    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "username": username, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK, "login failed");
    body_json(response).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Build a multipart/form-data body carrying one `file` part.
pub fn multipart_body(filename: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

/// Upload a file as the given user; returns the raw response.
pub async fn upload(app: &TestApp, token: &str, filename: &str, data: &[u8]) -> Response {
    let (content_type, body) = multipart_body(filename, data);
    app.router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Claim the next job as an agent; returns the raw response.
pub async fn claim(app: &TestApp, agent_id: &str) -> Response {
    app.router()
        .oneshot(
            Request::builder()
                .uri(format!("/api/agent/jobs/next?agent_id={agent_id}"))
                .header(header::AUTHORIZATION, format!("Bearer {AGENT_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn agent_get(app: &TestApp, path: &str, agent_id: &str) -> Response {
    app.router()
        .oneshot(
            Request::builder()
                .uri(format!("{path}?agent_id={agent_id}"))
                .header(header::AUTHORIZATION, format!("Bearer {AGENT_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn agent_post(app: &TestApp, path: &str, agent_id: &str, body: Option<Value>) -> Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("{path}?agent_id={agent_id}"))
        .header(header::AUTHORIZATION, format!("Bearer {AGENT_TOKEN}"));
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    app.router().oneshot(builder.body(body).unwrap()).await.unwrap()
}

/// List jobs as a user.
pub async fn list_jobs(app: &TestApp, token: &str) -> Value {
    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/jobs")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

/// Number of artifact files currently on disk.
pub fn artifact_count(app: &TestApp) -> usize {
    std::fs::read_dir(&app.upload_dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}
