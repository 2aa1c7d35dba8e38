use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::{credentials::CredentialStore, jobs::JobService, tokens::TokenService};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub jobs: Arc<JobService>,
    pub tokens: Arc<TokenService>,
    pub credentials: Arc<CredentialStore>,
}

impl AppState {
    pub fn new(db: SqlitePool, jobs: JobService, tokens: TokenService) -> Self {
        let credentials = CredentialStore::new(db.clone());
        Self {
            db,
            jobs: Arc::new(jobs),
            tokens: Arc::new(tokens),
            credentials: Arc::new(credentials),
        }
    }
}
