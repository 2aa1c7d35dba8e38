use serde::{Deserialize, Serialize};

/// Authenticated user identity as returned by the credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
    pub team_name: String,
}

/// Body of POST /api/auth/login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response of POST /api/auth/login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub username: String,
}

/// Response of GET /api/auth/me.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub username: String,
    pub team_name: String,
}
