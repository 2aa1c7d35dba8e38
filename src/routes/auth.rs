use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::user::{LoginRequest, LoginResponse, MeResponse};
use crate::services::credentials::CredentialError;
use crate::services::tokens::UserPrincipal;

/// POST /api/auth/login — exchange credentials for an access token.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    let identity = state
        .credentials
        .authenticate(username, &body.password)
        .await
        .map_err(|e| match e {
            CredentialError::InvalidCredentials => {
                ApiError::Unauthorized("Invalid credentials".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    let access_token = state
        .tokens
        .issue_user_token(&identity.username)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(username = %identity.username, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.ttl_seconds(),
        username: identity.username,
    }))
}

/// GET /api/auth/me — identity behind the presented token.
pub async fn me(UserPrincipal(user): UserPrincipal) -> Json<MeResponse> {
    Json(MeResponse {
        username: user.username,
        team_name: user.team_name,
    })
}
