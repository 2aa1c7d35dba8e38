use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::db::queries;
use crate::error::ApiError;
use crate::models::user::UserIdentity;

/// Principal kind embedded in user access tokens.
const KIND_USER: &str = "user";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    kind: String,
    iat: i64,
    exp: i64,
}

/// The authenticated identity behind a bearer token.
///
/// User tokens are signed JWTs issued per login session. Agent tokens
/// are a fixed set of deployment secrets; the agent's claimed identity
/// travels separately in the `agent_id` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User { username: String },
    Agent,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token payload")]
    WrongKind,
}

/// Issues and verifies bearer tokens for both principal kinds.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: u64,
    agent_tokens: Vec<String>,
}

impl TokenService {
    pub fn new(secret: &str, ttl_seconds: u64, agent_tokens: Vec<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
            agent_tokens,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn has_agent_tokens(&self) -> bool {
        !self.agent_tokens.is_empty()
    }

    /// Issue a session token for an authenticated user.
    pub fn issue_user_token(&self, username: &str) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: username.to_string(),
            kind: KIND_USER.to_string(),
            iat: now,
            exp: now + self.ttl_seconds as i64,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Resolve a bearer token to a principal. Agent tokens are checked
    /// against the configured set before any JWT decoding happens.
    pub fn verify_bearer(&self, token: &str) -> Result<Principal, TokenError> {
        if !token.is_empty() && self.agent_tokens.iter().any(|t| t == token) {
            return Ok(Principal::Agent);
        }

        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        if data.claims.kind != KIND_USER {
            return Err(TokenError::WrongKind);
        }
        Ok(Principal::User {
            username: data.claims.sub,
        })
    }
}

fn bearer_token(parts: &Parts) -> Result<String, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))
}

/// Extractor for endpoints that require a user principal.
/// A valid agent token is rejected here, before any business logic.
#[derive(Debug, Clone)]
pub struct UserPrincipal(pub UserIdentity);

impl FromRequestParts<AppState> for UserPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        match state.tokens.verify_bearer(&token) {
            Ok(Principal::User { username }) => {
                let user = queries::find_user(&state.db, &username)
                    .await?
                    .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;
                Ok(UserPrincipal(user))
            }
            Ok(Principal::Agent) => {
                Err(ApiError::Unauthorized("User token required".to_string()))
            }
            Err(e) => Err(ApiError::Unauthorized(e.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AgentIdQuery {
    #[serde(default = "default_agent_id")]
    agent_id: String,
}

fn default_agent_id() -> String {
    "default-agent".to_string()
}

/// Extractor for endpoints that require an agent principal. The
/// agent's claimed identity is read from the `agent_id` query
/// parameter; a user session token never satisfies this.
#[derive(Debug, Clone)]
pub struct AgentPrincipal {
    pub agent_id: String,
}

impl FromRequestParts<AppState> for AgentPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.tokens.has_agent_tokens() {
            return Err(ApiError::Internal(
                "Server misconfiguration: no agent tokens configured".to_string(),
            ));
        }

        let token = bearer_token(parts)?;
        match state.tokens.verify_bearer(&token) {
            Ok(Principal::Agent) => {
                let Query(query) = Query::<AgentIdQuery>::from_request_parts(parts, state)
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                Ok(AgentPrincipal {
                    agent_id: query.agent_id,
                })
            }
            Ok(Principal::User { .. }) => {
                Err(ApiError::Unauthorized("Agent token required".to_string()))
            }
            Err(e) => Err(ApiError::Unauthorized(e.to_string())),
        }
    }
}
