use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sqlx::SqlitePool;

use crate::db::queries;
use crate::models::user::UserIdentity;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Credential hash error: {0}")]
    Hash(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Verifies username/password pairs against the users table.
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Authenticate a user, returning their identity on success.
    /// A missing user and a wrong password are indistinguishable to
    /// the caller.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserIdentity, CredentialError> {
        let (identity, hash) = queries::find_user_with_hash(&self.pool, username)
            .await?
            .ok_or(CredentialError::InvalidCredentials)?;

        let parsed = PasswordHash::new(&hash).map_err(|e| CredentialError::Hash(e.to_string()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| CredentialError::InvalidCredentials)?;

        Ok(identity)
    }

    /// Seed users from "username:password" pairs. Existing usernames
    /// are left untouched; the team name defaults to the username.
    pub async fn seed_default_users(&self, pairs: &[String]) -> Result<(), CredentialError> {
        for pair in pairs {
            let Some((username, password)) = pair.split_once(':') else {
                continue;
            };
            let username = username.trim();
            let password = password.trim();
            if username.is_empty() || password.is_empty() {
                continue;
            }

            if queries::find_user(&self.pool, username).await?.is_some() {
                continue;
            }

            let hash = hash_password(password)?;
            queries::insert_user(&self.pool, username, username, &hash).await?;
            tracing::info!(username, "Seeded default user");
        }
        Ok(())
    }
}

/// Hash a password for storage, used by seeding and provisioning.
pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_with_original_password() {
        let hash = hash_password("s3cret").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"s3cret", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"wrong", &parsed)
            .is_err());
    }
}
