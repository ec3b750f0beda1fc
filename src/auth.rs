//! Password hashing, bearer tokens and the request extractors that resolve
//! them into users.
//!
//! Tokens are 32 random bytes, hex-encoded for the client. Only their SHA-256
//! digest is stored, so a leaked database does not leak usable tokens.
//!
//! Handlers declare the caller they need through their arguments:
//!
//! | Extractor | Accepts | Rejection |
//! |-----------|---------|-----------|
//! | [`AuthUser`] | any valid token | 401 |
//! | [`StudentUser`] | role `student` | 401 / 403 |
//! | [`TeacherUser`] | role `teacher` | 401 / 403 |
//! | [`AdminUser`] | role `admin` | 401 / 403 |

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::db::now_ts;
use crate::error::ApiError;
use crate::models::{Role, User};
use crate::server::AppState;
use crate::users::{find_user_by_email, password_hash, user_from_row, USER_COLUMNS};

/// Hash a password with Argon2id. Returns the PHC string (salt and params included).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {e}"))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Create a token for `user_id` valid for `ttl_hours`. Returns the plain token.
pub async fn issue_token(pool: &SqlitePool, user_id: i64, ttl_hours: i64) -> Result<String> {
    let token = generate_token();
    let now = now_ts();
    sqlx::query(
        "INSERT INTO api_tokens (user_id, token_hash, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(hash_token(&token))
    .bind(now)
    .bind(now + ttl_hours * 3600)
    .execute(pool)
    .await?;
    Ok(token)
}

async fn user_for_token_hash(pool: &SqlitePool, token_hash: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM api_tokens t JOIN users u ON u.id = t.user_id \
         WHERE t.token_hash = ? AND t.expires_at > ?",
        USER_COLUMNS
    ))
    .bind(token_hash)
    .bind(now_ts())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Resolve a plain bearer token to its user. Expired tokens resolve to `None`.
pub async fn resolve_token(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    user_for_token_hash(pool, &hash_token(token)).await
}

async fn revoke_token_hash(pool: &SqlitePool, token_hash: &str) -> Result<()> {
    sqlx::query("DELETE FROM api_tokens WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(())
}

/// Check credentials and issue a token. `None` means the email is unknown,
/// the account has no password, or the password is wrong.
pub async fn login(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    ttl_hours: i64,
) -> Result<Option<(String, User)>> {
    let Some(user) = find_user_by_email(pool, email).await? else {
        return Ok(None);
    };
    let Some(hash) = password_hash(pool, user.id).await? else {
        return Ok(None);
    };
    if !verify_password(password, &hash)? {
        tracing::info!(user_id = user.id, "failed login");
        return Ok(None);
    }

    // Expired tokens are dropped opportunistically on login.
    sqlx::query("DELETE FROM api_tokens WHERE user_id = ? AND expires_at <= ?")
        .bind(user.id)
        .bind(now_ts())
        .execute(pool)
        .await?;

    let token = issue_token(pool, user.id, ttl_hours).await?;
    Ok(Some((token, user)))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ============ Extractors ============

/// Any authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    token_hash: String,
}

impl AuthUser {
    /// Revoke the token this request was made with.
    pub async fn revoke(&self, pool: &SqlitePool) -> Result<()> {
        revoke_token_hash(pool, &self.token_hash).await
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthenticated)?;
        let token_hash = hash_token(token);
        let user = user_for_token_hash(&state.pool, &token_hash)
            .await?
            .ok_or(ApiError::Unauthenticated)?;
        Ok(AuthUser { user, token_hash })
    }
}

macro_rules! role_extractor {
    ($(#[$meta:meta])* $name:ident, $role:expr, $message:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub User);

        impl FromRequestParts<AppState> for $name {
            type Rejection = ApiError;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &AppState,
            ) -> Result<Self, ApiError> {
                let AuthUser { user, .. } = AuthUser::from_request_parts(parts, state).await?;
                if user.role != $role {
                    return Err(ApiError::forbidden($message));
                }
                Ok($name(user))
            }
        }
    };
}

role_extractor!(
    /// Caller with the `student` role.
    StudentUser,
    Role::Student,
    "Unauthorized. Student access required."
);
role_extractor!(
    /// Caller with the `teacher` role.
    TeacherUser,
    Role::Teacher,
    "Unauthorized. Teacher access required."
);
role_extractor!(
    /// Caller with the `admin` role.
    AdminUser,
    Role::Admin,
    "Unauthorized. Admin access required."
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::memory_pool;
    use crate::users::seed_default_users;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse-battery-staple", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
        assert!(verify_password("x", "not-a-valid-hash").is_err());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));
        headers.insert("authorization", "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_tokens_are_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_token(&a).len(), 64);
    }

    #[tokio::test]
    async fn test_login_issue_resolve_revoke() {
        let pool = memory_pool().await;
        seed_default_users(&pool).await.unwrap();

        assert!(login(&pool, "student@edunexus.com", "nope", 1)
            .await
            .unwrap()
            .is_none());
        assert!(login(&pool, "ghost@edunexus.com", "password", 1)
            .await
            .unwrap()
            .is_none());

        let (token, user) = login(&pool, "Student@EduNexus.com", "password", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role, Role::Student);

        let resolved = resolve_token(&pool, &token).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        revoke_token_hash(&pool, &hash_token(&token)).await.unwrap();
        assert!(resolve_token(&pool, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        let token = issue_token(&pool, users[0].id, 0).await.unwrap();
        assert!(resolve_token(&pool, &token).await.unwrap().is_none());
    }
}
