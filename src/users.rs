//! User accounts: lookup, admin CRUD and the default seed accounts.

use anyhow::Result;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::auth::hash_password;
use crate::db::now_ts;
use crate::error::ApiError;
use crate::models::{parse_column, Role, User};
use crate::pagination::{Page, PageMeta, PageRequest};
use crate::validate::Input;

/// Column list matching [`user_from_row`].
pub const USER_COLUMNS: &str =
    "u.id, u.name, u.email, u.role, u.google_id, u.avatar, u.email_verified_at, u.created_at, u.updated_at";

pub fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: parse_column(&role)?,
        google_id: row.get("google_id"),
        avatar: row.get("avatar"),
        email_verified_at: row.get("email_verified_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub async fn find_user(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users u WHERE u.id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users u WHERE u.email = ?",
        USER_COLUMNS
    ))
    .bind(email.to_lowercase())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Stored password hash, if the account has one (OAuth-only accounts do not).
pub async fn password_hash(pool: &SqlitePool, user_id: i64) -> Result<Option<String>> {
    let hash: Option<Option<String>> =
        sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(hash.flatten())
}

async fn email_taken(pool: &SqlitePool, email: &str, except: Option<i64>) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ? AND id != COALESCE(?, -1)")
            .bind(email)
            .bind(except)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

// ============ Create / update ============

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

/// Validate an admin "create user" body.
pub async fn validate_new_user(pool: &SqlitePool, body: Value) -> Result<NewUser, ApiError> {
    let mut input = Input::from_value(body);
    let name = input.required_str("name", 255);
    let email = input.required_email("email", 255);
    let password = input
        .required_str("password", usize::MAX)
        .filter(|p| input.min_len("password", p, 8));
    let role = input.required_enum::<Role>("role");

    if let Some(email) = &email {
        if email_taken(pool, email, None).await? {
            input.error("email", "The email has already been taken.");
        }
    }

    match (name, email, password, role) {
        (Some(name), Some(email), Some(password), Some(role)) if input.errors().is_empty() => {
            Ok(NewUser {
                name,
                email,
                password,
                role,
            })
        }
        _ => Err(ApiError::Validation(input.into_errors())),
    }
}

/// Validate an admin "update user" body. Only fields that are present are
/// checked; a null or blank password leaves the stored one unchanged.
pub async fn validate_user_patch(
    pool: &SqlitePool,
    user_id: i64,
    body: Value,
) -> Result<UserPatch, ApiError> {
    let mut input = Input::from_value(body);
    let mut patch = UserPatch::default();

    if input.has("name") {
        patch.name = input.required_str("name", 255);
    }
    if input.has("email") {
        patch.email = input.required_email("email", 255);
        if let Some(email) = &patch.email {
            if email_taken(pool, email, Some(user_id)).await? {
                input.error("email", "The email has already been taken.");
            }
        }
    }
    if input.filled("password") {
        patch.password = input
            .optional_str("password", usize::MAX)
            .filter(|p| input.min_len("password", p, 8));
    }
    if input.has("role") {
        patch.role = input.required_enum::<Role>("role");
    }

    input.finish()?;
    Ok(patch)
}

/// Insert a verified account.
pub async fn create_user(pool: &SqlitePool, new: &NewUser) -> Result<User> {
    let now = now_ts();
    let hash = hash_password(&new.password)?;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (name, email, password_hash, role, email_verified_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&new.name)
    .bind(new.email.to_lowercase())
    .bind(&hash)
    .bind(new.role.as_str())
    .bind(now)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    tracing::info!(user_id = id, role = %new.role, "created user");
    find_user(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))
}

pub async fn update_user(pool: &SqlitePool, id: i64, patch: &UserPatch) -> Result<Option<User>> {
    let hash = patch.password.as_deref().map(hash_password).transpose()?;
    let result = sqlx::query(
        r#"
        UPDATE users SET
            name = COALESCE(?, name),
            email = COALESCE(?, email),
            password_hash = COALESCE(?, password_hash),
            role = COALESCE(?, role),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(patch.name.as_deref())
    .bind(patch.email.as_deref())
    .bind(hash.as_deref())
    .bind(patch.role.map(|r| r.as_str()))
    .bind(now_ts())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_user(pool, id).await
}

pub async fn delete_user(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============ Listing ============

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<Role>,
}

fn push_user_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a UserFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (u.name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(role) = filter.role {
        qb.push(" AND u.role = ").push_bind(role.as_str());
    }
}

/// Newest accounts first.
pub async fn list_users(
    pool: &SqlitePool,
    filter: &UserFilter,
    page: PageRequest,
) -> Result<Page<User>> {
    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users u");
    push_user_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM users u", USER_COLUMNS));
    push_user_filters(&mut qb, filter);
    qb.push(" ORDER BY u.created_at DESC, u.id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = qb.build().fetch_all(pool).await?;
    let data = rows.iter().map(user_from_row).collect::<Result<Vec<_>>>()?;

    Ok(Page {
        data,
        meta: PageMeta::new(page, total),
    })
}

// ============ Seeding ============

/// Fixed accounts created by `edunexus seed`. All share the password
/// `password` and should be changed after first login.
pub const SEED_ACCOUNTS: &[(&str, &str, Role)] = &[
    ("Admin User", "admin@edunexus.com", Role::Admin),
    ("Student User", "student@edunexus.com", Role::Student),
    ("Teacher User", "teacher@edunexus.com", Role::Teacher),
];

pub const SEED_PASSWORD: &str = "password";

/// Create or reset the seed accounts.
pub async fn seed_default_users(pool: &SqlitePool) -> Result<Vec<User>> {
    let mut users = Vec::with_capacity(SEED_ACCOUNTS.len());
    for (name, email, role) in SEED_ACCOUNTS {
        let hash = hash_password(SEED_PASSWORD)?;
        let now = now_ts();
        sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, role, email_verified_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                name = excluded.name,
                password_hash = excluded.password_hash,
                role = excluded.role,
                email_verified_at = excluded.email_verified_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(&hash)
        .bind(role.as_str())
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        if let Some(user) = find_user_by_email(pool, email).await? {
            users.push(user);
        }
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::memory_pool as test_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let pool = test_pool().await;
        let first = seed_default_users(&pool).await.unwrap();
        let second = seed_default_users(&pool).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].role, Role::Admin);
        assert!(second[0].email_verified_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails_validation() {
        let pool = test_pool().await;
        seed_default_users(&pool).await.unwrap();

        let err = validate_new_user(
            &pool,
            json!({
                "name": "Another Admin",
                "email": "ADMIN@edunexus.com",
                "password": "longenough",
                "role": "admin"
            }),
        )
        .await
        .unwrap_err();

        match err {
            ApiError::Validation(errors) => {
                assert_eq!(
                    errors.get("email").unwrap()[0],
                    "The email has already been taken."
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_validation_messages() {
        let pool = test_pool().await;
        let err = validate_new_user(&pool, json!({ "password": "short", "role": "owner" }))
            .await
            .unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("name").unwrap()[0], "The name field is required.");
        assert_eq!(
            errors.get("password").unwrap()[0],
            "The password field must be at least 8 characters."
        );
        assert_eq!(errors.get("role").unwrap()[0], "The selected role is invalid.");
    }

    #[tokio::test]
    async fn test_patch_ignores_own_email_and_blank_password() {
        let pool = test_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        let student = &users[1];

        let patch = validate_user_patch(
            &pool,
            student.id,
            json!({ "email": "student@edunexus.com", "password": null, "name": "Renamed" }),
        )
        .await
        .unwrap();
        assert!(patch.password.is_none());

        let before = password_hash(&pool, student.id).await.unwrap();
        let updated = update_user(&pool, student.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(password_hash(&pool, student.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_list_filters_by_role_and_search() {
        let pool = test_pool().await;
        seed_default_users(&pool).await.unwrap();

        let filter = UserFilter {
            search: None,
            role: Some(Role::Teacher),
        };
        let page = list_users(&pool, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.meta.total, 1);
        assert_eq!(page.data[0].email, "teacher@edunexus.com");

        let filter = UserFilter {
            search: Some("edunexus".to_string()),
            role: None,
        };
        let page = list_users(&pool, &filter, PageRequest::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.meta.total, 3);
        assert_eq!(page.meta.last_page, 2);
        assert_eq!(page.data.len(), 2);
    }
}
