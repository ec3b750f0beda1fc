//! Content tags.

use anyhow::Result;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::db::{format_ts_iso, now_ts};
use crate::error::ApiError;
use crate::models::ContentTag;
use crate::validate::Input;

fn tag_from_row(row: &sqlx::sqlite::SqliteRow) -> ContentTag {
    ContentTag {
        id: row.get("id"),
        name: row.get("name"),
        created_at: format_ts_iso(row.get("created_at")),
        updated_at: format_ts_iso(row.get("updated_at")),
    }
}

pub async fn list_tags(pool: &SqlitePool) -> Result<Vec<ContentTag>> {
    let rows = sqlx::query("SELECT id, name, created_at, updated_at FROM content_tags ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(tag_from_row).collect())
}

/// Validate a create-tag body and return the trimmed name.
pub async fn validate_new_tag(pool: &SqlitePool, body: Value) -> Result<String, ApiError> {
    let mut input = Input::from_value(body);
    let name = input.required_str("name", 100);

    if let Some(name) = &name {
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_tags WHERE name = ?")
            .bind(name)
            .fetch_one(pool)
            .await?;
        if taken > 0 {
            input.error("name", "The name has already been taken.");
        }
    }

    match name {
        Some(name) if input.errors().is_empty() => Ok(name),
        _ => Err(ApiError::Validation(input.into_errors())),
    }
}

pub async fn create_tag(pool: &SqlitePool, name: &str) -> Result<ContentTag> {
    let now = now_ts();
    let row = sqlx::query(
        "INSERT INTO content_tags (name, created_at, updated_at) VALUES (?, ?, ?) \
         RETURNING id, name, created_at, updated_at",
    )
    .bind(name)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(tag_from_row(&row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::memory_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_is_sorted_by_name() {
        let pool = memory_pool().await;
        for name in ["physics", "algebra", "music"] {
            create_tag(&pool, name).await.unwrap();
        }
        let names: Vec<String> = list_tags(&pool).await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["algebra", "music", "physics"]);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let pool = memory_pool().await;
        create_tag(&pool, "algebra").await.unwrap();

        let err = validate_new_tag(&pool, json!({ "name": "algebra" })).await.unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("name").unwrap()[0], "The name has already been taken.");

        assert_eq!(
            validate_new_tag(&pool, json!({ "name": "  geometry " })).await.unwrap(),
            "geometry"
        );
        assert!(validate_new_tag(&pool, json!({ "name": "x".repeat(101) })).await.is_err());
    }
}
