//! Students' saved items.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::content::get_content_many;
use crate::db::now_ts;
use crate::interactions;
use crate::models::{ActionType, ContentItem};

/// Saved items, most recently saved first.
pub async fn list_saved(pool: &SqlitePool, user_id: i64) -> Result<Vec<ContentItem>> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT content_item_id FROM saved_contents WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    get_content_many(pool, &ids).await
}

/// Save an item. Returns `false` when it was already saved.
pub async fn save(pool: &SqlitePool, user_id: i64, content_id: i64) -> Result<bool> {
    let now = now_ts();
    let result = sqlx::query(
        "INSERT OR IGNORE INTO saved_contents (user_id, content_item_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(content_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }
    interactions::record(pool, user_id, content_id, ActionType::Saved).await?;
    Ok(true)
}

/// Remove a save. Returns `false` when the item was not saved.
pub async fn unsave(pool: &SqlitePool, user_id: i64, content_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM saved_contents WHERE user_id = ? AND content_item_id = ?")
        .bind(user_id)
        .bind(content_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
