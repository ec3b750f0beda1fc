//! Per-user interaction log (`viewed`, `saved`, `completed`).
//!
//! Each (user, item, action) is recorded at most once; repeating an action is
//! a no-op.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::db::now_ts;
use crate::models::ActionType;

pub async fn record(
    pool: &SqlitePool,
    user_id: i64,
    content_id: i64,
    action: ActionType,
) -> Result<()> {
    let now = now_ts();
    sqlx::query(
        "INSERT OR IGNORE INTO user_content_interactions \
         (user_id, content_item_id, action_type, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(content_id)
    .bind(action.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Ids of every item the user has interacted with in any way.
pub async fn interacted_ids(pool: &SqlitePool, user_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        "SELECT DISTINCT content_item_id FROM user_content_interactions WHERE user_id = ? \
         ORDER BY content_item_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Interaction counts per action over the items created by `creator_id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    pub views: i64,
    pub saves: i64,
    pub completions: i64,
}

pub async fn counts_for_creator(pool: &SqlitePool, creator_id: i64) -> Result<ActionCounts> {
    let row: (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN i.action_type = 'viewed' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN i.action_type = 'saved' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN i.action_type = 'completed' THEN 1 ELSE 0 END), 0)
        FROM user_content_interactions i
        JOIN content_items c ON c.id = i.content_item_id
        WHERE c.created_by = ?
        "#,
    )
    .bind(creator_id)
    .fetch_one(pool)
    .await?;
    Ok(ActionCounts {
        views: row.0,
        saves: row.1,
        completions: row.2,
    })
}
