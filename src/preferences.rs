//! Student learning preferences: one row per user, subjects stored as a JSON
//! array.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::{format_ts_iso, now_ts};
use crate::error::ApiError;
use crate::models::{parse_optional_column, Difficulty, LearningPreference, LearningStyle};
use crate::validate::Input;

const PREF_COLUMNS: &str =
    "id, user_id, grade_level, subjects, preferred_difficulty, learning_style, goals, created_at, updated_at";

fn pref_from_row(row: &SqliteRow) -> Result<LearningPreference> {
    let subjects: String = row.get("subjects");
    Ok(LearningPreference {
        id: row.get("id"),
        user_id: row.get("user_id"),
        grade_level: row.get("grade_level"),
        subjects: serde_json::from_str(&subjects).context("Invalid subjects column")?,
        preferred_difficulty: parse_optional_column(row.get("preferred_difficulty"))?,
        learning_style: parse_optional_column(row.get("learning_style"))?,
        goals: row.get("goals"),
        created_at: format_ts_iso(row.get("created_at")),
        updated_at: format_ts_iso(row.get("updated_at")),
    })
}

pub async fn find_preferences(pool: &SqlitePool, user_id: i64) -> Result<Option<LearningPreference>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM learning_preferences WHERE user_id = ?",
        PREF_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(pref_from_row).transpose()
}

/// Load preferences, creating an empty row on first access.
pub async fn get_or_create(pool: &SqlitePool, user_id: i64) -> Result<LearningPreference> {
    let now = now_ts();
    sqlx::query(
        "INSERT OR IGNORE INTO learning_preferences (user_id, subjects, created_at, updated_at) \
         VALUES (?, '[]', ?, ?)",
    )
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_preferences(pool, user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("preferences for user {} missing after insert", user_id))
}

/// Full replacement of a user's preferences. Absent fields clear the column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceUpdate {
    pub grade_level: Option<String>,
    pub subjects: Vec<String>,
    pub preferred_difficulty: Option<Difficulty>,
    pub learning_style: Option<LearningStyle>,
    pub goals: Option<String>,
}

pub fn validate_update(body: Value) -> Result<PreferenceUpdate, ApiError> {
    let mut input = Input::from_value(body);
    let update = PreferenceUpdate {
        grade_level: input.optional_str("grade_level", 50),
        subjects: input.str_list("subjects", 100),
        preferred_difficulty: input.optional_enum("preferred_difficulty"),
        learning_style: input.optional_enum("learning_style"),
        goals: input.optional_str("goals", 1000),
    };
    input.finish()?;
    Ok(update)
}

pub async fn update_preferences(
    pool: &SqlitePool,
    user_id: i64,
    update: &PreferenceUpdate,
) -> Result<LearningPreference> {
    let now = now_ts();
    sqlx::query(
        r#"
        INSERT INTO learning_preferences
            (user_id, grade_level, subjects, preferred_difficulty, learning_style, goals, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            grade_level = excluded.grade_level,
            subjects = excluded.subjects,
            preferred_difficulty = excluded.preferred_difficulty,
            learning_style = excluded.learning_style,
            goals = excluded.goals,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(update.grade_level.as_deref())
    .bind(serde_json::to_string(&update.subjects)?)
    .bind(update.preferred_difficulty.map(|d| d.as_str()))
    .bind(update.learning_style.map(|s| s.as_str()))
    .bind(update.goals.as_deref())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::debug!(user_id, "updated learning preferences");
    get_or_create(pool, user_id).await
}
