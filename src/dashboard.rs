//! Per-role dashboard aggregates.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::ai::GenerativeClient;
use crate::content::get_content_many;
use crate::db::now_ts;
use crate::interactions::counts_for_creator;
use crate::models::{ContentItemResource, ContentType, Difficulty};
use crate::recommend::recommend;

const RECENT_WINDOW_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectCount {
    pub subject: String,
    pub count: i64,
}

async fn subject_counts(pool: &SqlitePool, creator_id: Option<i64>) -> Result<Vec<SubjectCount>> {
    let rows = match creator_id {
        Some(id) => {
            sqlx::query(
                "SELECT subject, COUNT(*) AS count FROM content_items \
                 WHERE created_by = ? AND subject <> '' \
                 GROUP BY subject ORDER BY count DESC, subject ASC LIMIT 3",
            )
            .bind(id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT subject, COUNT(*) AS count FROM content_items \
                 GROUP BY subject ORDER BY count DESC, subject ASC LIMIT 3",
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows
        .iter()
        .map(|row| SubjectCount {
            subject: row.get("subject"),
            count: row.get("count"),
        })
        .collect())
}

// ============ Student ============

/// Compact recommendation card.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendedCard {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub subject: String,
    pub difficulty: Difficulty,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub tags: Vec<String>,
    pub creator: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDashboard {
    pub subject_counts: Vec<SubjectCount>,
    pub recommended_content: Vec<RecommendedCard>,
}

pub async fn student_dashboard(
    pool: &SqlitePool,
    ai: &dyn GenerativeClient,
    user_id: i64,
) -> Result<StudentDashboard> {
    let recs = recommend(pool, ai, user_id).await?;
    let recommended_content = recs
        .into_iter()
        .take(3)
        .map(|rec| {
            let item = rec.item;
            RecommendedCard {
                tags: item.tag_names(),
                creator: item
                    .creator
                    .as_ref()
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                id: item.id,
                title: item.title,
                description: item.description,
                subject: item.subject,
                difficulty: item.difficulty,
                content_type: item.content_type,
            }
        })
        .collect();

    Ok(StudentDashboard {
        subject_counts: subject_counts(pool, None).await?,
        recommended_content,
    })
}

// ============ Teacher ============

#[derive(Debug, Clone, Serialize)]
pub struct TeacherDashboard {
    pub subject_counts: Vec<SubjectCount>,
    pub total_content: i64,
    pub total_views: i64,
    pub total_saves: i64,
    pub total_completions: i64,
}

async fn count_created_by(pool: &SqlitePool, creator_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM content_items WHERE created_by = ?")
        .bind(creator_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn teacher_dashboard(pool: &SqlitePool, teacher_id: i64) -> Result<TeacherDashboard> {
    let counts = counts_for_creator(pool, teacher_id).await?;
    let dashboard = TeacherDashboard {
        subject_counts: subject_counts(pool, Some(teacher_id)).await?,
        total_content: count_created_by(pool, teacher_id).await?,
        total_views: counts.views,
        total_saves: counts.saves,
        total_completions: counts.completions,
    };
    tracing::debug!(
        user_id = teacher_id,
        total_content = dashboard.total_content,
        "teacher dashboard"
    );
    Ok(dashboard)
}

#[derive(Debug, Clone, Serialize)]
pub struct TopContent {
    pub item: ContentItemResource,
    pub views: i64,
    pub saves: i64,
    pub completions: i64,
    pub total_interactions: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherAnalytics {
    pub total_content: i64,
    pub total_views: i64,
    pub total_saves: i64,
    pub total_completions: i64,
    pub top_content: Vec<TopContent>,
}

pub async fn teacher_analytics(pool: &SqlitePool, teacher_id: i64) -> Result<TeacherAnalytics> {
    let counts = counts_for_creator(pool, teacher_id).await?;

    let rows = sqlx::query(
        r#"
        SELECT c.id,
            COALESCE(SUM(CASE WHEN i.action_type = 'viewed' THEN 1 ELSE 0 END), 0) AS views,
            COALESCE(SUM(CASE WHEN i.action_type = 'saved' THEN 1 ELSE 0 END), 0) AS saves,
            COALESCE(SUM(CASE WHEN i.action_type = 'completed' THEN 1 ELSE 0 END), 0) AS completions
        FROM content_items c
        LEFT JOIN user_content_interactions i ON i.content_item_id = c.id
        WHERE c.created_by = ?
        GROUP BY c.id
        ORDER BY views DESC, saves DESC, c.id ASC
        LIMIT 10
        "#,
    )
    .bind(teacher_id)
    .fetch_all(pool)
    .await?;

    let stats: Vec<(i64, i64, i64, i64)> = rows
        .iter()
        .map(|r| (r.get("id"), r.get("views"), r.get("saves"), r.get("completions")))
        .collect();
    let ids: Vec<i64> = stats.iter().map(|s| s.0).collect();
    let items = get_content_many(pool, &ids).await?;

    let top_content = items
        .iter()
        .zip(stats)
        .map(|(item, (_, views, saves, completions))| TopContent {
            item: ContentItemResource::from(item),
            views,
            saves,
            completions,
            total_interactions: views + saves + completions,
        })
        .collect();

    Ok(TeacherAnalytics {
        total_content: count_created_by(pool, teacher_id).await?,
        total_views: counts.views,
        total_saves: counts.saves,
        total_completions: counts.completions,
        top_content,
    })
}

// ============ Admin ============

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub total_users: i64,
    pub total_students: i64,
    pub total_teachers: i64,
    pub total_admins: i64,
    pub total_content: i64,
    pub recent_users: i64,
    pub recent_content: i64,
    pub content_by_type: BTreeMap<String, i64>,
    pub users_by_role: BTreeMap<String, i64>,
}

async fn grouped_counts(pool: &SqlitePool, sql: &str) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

pub async fn admin_dashboard(pool: &SqlitePool) -> Result<AdminDashboard> {
    let since = now_ts() - RECENT_WINDOW_SECS;

    let users_by_role =
        grouped_counts(pool, "SELECT role, COUNT(*) FROM users GROUP BY role").await?;
    let content_by_type =
        grouped_counts(pool, "SELECT type, COUNT(*) FROM content_items GROUP BY type").await?;

    let recent_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE created_at >= ?")
        .bind(since)
        .fetch_one(pool)
        .await?;
    let recent_content: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM content_items WHERE created_at >= ?")
            .bind(since)
            .fetch_one(pool)
            .await?;

    let role_count = |role: &str| users_by_role.get(role).copied().unwrap_or(0);
    Ok(AdminDashboard {
        total_users: users_by_role.values().sum(),
        total_students: role_count("student"),
        total_teachers: role_count("teacher"),
        total_admins: role_count("admin"),
        total_content: content_by_type.values().sum(),
        recent_users,
        recent_content,
        content_by_type,
        users_by_role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::DisabledClient;
    use crate::content::{create_content, NewContent};
    use crate::interactions::record;
    use crate::migrate::memory_pool;
    use crate::models::ActionType;
    use crate::users::seed_default_users;

    fn new_item(title: &str, subject: &str, ct: ContentType) -> NewContent {
        NewContent {
            title: title.into(),
            description: None,
            content_type: ct,
            url: Some("https://example.com".into()),
            subject: subject.into(),
            difficulty: Difficulty::Beginner,
            tag_ids: vec![],
            upload_ext: None,
        }
    }

    #[tokio::test]
    async fn test_teacher_numbers() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        let (admin, student, teacher) = (&users[0], &users[1], &users[2]);

        let a = create_content(&pool, &new_item("A", "Science", ContentType::Link), teacher.id, None).await.unwrap();
        let b = create_content(&pool, &new_item("B", "Science", ContentType::Quiz), teacher.id, None).await.unwrap();
        create_content(&pool, &new_item("C", "Art", ContentType::Link), teacher.id, None).await.unwrap();
        create_content(&pool, &new_item("D", "History", ContentType::Link), admin.id, None).await.unwrap();

        record(&pool, student.id, b.id, ActionType::Viewed).await.unwrap();
        record(&pool, admin.id, b.id, ActionType::Viewed).await.unwrap();
        record(&pool, student.id, a.id, ActionType::Viewed).await.unwrap();
        record(&pool, student.id, a.id, ActionType::Saved).await.unwrap();
        record(&pool, student.id, a.id, ActionType::Completed).await.unwrap();

        let dash = teacher_dashboard(&pool, teacher.id).await.unwrap();
        assert_eq!(dash.total_content, 3);
        assert_eq!((dash.total_views, dash.total_saves, dash.total_completions), (3, 1, 1));
        assert_eq!(
            dash.subject_counts,
            vec![
                SubjectCount { subject: "Science".into(), count: 2 },
                SubjectCount { subject: "Art".into(), count: 1 },
            ]
        );

        let analytics = teacher_analytics(&pool, teacher.id).await.unwrap();
        assert_eq!(analytics.top_content.len(), 3);
        assert_eq!(analytics.top_content[0].item.id, b.id);
        assert_eq!(analytics.top_content[1].item.id, a.id);
        assert_eq!(analytics.top_content[1].total_interactions, 3);
        assert_eq!(analytics.top_content[2].views, 0);
    }

    #[tokio::test]
    async fn test_admin_counts() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        create_content(&pool, &new_item("A", "Science", ContentType::Link), users[2].id, None).await.unwrap();
        create_content(&pool, &new_item("B", "Science", ContentType::Video), users[2].id, None).await.unwrap();

        let dash = admin_dashboard(&pool).await.unwrap();
        assert_eq!(dash.total_users, 3);
        assert_eq!((dash.total_students, dash.total_teachers, dash.total_admins), (1, 1, 1));
        assert_eq!(dash.total_content, 2);
        assert_eq!(dash.recent_users, 3);
        assert_eq!(dash.recent_content, 2);
        assert_eq!(dash.content_by_type.get("video"), Some(&1));
        assert_eq!(dash.users_by_role.get("student"), Some(&1));
    }

    #[tokio::test]
    async fn test_student_dashboard_cards() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        for i in 0..5 {
            create_content(&pool, &new_item(&format!("Item {i}"), "Science", ContentType::Link), users[2].id, None)
                .await
                .unwrap();
        }
        let dash = student_dashboard(&pool, &DisabledClient, users[1].id).await.unwrap();
        assert_eq!(dash.recommended_content.len(), 3);
        assert_eq!(dash.recommended_content[0].creator, "Teacher User");
        assert_eq!(dash.subject_counts, vec![SubjectCount { subject: "Science".into(), count: 5 }]);
    }
}
