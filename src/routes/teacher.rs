//! Teacher endpoints: own content, tags, dashboard and analytics.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use sqlx::SqlitePool;
use std::collections::HashMap;

use super::content::find_item;
use super::{Data, Fields, Message};
use crate::auth::TeacherUser;
use crate::content::{
    create_content, delete_content, list_content, update_content, validate_content_patch,
    validate_new_content, ContentFilter, ContentPatch,
};
use crate::dashboard::{teacher_analytics, teacher_dashboard, TeacherAnalytics, TeacherDashboard};
use crate::error::ApiError;
use crate::models::{ContentItem, ContentItemResource, ContentTag, User};
use crate::pagination::Page;
use crate::server::AppState;
use crate::tags::{create_tag, list_tags, validate_new_tag};
use crate::uploads::{self, PendingUpload};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(handle_dashboard))
        .route("/analytics", get(handle_analytics))
        .route("/content", get(handle_list).post(handle_create))
        .route("/content/{id}", put(handle_update).delete(handle_delete))
        .route("/tags", get(handle_list_tags).post(handle_create_tag))
}

async fn handle_dashboard(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
) -> Result<Json<Data<TeacherDashboard>>, ApiError> {
    Ok(Json(Data::new(teacher_dashboard(&state.pool, user.id).await?)))
}

async fn handle_analytics(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
) -> Result<Json<Data<TeacherAnalytics>>, ApiError> {
    Ok(Json(Data::new(teacher_analytics(&state.pool, user.id).await?)))
}

// ============ Content ============

async fn handle_list(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<ContentItemResource>>, ApiError> {
    let (mut filter, page) = ContentFilter::from_query(&params, false)?;
    filter.created_by = Some(user.id);
    let items = list_content(&state.pool, &filter, page).await?;
    Ok(Json(items.map(|item| ContentItemResource::from(&item))))
}

/// The item, if `user` created it.
async fn owned_item(state: &AppState, user: &User, id: i64) -> Result<ContentItem, ApiError> {
    let item = find_item(state, id).await?;
    if item.created_by != Some(user.id) {
        return Err(ApiError::forbidden(
            "Unauthorized. You can only modify your own content.",
        ));
    }
    Ok(item)
}

async fn handle_create(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
    body: Fields,
) -> Result<(StatusCode, Json<Message<ContentItemResource>>), ApiError> {
    let storage = &state.config.storage;
    let new = validate_new_content(
        &state.pool,
        body.fields,
        body.upload.as_ref(),
        storage.max_upload_bytes,
    )
    .await?;

    let file_path = match (&new.upload_ext, &body.upload) {
        (Some(ext), Some(upload)) => {
            Some(uploads::store(&storage.upload_dir, ext, &upload.bytes).await?)
        }
        _ => None,
    };

    let item = match create_content(&state.pool, &new, user.id, file_path.as_deref()).await {
        Ok(item) => item,
        Err(e) => {
            if let Some(path) = &file_path {
                uploads::remove(&storage.upload_dir, path).await?;
            }
            return Err(e.into());
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(Message::with(
            "Content item created successfully!",
            ContentItemResource::from(&item),
        )),
    ))
}

async fn handle_update(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
    Path(id): Path<i64>,
    body: Fields,
) -> Result<Json<Message<ContentItemResource>>, ApiError> {
    let existing = owned_item(&state, &user, id).await?;
    let storage = &state.config.storage;
    let mut patch = validate_content_patch(
        &state.pool,
        &existing,
        body.fields,
        body.upload.as_ref(),
        storage.max_upload_bytes,
    )
    .await?;

    let item = apply_patch(
        &state.pool,
        &storage.upload_dir,
        id,
        &mut patch,
        body.upload.as_ref(),
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Content item not found."))?;

    // The new file is in place; drop the one it replaced.
    if let (Some(_), Some(old)) = (&patch.file_path, &existing.file_path) {
        uploads::remove(&storage.upload_dir, old).await?;
    }

    tracing::info!(content_id = id, user_id = user.id, "updated content item");
    Ok(Json(Message::with(
        "Content item updated successfully!",
        ContentItemResource::from(&item),
    )))
}

/// Store the patch's new file, then update the row. The stored file is
/// removed again if the update fails or the row is gone.
async fn apply_patch(
    pool: &SqlitePool,
    upload_dir: &std::path::Path,
    id: i64,
    patch: &mut ContentPatch,
    upload: Option<&PendingUpload>,
) -> anyhow::Result<Option<ContentItem>> {
    if let (Some(ext), Some(upload)) = (&patch.upload_ext, upload) {
        patch.file_path = Some(uploads::store(upload_dir, ext, &upload.bytes).await?);
    }

    let result = update_content(pool, id, patch).await;
    if !matches!(result, Ok(Some(_))) {
        if let Some(path) = &patch.file_path {
            uploads::remove(upload_dir, path).await?;
        }
    }
    result
}

async fn handle_delete(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
    Path(id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    owned_item(&state, &user, id).await?;
    remove_content(&state, id).await?;
    Ok(Json(Message::text("Content item deleted successfully!")))
}

/// Delete an item together with its stored file.
pub(crate) async fn remove_content(state: &AppState, id: i64) -> Result<(), ApiError> {
    let item = delete_content(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Content item not found."))?;
    if let Some(path) = &item.file_path {
        uploads::remove(&state.config.storage.upload_dir, path).await?;
    }
    Ok(())
}

// ============ Tags ============

async fn handle_list_tags(
    State(state): State<AppState>,
    _teacher: TeacherUser,
) -> Result<Json<Data<Vec<ContentTag>>>, ApiError> {
    Ok(Json(Data::new(list_tags(&state.pool).await?)))
}

async fn handle_create_tag(
    State(state): State<AppState>,
    _teacher: TeacherUser,
    body: Fields,
) -> Result<(StatusCode, Json<Message<ContentTag>>), ApiError> {
    let name = validate_new_tag(&state.pool, body.into_value()).await?;
    let tag = create_tag(&state.pool, &name).await?;
    Ok((
        StatusCode::CREATED,
        Json(Message::with("Tag created successfully!", tag)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{create_content, NewContent};
    use crate::migrate::memory_pool;
    use crate::models::{ContentType, Difficulty};
    use crate::users::seed_default_users;

    fn pdf(size: usize) -> PendingUpload {
        PendingUpload {
            file_name: "notes.pdf".into(),
            bytes: vec![1u8; size],
        }
    }

    fn stored_files(upload_dir: &std::path::Path) -> Vec<String> {
        match std::fs::read_dir(upload_dir.join("content")) {
            Ok(entries) => entries
                .map(|e| format!("content/{}", e.unwrap().file_name().to_string_lossy()))
                .collect(),
            Err(_) => vec![],
        }
    }

    #[tokio::test]
    async fn test_patch_for_missing_row_leaves_no_file() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let mut patch = ContentPatch {
            content_type: Some(ContentType::Pdf),
            upload_ext: Some("pdf".into()),
            ..Default::default()
        };

        let item = apply_patch(&pool, dir.path(), 999, &mut patch, Some(&pdf(16)))
            .await
            .unwrap();
        assert!(item.is_none());
        assert!(stored_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_patch_keeps_new_file_on_success() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let new = NewContent {
            title: "Cells".into(),
            description: None,
            content_type: ContentType::Link,
            url: Some("https://example.com/cells".into()),
            subject: "Science".into(),
            difficulty: Difficulty::Beginner,
            tag_ids: vec![],
            upload_ext: None,
        };
        let existing = create_content(&pool, &new, users[2].id, None).await.unwrap();
        let mut patch = ContentPatch {
            content_type: Some(ContentType::Pdf),
            upload_ext: Some("pdf".into()),
            ..Default::default()
        };

        let item = apply_patch(&pool, dir.path(), existing.id, &mut patch, Some(&pdf(16)))
            .await
            .unwrap()
            .unwrap();
        let files = stored_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(item.file_path.as_deref(), Some(files[0].as_str()));
    }
}
