//! Admin endpoints: platform stats, user management and content moderation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use std::collections::HashMap;

use super::teacher::remove_content;
use super::{Data, Fields, Message};
use crate::auth::AdminUser;
use crate::content::{list_content, ContentFilter};
use crate::dashboard::{admin_dashboard, AdminDashboard};
use crate::error::ApiError;
use crate::models::{ContentItemResource, Role, UserResource};
use crate::pagination::{Page, PageRequest};
use crate::server::AppState;
use crate::users::{
    create_user, delete_user, find_user, list_users, update_user, validate_new_user,
    validate_user_patch, UserFilter,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(handle_dashboard))
        .route("/users", get(handle_list_users).post(handle_create_user))
        .route(
            "/users/{id}",
            get(handle_show_user)
                .put(handle_update_user)
                .delete(handle_delete_user),
        )
        .route("/content", get(handle_list_content))
        .route("/content/{id}", delete(handle_delete_content))
}

async fn handle_dashboard(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Data<AdminDashboard>>, ApiError> {
    Ok(Json(Data::new(admin_dashboard(&state.pool).await?)))
}

// ============ Users ============

fn parse_int(params: &HashMap<String, String>, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.trim().parse().ok())
}

async fn handle_list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<UserResource>>, ApiError> {
    let role = match params.get("role").map(|r| r.trim()).filter(|r| !r.is_empty()) {
        Some(role) => Some(
            role.parse::<Role>()
                .map_err(|_| ApiError::invalid("role", "The selected role is invalid."))?,
        ),
        None => None,
    };
    let filter = UserFilter {
        search: params.get("search").map(|s| s.trim().to_string()),
        role,
    };
    let page = PageRequest::new(parse_int(&params, "page"), parse_int(&params, "per_page"));

    let users = list_users(&state.pool, &filter, page).await?;
    Ok(Json(users.map(|user| UserResource::from(&user))))
}

async fn handle_show_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Data<UserResource>>, ApiError> {
    let user = find_user(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;
    Ok(Json(Data::new(UserResource::from(&user))))
}

async fn handle_create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    body: Fields,
) -> Result<(StatusCode, Json<Message<UserResource>>), ApiError> {
    let new = validate_new_user(&state.pool, body.into_value()).await?;
    let user = create_user(&state.pool, &new).await?;
    Ok((
        StatusCode::CREATED,
        Json(Message::with(
            "User created successfully!",
            UserResource::from(&user),
        )),
    ))
}

async fn handle_update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    body: Fields,
) -> Result<Json<Message<UserResource>>, ApiError> {
    if find_user(&state.pool, id).await?.is_none() {
        return Err(ApiError::not_found("User not found."));
    }
    let patch = validate_user_patch(&state.pool, id, body.into_value()).await?;
    let user = update_user(&state.pool, id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;
    tracing::info!(user_id = id, "updated user");
    Ok(Json(Message::with(
        "User updated successfully!",
        UserResource::from(&user),
    )))
}

async fn handle_delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    if find_user(&state.pool, id).await?.is_none() {
        return Err(ApiError::not_found("User not found."));
    }
    if id == admin.id {
        return Err(ApiError::forbidden("You cannot delete your own account."));
    }
    delete_user(&state.pool, id).await?;
    tracing::info!(user_id = id, deleted_by = admin.id, "deleted user");
    Ok(Json(Message::text("User deleted successfully!")))
}

// ============ Content ============

async fn handle_list_content(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<ContentItemResource>>, ApiError> {
    let (filter, page) = ContentFilter::from_query(&params, true)?;
    let filter = ContentFilter {
        search: filter.search,
        content_type: filter.content_type,
        created_by: filter.created_by,
        ..Default::default()
    };
    let items = list_content(&state.pool, &filter, page).await?;
    Ok(Json(items.map(|item| ContentItemResource::from(&item))))
}

async fn handle_delete_content(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    remove_content(&state, id).await?;
    Ok(Json(Message::text("Content item deleted successfully!")))
}
