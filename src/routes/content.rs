//! Content endpoints open to every authenticated user.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;

use super::Data;
use crate::auth::AuthUser;
use crate::content::{get_content, list_content, ContentFilter};
use crate::error::ApiError;
use crate::interactions::record;
use crate::models::{ActionType, ContentItem, ContentItemResource, LearningPreference, Role, User};
use crate::pagination::Page;
use crate::preferences::find_preferences;
use crate::server::AppState;
use crate::summarize::{summarize_item, NO_SUMMARY};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/content", get(handle_list))
        .route("/content/{id}", get(handle_show))
        .route("/content/{id}/summary", get(handle_summary))
}

pub(crate) async fn find_item(state: &AppState, id: i64) -> Result<ContentItem, ApiError> {
    get_content(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Content item not found."))
}

/// Preferences used to tailor summaries; only students have them.
async fn summary_preferences(
    state: &AppState,
    user: &User,
) -> Result<Option<LearningPreference>, ApiError> {
    if user.role != Role::Student {
        return Ok(None);
    }
    Ok(find_preferences(&state.pool, user.id).await?)
}

async fn handle_list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<ContentItemResource>>, ApiError> {
    let (mut filter, page) = ContentFilter::from_query(&params, false)?;
    filter.created_by = None;
    let items = list_content(&state.pool, &filter, page).await?;
    Ok(Json(items.map(|item| ContentItemResource::from(&item))))
}

fn wants_summary(params: &HashMap<String, String>) -> bool {
    !matches!(
        params.get("include_summary").map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("false" | "0" | "off" | "no")
    )
}

async fn handle_show(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Data<ContentItemResource>>, ApiError> {
    let item = find_item(&state, id).await?;
    let mut resource = ContentItemResource::from(&item);

    if auth.user.role == Role::Student {
        record(&state.pool, auth.user.id, item.id, ActionType::Viewed).await?;
        if wants_summary(&params) {
            let pref = summary_preferences(&state, &auth.user).await?;
            let summary = summarize_item(state.ai.as_ref(), &item, pref.as_ref()).await;
            resource = resource.with_summary(summary);
        }
    }

    Ok(Json(Data::new(resource)))
}

#[derive(Serialize)]
struct SummaryResponse {
    id: i64,
    summary: String,
}

async fn handle_summary(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Data<SummaryResponse>>, ApiError> {
    let item = find_item(&state, id).await?;
    let pref = summary_preferences(&state, &auth.user).await?;
    let summary = summarize_item(state.ai.as_ref(), &item, pref.as_ref())
        .await
        .unwrap_or_else(|| NO_SUMMARY.to_string());

    Ok(Json(Data::new(SummaryResponse { id: item.id, summary })))
}
