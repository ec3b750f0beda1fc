//! Student endpoints: dashboard, preferences, recommendations and saved items.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::content::find_item;
use super::{Data, Fields, Message};
use crate::auth::StudentUser;
use crate::dashboard::{student_dashboard, StudentDashboard};
use crate::error::ApiError;
use crate::interactions::record;
use crate::models::{resources, ActionType, ContentItemResource, LearningPreference};
use crate::preferences::{get_or_create, update_preferences, validate_update};
use crate::recommend::recommend;
use crate::saved::{list_saved, save, unsave};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(handle_dashboard))
        .route("/preferences", get(handle_show_preferences).put(handle_update_preferences))
        .route("/recommendations", get(handle_recommendations))
        .route("/saved", get(handle_list_saved))
        .route("/saved/{id}", post(handle_save).delete(handle_unsave))
        .route("/content/{id}/complete", post(handle_complete))
}

async fn handle_dashboard(
    State(state): State<AppState>,
    StudentUser(user): StudentUser,
) -> Result<Json<Data<StudentDashboard>>, ApiError> {
    let dashboard = student_dashboard(&state.pool, state.ai.as_ref(), user.id).await?;
    Ok(Json(Data::new(dashboard)))
}

// ============ Preferences ============

async fn handle_show_preferences(
    State(state): State<AppState>,
    StudentUser(user): StudentUser,
) -> Result<Json<Data<LearningPreference>>, ApiError> {
    Ok(Json(Data::new(get_or_create(&state.pool, user.id).await?)))
}

async fn handle_update_preferences(
    State(state): State<AppState>,
    StudentUser(user): StudentUser,
    body: Fields,
) -> Result<Json<Message<LearningPreference>>, ApiError> {
    let update = validate_update(body.into_value())?;
    let pref = update_preferences(&state.pool, user.id, &update).await?;
    tracing::info!(user_id = user.id, "updated learning preferences");
    Ok(Json(Message::with(
        "Learning preferences updated successfully.",
        pref,
    )))
}

// ============ Recommendations ============

#[derive(Serialize)]
struct RecommendationEntry {
    item: ContentItemResource,
    reason: String,
}

async fn handle_recommendations(
    State(state): State<AppState>,
    StudentUser(user): StudentUser,
) -> Response {
    match recommend(&state.pool, state.ai.as_ref(), user.id).await {
        Ok(recs) => {
            let data: Vec<RecommendationEntry> = recs
                .into_iter()
                .map(|rec| RecommendationEntry {
                    item: ContentItemResource::from(&rec.item),
                    reason: rec.reason,
                })
                .collect();
            Json(Data::new(data)).into_response()
        }
        Err(e) => {
            tracing::error!(user_id = user.id, error = %format!("{:#}", e), "Error fetching recommendations");
            let body = Message::with(
                "Failed to load recommendations. Please try again.",
                Vec::<RecommendationEntry>::new(),
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

// ============ Saved items ============

async fn handle_list_saved(
    State(state): State<AppState>,
    StudentUser(user): StudentUser,
) -> Result<Json<Data<Vec<ContentItemResource>>>, ApiError> {
    let items = list_saved(&state.pool, user.id).await?;
    Ok(Json(Data::new(resources(&items))))
}

async fn handle_save(
    State(state): State<AppState>,
    StudentUser(user): StudentUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let item = find_item(&state, id).await?;
    if !save(&state.pool, user.id, item.id).await? {
        return Ok((StatusCode::OK, Json(Message::text("Content already saved"))));
    }
    Ok((
        StatusCode::CREATED,
        Json(Message::text("Content saved successfully!")),
    ))
}

async fn handle_unsave(
    State(state): State<AppState>,
    StudentUser(user): StudentUser,
    Path(id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    if !unsave(&state.pool, user.id, id).await? {
        return Err(ApiError::not_found("Content not found in saved items"));
    }
    Ok(Json(Message::text("Content removed from saved items")))
}

async fn handle_complete(
    State(state): State<AppState>,
    StudentUser(user): StudentUser,
    Path(id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    let item = find_item(&state, id).await?;
    record(&state.pool, user.id, item.id, ActionType::Completed).await?;
    Ok(Json(Message::text("Content marked as completed.")))
}
