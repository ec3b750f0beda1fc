//! Assistant endpoints: chat, history and clearing history.

use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::Serialize;

use super::{Data, Fields, Message};
use crate::assistant::{chat, clear_history, list_history, ExternalSuggestion};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{resources, ContentItemResource, ConversationMessageResource};
use crate::server::AppState;
use crate::validate::Input;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assistant/chat", post(handle_chat))
        .route(
            "/assistant/history",
            get(handle_history).delete(handle_clear_history),
        )
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    suggestions: Vec<ContentItemResource>,
    external_suggestions: Vec<ExternalSuggestion>,
}

async fn handle_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Fields,
) -> Result<Json<ChatResponse>, ApiError> {
    let mut input = Input::from_value(body.into_value());
    let message = input.required_str("message", 1000);
    let Some(message) = message else {
        return Err(ApiError::Validation(input.into_errors()));
    };

    let answer = chat(
        &state.pool,
        state.ai.as_ref(),
        &auth.user,
        &message,
        state.config.ai.history_pairs,
    )
    .await?;

    Ok(Json(ChatResponse {
        reply: answer.reply,
        suggestions: resources(&answer.suggestions),
        external_suggestions: answer.external_suggestions,
    }))
}

async fn handle_history(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Data<Vec<ConversationMessageResource>>>, ApiError> {
    let messages = list_history(&state.pool, auth.user.id).await?;
    Ok(Json(Data::new(
        messages.iter().map(ConversationMessageResource::from).collect(),
    )))
}

async fn handle_clear_history(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Message>, ApiError> {
    let removed = clear_history(&state.pool, auth.user.id).await?;
    tracing::info!(user_id = auth.user.id, removed, "cleared conversation history");
    Ok(Json(Message::text("Conversation history cleared successfully.")))
}
