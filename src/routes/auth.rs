use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::Serialize;

use super::{Data, Fields, Message};
use crate::auth::{login, AuthUser};
use crate::error::ApiError;
use crate::models::UserResource;
use crate::server::AppState;
use crate::validate::Input;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/me", get(handle_me))
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: UserResource,
}

async fn handle_login(
    State(state): State<AppState>,
    body: Fields,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut input = Input::from_value(body.into_value());
    let email = input.required_email("email", 255);
    let password = input.required_str("password", usize::MAX);
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::Validation(input.into_errors()));
    };

    let ttl = state.config.auth.token_ttl_hours;
    let Some((token, user)) = login(&state.pool, &email, &password, ttl).await? else {
        return Err(ApiError::invalid(
            "email",
            "The provided credentials are incorrect.",
        ));
    };

    tracing::info!(user_id = user.id, role = %user.role, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: UserResource::from(&user),
    }))
}

async fn handle_logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Message>, ApiError> {
    auth.revoke(&state.pool).await?;
    Ok(Json(Message::text("Logged out successfully.")))
}

async fn handle_me(auth: AuthUser) -> Json<Data<UserResource>> {
    Json(Data::new(UserResource::from(&auth.user)))
}
