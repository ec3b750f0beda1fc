//! HTTP server.
//!
//! Exposes the EduNexus JSON API under `/api`, serves uploaded files from the
//! storage directory at `/storage`, and answers `GET /health`.
//!
//! # Endpoints
//!
//! | Prefix | Caller | Module |
//! |--------|--------|--------|
//! | `/api/auth` | anyone / authenticated | [`crate::routes::auth`] |
//! | `/api/content`, `/api/assistant` | authenticated | [`crate::routes::content`], [`crate::routes::assistant`] |
//! | `/api/student` | students | [`crate::routes::student`] |
//! | `/api/teacher` | teachers | [`crate::routes::teacher`] |
//! | `/api/admin` | admins | [`crate::routes::admin`] |
//!
//! # Error Contract
//!
//! Errors are rendered by [`crate::error::ApiError`]:
//!
//! ```json
//! { "message": "The title field is required.", "errors": { "title": ["The title field is required."] } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a separately hosted
//! frontend can call the API.

use axum::{extract::DefaultBodyLimit, routing::get, Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::ai::{create_client, GenerativeClient};
use crate::config::Config;
use crate::{db, migrate, routes};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    /// Generative client selected by `[ai].provider`.
    pub ai: Arc<dyn GenerativeClient>,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool, ai: Arc<dyn GenerativeClient>) -> Self {
        Self {
            config: Arc::new(config),
            pool,
            ai,
        }
    }
}

/// Build the full router for `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Room for the upload itself plus the other multipart fields.
    let body_limit = state.config.storage.max_upload_bytes + 1024 * 1024;
    let storage = ServeDir::new(&state.config.storage.upload_dir);

    Router::new()
        .nest("/api", routes::api_router())
        .route("/health", get(handle_health))
        .nest_service("/storage", storage)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Connects to the database, applies pending migrations, selects the AI client, binds to
/// `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let ai = create_client(&config.ai)?;
    tracing::info!(provider = ai.name(), has_api_key = ai.has_api_key(), "AI client ready");

    let bind_addr = config.server.bind.clone();
    let app = build_router(AppState::new(config.clone(), pool, ai));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("EduNexus listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
