//! API layer - HTTP handlers and routing
//!
//! Controllers are mounted below `/api/{Name}` with a lowercase alias:
//! - Blogg, BloggImage, Comment, Likes
//! - ForbiddenWord, AboutMe, ContactMe
//! - User, Role
//!
//! plus `/api/auth`, `/api/users`, `/api/editor`, the health probes and,
//! in development, `/media`.

pub mod auth;
pub mod bloggs;
pub mod comments;
pub mod common;
pub mod content;
pub mod images;
pub mod likes;
pub mod media;
pub mod middleware;
pub mod roles;
pub mod users;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use common::{controller, MAX_REQUEST_BODY_BYTES};
pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the `/api` routes
pub fn build_api_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest("/api/auth", auth::router(state))
        .nest("/api/users", users::alias_router(state))
        .nest("/api/editor", images::editor_router(state))
        .merge(controller("Blogg", bloggs::router(state)))
        .merge(controller("BloggImage", images::router(state)))
        .merge(controller("Comment", comments::router(state)))
        .merge(controller("Likes", likes::router(state)))
        .merge(controller("ForbiddenWord", content::forbidden_word_router(state)))
        .merge(controller("AboutMe", content::about_me_router(state)))
        .merge(controller("ContactMe", content::contact_me_router(state)))
        .merge(controller("User", users::router(state)))
        .merge(controller("Role", roles::router(state)))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .allowed_origins()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();
    tracing::info!("CORS origins: {:?}", origins);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/db", get(health_db))
        .route("/media/{*path}", get(media::serve_media))
        .merge(build_api_router(&state))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "SarasBloggAPI is running"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn health_db(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.pool.ping().await.map_err(|e| {
        tracing::error!("Database health check failed: {:#}", e);
        ApiError::internal_error("Database unavailable.")
    })?;
    Ok("DB OK")
}
