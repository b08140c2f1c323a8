//! Local media serving (`/media/{*path}`)
//!
//! Only mounted in development; production images come from GitHub.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::api::middleware::{ApiError, AppState};
use crate::services::storage::safe_join;

pub async fn serve_media(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    if !state.config.environment.is_development() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let base = &state.config.storage.local.base_path;
    let Some(file_path) = safe_join(base, path.trim_start_matches('/')) else {
        return ApiError::validation_error("Invalid path.").into_response();
    };

    match tokio::fs::read(&file_path).await {
        Ok(contents) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type(&path))
            .header(header::CACHE_CONTROL, "public, max-age=3600")
            .body(Body::from(contents))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
