//! Image endpoints
//!
//! - `/api/BloggImage`: the gallery of a post
//! - `/api/editor/upload-image`: images embedded in post bodies (TinyMCE upload contract)

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::UploadForm;
use crate::api::middleware::{protect, ApiError, AppState};
use crate::models::{BloggImage, ImageOrderEntry, Policy};
use crate::services::ImageServiceError;

impl From<ImageServiceError> for ApiError {
    fn from(err: ImageServiceError) -> Self {
        match err {
            ImageServiceError::BadRequest(m) => ApiError::validation_error(m),
            ImageServiceError::NotFound(m) => ApiError::not_found(m),
            ImageServiceError::Storage(e) => {
                tracing::error!("Image storage failed: {}", e);
                ApiError::internal_error(format!("Fel vid uppladdning: {}", e))
            }
            ImageServiceError::Internal(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorUploadQuery {
    pub blogg_id: Option<i64>,
}

/// TinyMCE expects `{ "location": url }`
#[derive(Debug, Serialize)]
pub struct EditorUploadResponse {
    pub location: String,
}

/// Build the `/api/BloggImage` router
pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new().route("/blogg/{blogg_id}", get(list_images));

    let admin = protect(
        Router::new()
            .route("/upload", post(upload_image))
            .route("/blogg/{blogg_id}/order", put(reorder_images))
            .route("/blogg/{blogg_id}", delete(delete_blogg_images))
            .route("/{id}", delete(delete_image)),
        state,
        Policy::AdminOrSuperadmin,
    );

    public.merge(admin)
}

/// Build the `/api/editor` router
pub fn editor_router(state: &AppState) -> Router<AppState> {
    protect(
        Router::new().route("/upload-image", post(editor_upload)),
        state,
        Policy::AdminOrSuperadmin,
    )
}

/// GET blogg/{bloggId} - ordered by sort order
async fn list_images(
    State(state): State<AppState>,
    Path(blogg_id): Path<i64>,
) -> Result<Json<Vec<BloggImage>>, ApiError> {
    Ok(Json(state.images.list_for_blogg(blogg_id).await?))
}

/// POST upload - multipart `file` and `bloggId`
async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = UploadForm::read(multipart, "file").await?;
    let file = form.take_file();
    if file.is_empty() {
        return Err(ApiError::validation_error("Ingen bild bifogad."));
    }
    let blogg_id = form
        .field("bloggId")
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| ApiError::validation_error("BloggId saknas."))?;

    let image = state.images.upload(blogg_id, file).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

async fn reorder_images(
    State(state): State<AppState>,
    Path(blogg_id): Path<i64>,
    Json(entries): Json<Vec<ImageOrderEntry>>,
) -> Result<StatusCode, ApiError> {
    state.images.reorder(blogg_id, &entries).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.images.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_blogg_images(
    State(state): State<AppState>,
    Path(blogg_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.images.delete_for_blogg(blogg_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/editor/upload-image?bloggId=
async fn editor_upload(
    State(state): State<AppState>,
    Query(query): Query<EditorUploadQuery>,
    multipart: Multipart,
) -> Result<Json<EditorUploadResponse>, ApiError> {
    let mut form = UploadForm::read(multipart, "file").await?;
    let location = state
        .images
        .editor_upload(form.take_file(), query.blogg_id)
        .await?;
    Ok(Json(EditorUploadResponse { location }))
}
