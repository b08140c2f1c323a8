//! Blog post endpoints (`/api/Blogg`)
//!
//! Reads are public; writes need AdminOrSuperadmin.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{protect, ApiError, AppState};
use crate::models::{Blogg, BloggInput, Policy};
use crate::services::BloggServiceError;

impl From<BloggServiceError> for ApiError {
    fn from(err: BloggServiceError) -> Self {
        match err {
            BloggServiceError::BadRequest(m) => ApiError::validation_error(m),
            BloggServiceError::NotFound(id) => ApiError::not_found(format!("Blogg {id} not found")),
            BloggServiceError::Internal(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HiddenResponse {
    pub hidden: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedResponse {
    pub is_archived: bool,
}

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_bloggs))
        .route("/{id}", get(get_blogg));

    let admin = protect(
        Router::new()
            .route("/", axum::routing::post(create_blogg))
            .route("/{id}", axum::routing::put(update_blogg).delete(delete_blogg))
            .route("/{id}/hidden", patch(toggle_hidden))
            .route("/{id}/archived", patch(toggle_archived)),
        state,
        Policy::AdminOrSuperadmin,
    );

    public.merge(admin)
}

/// GET /api/Blogg - newest first
async fn list_bloggs(State(state): State<AppState>) -> Result<Json<Vec<Blogg>>, ApiError> {
    Ok(Json(state.bloggs.list().await?))
}

async fn get_blogg(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Blogg>, ApiError> {
    Ok(Json(state.bloggs.get(id).await?))
}

async fn create_blogg(
    State(state): State<AppState>,
    Json(body): Json<BloggInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.bloggs.create(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_blogg(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<BloggInput>,
) -> Result<StatusCode, ApiError> {
    state.bloggs.update(id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_hidden(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<HiddenResponse>, ApiError> {
    let hidden = state.bloggs.toggle_hidden(id).await?;
    Ok(Json(HiddenResponse { hidden }))
}

async fn toggle_archived(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ArchivedResponse>, ApiError> {
    let is_archived = state.bloggs.toggle_archived(id).await?;
    Ok(Json(ArchivedResponse { is_archived }))
}

async fn delete_blogg(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.bloggs.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
