//! Site content endpoints
//!
//! - `/api/AboutMe`: the about page and its image
//! - `/api/ContactMe`: contact form messages
//! - `/api/ForbiddenWord`: censored comment patterns

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;

use crate::api::common::UploadForm;
use crate::api::middleware::{protect, ApiError, AppState};
use crate::models::{AboutMe, ContactMe, ContactMeInput, ForbiddenWord, ForbiddenWordInput, Policy};
use crate::services::ContentServiceError;

impl From<ContentServiceError> for ApiError {
    fn from(err: ContentServiceError) -> Self {
        match err {
            ContentServiceError::BadRequest(m) => ApiError::validation_error(m),
            ContentServiceError::NotFound(m) => ApiError::not_found(m),
            ContentServiceError::Storage(e) => {
                tracing::error!("About image storage failed: {}", e);
                ApiError::internal_error(format!("Fel vid uppladdning: {}", e))
            }
            ContentServiceError::Internal(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUrlResponse {
    pub image_url: Option<String>,
}

/// Build the `/api/AboutMe` router
pub fn about_me_router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(get_about_me))
        .route("/image", get(get_about_image));

    let admin = protect(
        Router::new()
            .route("/", post(create_about_me))
            .route("/{id}", put(update_about_me).delete(delete_about_me))
            .route("/image", put(replace_about_image).delete(delete_about_image)),
        state,
        Policy::AdminOrSuperadmin,
    );

    public.merge(admin)
}

/// Build the `/api/ContactMe` router
pub fn contact_me_router(state: &AppState) -> Router<AppState> {
    let admin = protect(
        Router::new()
            .route("/", get(list_messages))
            .route("/{id}", delete(delete_message)),
        state,
        Policy::AdminOrSuperadmin,
    );

    Router::new().route("/", post(create_message)).merge(admin)
}

/// Build the `/api/ForbiddenWord` router
pub fn forbidden_word_router(state: &AppState) -> Router<AppState> {
    protect(
        Router::new()
            .route("/", get(list_words).post(create_word))
            .route("/{id}", delete(delete_word)),
        state,
        Policy::CanModerateComments,
    )
}

async fn get_about_me(State(state): State<AppState>) -> Result<Json<AboutMe>, ApiError> {
    state
        .about_me
        .get()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Ingen AboutMe hittades."))
}

async fn create_about_me(
    State(state): State<AppState>,
    Json(body): Json<AboutMe>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.about_me.create(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_about_me(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<AboutMe>,
) -> Result<StatusCode, ApiError> {
    state.about_me.update(id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_about_me(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.about_me.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_about_image(State(state): State<AppState>) -> Result<Json<ImageUrlResponse>, ApiError> {
    Ok(Json(ImageUrlResponse {
        image_url: state.about_me.image_url().await?,
    }))
}

/// PUT image - multipart `file`; replaces the current image
async fn replace_about_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImageUrlResponse>, ApiError> {
    let mut form = UploadForm::read(multipart, "file").await?;
    let url = state.about_me.replace_image(form.take_file()).await?;
    Ok(Json(ImageUrlResponse { image_url: Some(url) }))
}

async fn delete_about_image(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.about_me.delete_image().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(State(state): State<AppState>) -> Result<Json<Vec<ContactMe>>, ApiError> {
    Ok(Json(state.contact_me.list().await?))
}

async fn create_message(
    State(state): State<AppState>,
    Json(body): Json<ContactMeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.contact_me.create(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.contact_me.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_words(State(state): State<AppState>) -> Result<Json<Vec<ForbiddenWord>>, ApiError> {
    Ok(Json(state.forbidden_words.list().await?))
}

async fn create_word(
    State(state): State<AppState>,
    Json(body): Json<ForbiddenWordInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.forbidden_words.create(&body.word_pattern).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_word(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.forbidden_words.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
