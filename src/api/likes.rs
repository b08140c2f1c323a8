//! Like endpoints (`/api/Likes`)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::MessageResponse;
use crate::api::middleware::{identify, protect, ApiError, AppState, AuthenticatedUser};
use crate::models::{LikeDto, Policy};
use crate::services::LikeServiceError;

impl IntoResponse for LikeServiceError {
    fn into_response(self) -> Response {
        match self {
            LikeServiceError::NotFound => {
                (StatusCode::NOT_FOUND, Json(MessageResponse::new("Like not found"))).into_response()
            }
            LikeServiceError::Internal(e) => ApiError::internal(format!("{:#}", e)).into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    pub blogg_id: i64,
}

pub fn router(state: &AppState) -> Router<AppState> {
    let reads = identify(
        Router::new()
            .route("/{blogg_id}", get(like_status))
            .route("/{blogg_id}/{user_id}", get(like_status_for)),
        state,
    );

    let writes = protect(
        Router::new()
            .route("/", post(like_from_body))
            .route("/{blogg_id}", post(like))
            .route("/{blogg_id}/{user_id}", delete(unlike)),
        state,
        Policy::RequireUser,
    );

    reads.merge(writes)
}

async fn like_status(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Path(blogg_id): Path<i64>,
) -> Result<Json<LikeDto>, LikeServiceError> {
    Ok(Json(state.likes.status(blogg_id, user.map(|u| u.id)).await?))
}

/// The signed-in caller wins over the route user id
async fn like_status_for(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Path((blogg_id, user_id)): Path<(i64, String)>,
) -> Result<Json<LikeDto>, LikeServiceError> {
    let effective = user.map(|u| u.id).or_else(|| user_id.trim().parse().ok());
    Ok(Json(state.likes.status(blogg_id, effective).await?))
}

async fn like_from_body(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<LikeRequest>,
) -> Result<Json<LikeDto>, LikeServiceError> {
    add_like(&state, body.blogg_id, &user).await
}

async fn like(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(blogg_id): Path<i64>,
) -> Result<Json<LikeDto>, LikeServiceError> {
    add_like(&state, blogg_id, &user).await
}

async fn add_like(
    state: &AppState,
    blogg_id: i64,
    user: &AuthenticatedUser,
) -> Result<Json<LikeDto>, LikeServiceError> {
    let count = state.likes.like(blogg_id, user.id).await?;
    Ok(Json(LikeDto {
        blogg_id,
        user_id: Some(user.id.to_string()),
        count,
        liked: true,
    }))
}

/// DELETE {bloggId}/{userId} - always the caller's own like
async fn unlike(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((blogg_id, _user_id)): Path<(i64, String)>,
) -> Result<Json<LikeDto>, LikeServiceError> {
    let count = state.likes.unlike(blogg_id, user.id).await?;
    Ok(Json(LikeDto {
        blogg_id,
        user_id: Some(user.id.to_string()),
        count,
        liked: false,
    }))
}
