//! Comment endpoints (`/api/Comment`)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::middleware::{authenticated, identify, protect, ApiError, AppState, AuthenticatedUser};
use crate::models::{CommentDto, CommentInput, Policy};
use crate::services::{CommentActor, CommentServiceError};

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::BadRequest(m) => ApiError::validation_error(m),
            CommentServiceError::NotFound(id) => ApiError::not_found(format!("Comment {id} not found")),
            CommentServiceError::Forbidden => {
                ApiError::forbidden("Only the author or a moderator may delete this comment")
            }
            CommentServiceError::Internal(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/by-blogg/{blogg_id}", get(list_by_blogg))
        .route("/ById/{id}", get(get_comment));

    // anonymous or signed in
    let open = identify(
        Router::new().route("/", get(list_comments).post(create_comment)),
        state,
    );

    let signed_in = authenticated(
        Router::new().route("/ById/{id}", delete(delete_comment)),
        state,
    );

    let moderators = protect(
        Router::new().route("/ByBlogg/{blogg_id}", delete(delete_by_blogg)),
        state,
        Policy::CanModerateComments,
    );

    public.merge(open).merge(signed_in).merge(moderators)
}

async fn list_comments(State(state): State<AppState>) -> Result<Json<Vec<CommentDto>>, ApiError> {
    Ok(Json(state.comments.list().await?))
}

/// GET by-blogg/{bloggId} - oldest first
async fn list_by_blogg(
    State(state): State<AppState>,
    Path(blogg_id): Path<i64>,
) -> Result<Json<Vec<CommentDto>>, ApiError> {
    Ok(Json(state.comments.list_by_blogg(blogg_id).await?))
}

async fn get_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CommentDto>, ApiError> {
    Ok(Json(state.comments.get(id).await?))
}

/// POST - signed-in authors are linked to their account
async fn create_comment(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Json(body): Json<CommentInput>,
) -> Result<Json<CommentDto>, ApiError> {
    let created = state.comments.create(body, user.map(|u| u.id)).await?;
    Ok(Json(created))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = CommentActor {
        user_id: user.id,
        roles: user.roles,
    };
    state.comments.delete(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_by_blogg(
    State(state): State<AppState>,
    Path(blogg_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let removed = state.comments.delete_by_blogg(blogg_id).await?;
    tracing::info!("Deleted {} comments of post {}", removed, blogg_id);
    Ok(StatusCode::NO_CONTENT)
}
