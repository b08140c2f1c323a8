//! Role management endpoints (`/api/Role`, superadmin only)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::middleware::{protect, ApiError, AppState};
use crate::models::Policy;
use crate::services::RoleServiceError;

impl From<RoleServiceError> for ApiError {
    fn from(err: RoleServiceError) -> Self {
        match err {
            RoleServiceError::BadRequest(m) => ApiError::validation_error(m),
            RoleServiceError::NotFound(m) => ApiError::not_found(m),
            RoleServiceError::Internal(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    protect(
        Router::new()
            .route("/all", get(list_roles))
            .route("/create/{role}", post(create_role))
            .route("/delete/{role}", delete(delete_role)),
        state,
        Policy::SuperadminOnly,
    )
}

async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.roles.list().await?))
}

/// POST create/{role} - an existing role is not an error
async fn create_role(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.roles.create(&role).await?;
    Ok(StatusCode::OK)
}

async fn delete_role(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.roles.delete(&role).await?;
    Ok(StatusCode::OK)
}
