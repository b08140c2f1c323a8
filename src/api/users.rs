//! User administration and self-service endpoints
//!
//! `/api/User`:
//! - AdminOrSuperadmin: list, get, roles
//! - SuperadminOnly: delete, add/remove role, rename
//! - RequireUser: own username, profile, personal data, account deletion
//!
//! The `me/...` endpoints are also served below `/api/users`.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::auth;
use crate::api::middleware::{authenticated, protect, ApiError, AppState, AuthenticatedUser};
use crate::models::{PersonalData, Policy, ProfileUpdate, UserDto};
use crate::services::{BasicResult, UserAdminError};

/// User administration failure; bad requests carry a `BasicResult` body
#[derive(Debug)]
pub struct UserError(pub UserAdminError);

impl From<UserAdminError> for UserError {
    fn from(err: UserAdminError) -> Self {
        Self(err)
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        match self.0 {
            UserAdminError::BadRequest(m) => {
                (StatusCode::BAD_REQUEST, Json(BasicResult::failure(m))).into_response()
            }
            UserAdminError::NotFound(m) => ApiError::not_found(m).into_response(),
            UserAdminError::Unauthorized => ApiError::unauthorized("Unauthorized").into_response(),
            UserAdminError::Internal(e) => ApiError::internal(format!("{:#}", e)).into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUserNameRequest {
    #[serde(default)]
    pub new_user_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMeRequest {
    pub password: Option<String>,
}

/// Build the `/api/User` router
pub fn router(state: &AppState) -> Router<AppState> {
    let admin = protect(
        Router::new()
            .route("/all", get(list_users))
            .route("/{id}", get(get_user))
            .route("/{id}/roles", get(user_roles)),
        state,
        Policy::AdminOrSuperadmin,
    );

    let superadmin = protect(
        Router::new()
            .route("/delete/{id}", delete(delete_user))
            .route("/{id}/add-role/{role}", post(add_role))
            .route("/{id}/remove-role/{role}", delete(remove_role))
            .route("/{id}/username", put(change_username)),
        state,
        Policy::SuperadminOnly,
    );

    admin
        .merge(superadmin)
        .merge(protect(Router::new().route("/me/username", put(change_my_username)), state, Policy::RequireUser))
        .merge(self_service(state))
}

/// `/api/users`: self-service aliases plus the account aliases
pub fn alias_router(state: &AppState) -> Router<AppState> {
    self_service(state).merge(auth::users_alias_router(state))
}

fn self_service(state: &AppState) -> Router<AppState> {
    authenticated(
        Router::new()
            .route("/me/profile", put(update_profile))
            .route("/me/personal-data", get(personal_data))
            .route("/me/personal-data/download", get(download_personal_data))
            .route("/me", delete(delete_me)),
        state,
    )
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserDto>>, UserError> {
    Ok(Json(state.users.list().await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserDto>, UserError> {
    Ok(Json(state.users.get(id).await?))
}

async fn user_roles(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<String>>, UserError> {
    Ok(Json(state.users.roles_of(id).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, UserError> {
    state.users.delete(id).await?;
    Ok(StatusCode::OK)
}

async fn add_role(
    State(state): State<AppState>,
    Path((id, role)): Path<(i64, String)>,
) -> Result<StatusCode, UserError> {
    state.users.add_role(id, &role).await?;
    Ok(StatusCode::OK)
}

async fn remove_role(
    State(state): State<AppState>,
    Path((id, role)): Path<(i64, String)>,
) -> Result<StatusCode, UserError> {
    state.users.remove_role(id, &role).await?;
    Ok(StatusCode::OK)
}

async fn change_username(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ChangeUserNameRequest>,
) -> Result<Json<BasicResult>, UserError> {
    state.users.change_username(id, &body.new_user_name).await?;
    Ok(Json(BasicResult::ok("Username updated.")))
}

async fn change_my_username(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangeUserNameRequest>,
) -> Result<Json<BasicResult>, UserError> {
    state.users.change_username(user.id, &body.new_user_name).await?;
    Ok(Json(BasicResult::ok("Username updated.")))
}

/// PUT me/profile - only the provided fields change
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<BasicResult>, UserError> {
    let changed = state.users.update_profile(user.id, body).await?;
    Ok(Json(BasicResult::ok(if changed {
        "Din profil har uppdaterats."
    } else {
        "Inga ändringar att spara."
    })))
}

async fn personal_data(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<PersonalData>, UserError> {
    Ok(Json(state.users.personal_data(user.id).await?))
}

/// GET me/personal-data/download - the personal data as a JSON attachment
async fn download_personal_data(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Response, UserError> {
    let (file_name, body) = state.users.personal_data_file(user.id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response())
}

/// DELETE me - accounts with a password must confirm it
async fn delete_me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Option<Json<DeleteMeRequest>>,
) -> Result<Json<BasicResult>, UserError> {
    let password = body.and_then(|Json(b)| b.password);
    state.users.delete_self(user.id, password.as_deref()).await?;
    Ok(Json(BasicResult::ok("Account deleted.")))
}
