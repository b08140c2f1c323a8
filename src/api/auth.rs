//! Authentication API endpoints
//!
//! Handles `/api/auth`:
//! - registration, email confirmation and login
//! - token refresh and logout
//! - password reset / change / set and email change
//! - Google external login
//!
//! Flow endpoints answer with a `BasicResult` body, also on failure.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::MessageResponse;
use crate::api::middleware::{authenticated, protect, ApiError, AppState, AuthenticatedUser};
use crate::models::{Policy, UserDto};
use crate::services::account::{
    ChangePasswordInput, LoginInput, RegisterInput, ResetPasswordInput, UserCodeInput,
};
use crate::services::{AccountError, BasicResult, LoginResponse};

/// Account flow failure rendered as a `BasicResult`
#[derive(Debug)]
pub struct AuthError(pub AccountError);

impl From<AccountError> for AuthError {
    fn from(err: AccountError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            AccountError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AccountError::Conflict(m) => (StatusCode::CONFLICT, m),
            AccountError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            AccountError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            AccountError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AccountError::Internal(e) => return ApiError::internal(format!("{:#}", e)).into_response(),
        };
        (status, Json(BasicResult::failure(message))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordRequest {
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEmailRequest {
    #[serde(default)]
    pub new_email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEmailQuery {
    pub new_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalStartQuery {
    pub return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    #[serde(alias = "error")]
    pub remote_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

/// `send-reset-link` failure body
#[derive(Debug, Serialize)]
pub struct ResetLinkFailure {
    pub sent: bool,
    pub message: String,
}

/// Build the `/api/auth` router
pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/confirm-email", post(confirm_email))
        .route("/resend-confirmation", post(resend_confirmation))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/change-email/confirm", post(change_email_confirm))
        .route("/external/google/start", get(google_start))
        .route("/external/google", get(google_callback))
        .route("/external/exchange", post(external_exchange));

    let signed_in = authenticated(
        Router::new()
            .route("/refresh-session", post(refresh_session))
            .route("/logout", post(logout))
            .route("/me", get(me))
            .route("/change-password", post(change_password))
            .route("/set-password", post(set_password))
            .route("/change-email/start", post(change_email_start))
            .route("/editor-token", get(editor_token)),
        state,
    );

    let superadmin = protect(
        Router::new().route("/send-reset-link", post(send_reset_link)),
        state,
        Policy::SuperadminOnly,
    );

    public.merge(signed_in).merge(superadmin)
}

/// `/api/users` aliases of the account endpoints
pub fn users_alias_router(state: &AppState) -> Router<AppState> {
    let signed_in = authenticated(
        Router::new()
            .route("/me", get(me))
            .route("/me/change-password", post(change_password))
            .route("/me/set-password", post(set_password))
            .route("/me/change-email/start", post(change_email_start)),
        state,
    );
    Router::new()
        .route("/change-email/confirm", post(change_email_confirm))
        .merge(signed_in)
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<Json<BasicResult>, AuthError> {
    Ok(Json(state.account.register(body).await?))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<Json<LoginResponse>, AuthError> {
    Ok(Json(state.account.login(body).await?))
}

/// POST /api/auth/refresh - rotate a refresh token
async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    Ok(Json(state.account.refresh(&body.refresh_token).await?))
}

/// POST /api/auth/refresh-session - new tokens reflecting current roles
async fn refresh_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<LoginResponse>, AuthError> {
    Ok(Json(state.account.refresh_session(user.id).await?))
}

/// POST /api/auth/logout - revoke every refresh token of the caller
async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MessageResponse>, AuthError> {
    state.account.logout(user.id).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// GET /api/auth/me
pub(crate) async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserDto>, AuthError> {
    Ok(Json(state.account.me(user.id).await?))
}

async fn confirm_email(
    State(state): State<AppState>,
    Json(body): Json<UserCodeInput>,
) -> Result<Json<BasicResult>, AuthError> {
    Ok(Json(state.account.confirm_email(body).await?))
}

async fn resend_confirmation(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<BasicResult>, AuthError> {
    Ok(Json(state.account.resend_confirmation(&body.email).await?))
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<BasicResult>, AuthError> {
    Ok(Json(state.account.forgot_password(&body.email).await?))
}

async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordInput>,
) -> Result<Json<BasicResult>, AuthError> {
    Ok(Json(state.account.reset_password(body).await?))
}

async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordInput>,
) -> Result<Json<BasicResult>, AuthError> {
    Ok(Json(state.account.change_password(user.id, body).await?))
}

async fn set_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SetPasswordRequest>,
) -> Result<Json<BasicResult>, AuthError> {
    Ok(Json(state.account.set_password(user.id, &body.new_password).await?))
}

async fn change_email_start(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangeEmailRequest>,
) -> Result<Json<BasicResult>, AuthError> {
    Ok(Json(state.account.change_email_start(user.id, &body.new_email).await?))
}

async fn change_email_confirm(
    State(state): State<AppState>,
    Query(query): Query<NewEmailQuery>,
    Json(body): Json<UserCodeInput>,
) -> Result<Json<BasicResult>, AuthError> {
    Ok(Json(
        state
            .account
            .change_email_confirm(body, query.new_email.as_deref())
            .await?,
    ))
}

/// POST /api/auth/send-reset-link - superadmin only
async fn send_reset_link(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Response {
    match state.account.send_reset_link(&body.email).await {
        Ok(result) => Json(result).into_response(),
        Err(AccountError::BadRequest(message)) => (
            StatusCode::BAD_REQUEST,
            Json(ResetLinkFailure { sent: false, message }),
        )
            .into_response(),
        Err(AccountError::NotFound(message)) => (
            StatusCode::NOT_FOUND,
            Json(ResetLinkFailure { sent: false, message }),
        )
            .into_response(),
        Err(AccountError::Forbidden(message)) => ApiError::forbidden(message).into_response(),
        Err(e) => AuthError(e).into_response(),
    }
}

/// GET /api/auth/editor-token - the caller's own access token, for the rich-text editor
async fn editor_token(user: AuthenticatedUser) -> Json<AccessTokenResponse> {
    Json(AccessTokenResponse {
        access_token: user.token,
    })
}

/// GET /api/auth/external/google/start
async fn google_start(
    State(state): State<AppState>,
    Query(query): Query<ExternalStartQuery>,
) -> Result<Redirect, AuthError> {
    let url = state
        .account
        .external_login_start(query.return_url.as_deref())
        .await?;
    Ok(Redirect::to(&url))
}

/// GET /api/auth/external/google - provider callback
async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<ExternalCallbackQuery>,
) -> Result<Redirect, AuthError> {
    let url = state
        .account
        .external_login_callback(
            query.code.as_deref(),
            query.state.as_deref(),
            query.remote_error.as_deref(),
        )
        .await?;
    Ok(Redirect::to(&url))
}

/// POST /api/auth/external/exchange - trade the one-time code for tokens
async fn external_exchange(
    State(state): State<AppState>,
    Json(body): Json<ExchangeRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    Ok(Json(state.account.exchange_external_code(&body.code).await?))
}
