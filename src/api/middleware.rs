//! API middleware
//!
//! Contains:
//! - Application state shared by all handlers
//! - The common error body
//! - Authentication (JWT from the bearer header or the access token cookie)
//! - Authorization policies applied with `route_layer`

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAboutMeRepository, SqlxBloggImageRepository, SqlxBloggRepository, SqlxCommentRepository,
    SqlxContactMeRepository, SqlxForbiddenWordRepository, SqlxLikeRepository,
    SqlxRoleRepository, SqlxTokenRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::Policy;
use crate::services::{
    create_email_sender, create_storage, AboutMeService, AccountService, AccountSettings,
    BloggService, CommentService, ContactMeService, ContentSafetyService, ForbiddenWordService,
    GoogleProvider, ImageService, LikeService, NewPostNotifier, RoleService, TokenService,
    UserAdminService,
};

/// Cookie carrying the access token for browser clients
pub const ACCESS_TOKEN_COOKIE: &str = "api_access_token";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub account: Arc<AccountService>,
    pub users: Arc<UserAdminService>,
    pub roles: Arc<RoleService>,
    pub bloggs: Arc<BloggService>,
    pub images: Arc<ImageService>,
    pub comments: Arc<CommentService>,
    pub likes: Arc<LikeService>,
    pub about_me: Arc<AboutMeService>,
    pub contact_me: Arc<ContactMeService>,
    pub forbidden_words: Arc<ForbiddenWordService>,
}

impl AppState {
    /// Wire repositories and services on top of `pool`
    pub fn new(pool: DynDatabasePool, config: Config) -> anyhow::Result<Self> {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let role_repo = SqlxRoleRepository::boxed(pool.clone());
        let blogg_repo = SqlxBloggRepository::boxed(pool.clone());
        let image_repo = SqlxBloggImageRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool.clone());
        let like_repo = SqlxLikeRepository::boxed(pool.clone());
        let word_repo = SqlxForbiddenWordRepository::boxed(pool.clone());

        let email = create_email_sender(&config.email)?;
        let storage = create_storage(&config.storage);

        let mut account = AccountService::new(
            user_repo.clone(),
            SqlxTokenRepository::boxed(pool.clone()),
            TokenService::new(config.jwt.clone()),
            email.clone(),
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryCache::new()),
            AccountSettings::from_config(&config),
        );
        if config.google.is_configured() {
            tracing::info!("Google login enabled");
            account = account.with_external_provider(Arc::new(GoogleProvider::new(config.google.clone())));
        }

        let notifier = Arc::new(NewPostNotifier::new(
            user_repo.clone(),
            blogg_repo.clone(),
            email,
            config.frontend.base(),
        ));
        let bloggs = BloggService::new(blogg_repo.clone(), image_repo.clone(), storage.clone())
            .with_notifier(notifier);

        Ok(Self {
            account: Arc::new(account),
            users: Arc::new(UserAdminService::new(
                user_repo.clone(),
                role_repo.clone(),
                comment_repo.clone(),
                like_repo.clone(),
                config.admin_user.email.clone(),
            )),
            roles: Arc::new(RoleService::new(role_repo)),
            bloggs: Arc::new(bloggs),
            images: Arc::new(ImageService::new(blogg_repo, image_repo, storage.clone())),
            comments: Arc::new(CommentService::new(
                comment_repo,
                user_repo,
                word_repo.clone(),
                Arc::new(ContentSafetyService::new(config.content_safety.clone())),
            )),
            likes: Arc::new(LikeService::new(like_repo)),
            about_me: Arc::new(AboutMeService::new(
                SqlxAboutMeRepository::boxed(pool.clone()),
                storage,
            )),
            contact_me: Arc::new(ContactMeService::new(SqlxContactMeRepository::boxed(pool.clone()))),
            forbidden_words: Arc::new(ForbiddenWordService::new(word_repo)),
            config: Arc::new(config),
            pool,
        })
    }
}

/// Caller identity taken from a valid access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
    pub roles: Vec<String>,
    /// The raw access token of the request
    pub token: String,
}

impl AuthenticatedUser {
    pub fn satisfies(&self, policy: Policy) -> bool {
        policy.allows(&self.roles)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthenticatedUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log `err` and answer with a generic 500
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", err);
        Self::internal_error("An unexpected error occurred.")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Access token from the bearer header, falling back to the access token cookie
fn extract_access_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    let cookie_str = request.headers().get(header::COOKIE)?.to_str().ok()?;
    cookie_str.split(';').find_map(|cookie| {
        cookie
            .trim()
            .strip_prefix(ACCESS_TOKEN_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

fn authenticate(state: &AppState, request: &Request) -> Option<AuthenticatedUser> {
    let token = extract_access_token(request)?;
    let claims = match state.account.token_service().validate(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("Rejected access token: {:#}", e);
            return None;
        }
    };
    Some(AuthenticatedUser {
        id: claims.user_id()?,
        username: claims.name,
        roles: claims.roles,
        token,
    })
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &request)
        .ok_or_else(|| ApiError::unauthorized("Invalid or missing access token"))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(user) = authenticate(&state, &request) {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

/// Policy middleware; the policy is the middleware state
pub async fn require_policy(
    State(policy): State<Policy>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.satisfies(policy) {
        return Err(ApiError::forbidden("Insufficient permissions"));
    }
    Ok(next.run(request).await)
}

/// Require a valid token and `policy` on every route of `router`
pub fn protect(router: Router<AppState>, state: &AppState, policy: Policy) -> Router<AppState> {
    router
        .route_layer(axum_middleware::from_fn_with_state(policy, require_policy))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
}

/// Require a valid token on every route of `router`, whatever the roles
pub fn authenticated(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
}

/// Attach the caller identity when a valid token is present
pub fn identify(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(axum_middleware::from_fn_with_state(state.clone(), optional_auth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn create_request_with_auth(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn create_request_with_cookie(cookie: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_token_from_bearer() {
        let request = create_request_with_auth("test-token-123");
        assert_eq!(extract_access_token(&request), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_token_from_cookie() {
        let request = create_request_with_cookie("theme=dark; api_access_token=abc.def");
        assert_eq!(extract_access_token(&request), Some("abc.def".to_string()));
    }

    #[test]
    fn test_bearer_wins_over_cookie() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer bearer-token")
            .header(header::COOKIE, "api_access_token=cookie-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_access_token(&request), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_unrelated_cookie_and_basic_auth_ignored() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Basic invalid")
            .header(header::COOKIE, "api_access_token_old=x")
            .body(Body::empty())
            .unwrap();
        assert!(extract_access_token(&request).is_none());
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::new("ODD", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_error_with_details() {
        let details = serde_json::json!({"field": "userName"});
        let error = ApiError::with_details("VALIDATION_ERROR", "Invalid", details.clone());
        assert_eq!(error.error.details, Some(details));
    }

    #[test]
    fn test_policy_check() {
        let user = AuthenticatedUser {
            id: 1,
            username: "mod".into(),
            roles: vec!["superuser".into()],
            token: String::new(),
        };
        assert!(user.satisfies(Policy::RequireUser));
        assert!(user.satisfies(Policy::CanModerateComments));
        assert!(!user.satisfies(Policy::AdminOrSuperadmin));
    }
}
