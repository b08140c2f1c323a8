//! Account service
//!
//! Everything behind `/api/auth`:
//! - registration with email confirmation
//! - password login with lockout, refresh token rotation, logout
//! - password reset, password change, email change
//! - Google external login with one-time exchange codes
//!
//! Links sent to users point at the Razor frontend. Outside production they
//! are also returned in the response so the flows can be completed without a
//! mail server.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::{CacheLayer, MemoryCache, EXTERNAL_CODE_PREFIX, OAUTH_STATE_PREFIX};
use crate::config::{Config, Environment, FrontendConfig};
use crate::db::repositories::{TokenRepository, UserRepository};
use crate::models::{NewUser, Role, TokenPurpose, User, UserDto, UserToken};
use crate::services::email::EmailSender;
use crate::services::google::ExternalIdentityProvider;
use crate::services::jwt::{
    generate_identity_token, generate_one_time_code, generate_refresh_token, hash_token,
    LoginResponse, TokenService,
};
use crate::services::notifier::escape_html;
use crate::services::password::{hash_password, validate_password_policy, verify_password};

/// Consecutive failed logins before the account is locked
pub const MAX_FAILED_ACCESS_ATTEMPTS: i32 = 5;
/// Length of a lockout
pub const LOCKOUT_MINUTES: i64 = 5;

const IDENTITY_TOKEN_HOURS: i64 = 24;
const REMEMBER_ME_DAYS: i64 = 30;
const EXTERNAL_REFRESH_EXTRA_DAYS: i64 = 30;
const EXTERNAL_CODE_TTL: std::time::Duration = std::time::Duration::from_secs(2 * 60);
const OAUTH_STATE_TTL: std::time::Duration = std::time::Duration::from_secs(10 * 60);

const INVALID_CREDENTIALS: &str = "Invalid credentials.";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token.";
const INVALID_TOKEN: &str = "Invalid token.";
const CONFIRM_SUBJECT: &str = "Bekräfta din e-post till Med Hjärtat som Kompass";
const NEUTRAL_CONFIRMATION: &str = "If the email exists, a confirmation link was sent.";
const NEUTRAL_RESET: &str = "If the email exists, a reset link was sent.";

/// Error types for account operations
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Outcome of an account flow as returned to the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicResult {
    pub succeeded: bool,
    pub message: Option<String>,
    /// Confirmation or reset link, only when it may be exposed
    pub confirm_email_url: Option<String>,
}

impl BasicResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: Some(message.into()),
            confirm_email_url: None,
        }
    }

    pub fn with_url(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            confirm_email_url: Some(url.into()),
            ..Self::ok(message)
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: Some(message.into()),
            confirm_email_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterInput {
    pub user_name: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub birth_year: Option<i32>,
    pub subscribe_new_posts: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginInput {
    pub user_name_or_email: String,
    pub password: String,
    pub remember_me: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserCodeInput {
    pub user_id: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPasswordInput {
    pub user_id: String,
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

/// Account settings derived from the configuration
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub environment: Environment,
    pub frontend: FrontendConfig,
    /// Return links in responses even in production
    pub expose_links: bool,
    /// The protected system account
    pub admin_email: String,
}

impl AccountSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            environment: config.environment,
            frontend: config.frontend.clone(),
            expose_links: config.auth.expose_confirm_link_in_response,
            admin_email: config.admin_user.email.clone(),
        }
    }

    /// Whether links may be put in responses
    fn may_expose(&self) -> bool {
        !self.environment.is_production() || self.expose_links
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        !self.admin_email.trim().is_empty() && email.trim().eq_ignore_ascii_case(self.admin_email.trim())
    }
}

/// Account service
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenRepository>,
    token_service: TokenService,
    email: Arc<dyn EmailSender>,
    /// One-time codes handed out after an external login
    login_codes: Arc<MemoryCache>,
    /// Pending OAuth `state` values; filled by unauthenticated requests
    oauth_states: Arc<MemoryCache>,
    external: Option<Arc<dyn ExternalIdentityProvider>>,
    settings: AccountSettings,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        token_service: TokenService,
        email: Arc<dyn EmailSender>,
        login_codes: Arc<MemoryCache>,
        oauth_states: Arc<MemoryCache>,
        settings: AccountSettings,
    ) -> Self {
        Self {
            users,
            tokens,
            token_service,
            email,
            login_codes,
            oauth_states,
            external: None,
            settings,
        }
    }

    /// Enable external login through `provider`
    pub fn with_external_provider(mut self, provider: Arc<dyn ExternalIdentityProvider>) -> Self {
        self.external = Some(provider);
        self
    }

    pub fn token_service(&self) -> &TokenService {
        &self.token_service
    }

    pub fn settings(&self) -> &AccountSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Registration and email confirmation
    // ------------------------------------------------------------------

    /// Create an account with role `user` and issue an email confirmation link.
    pub async fn register(&self, input: RegisterInput) -> Result<BasicResult, AccountError> {
        let username = input.user_name.trim();
        let email = input.email.trim();
        if username.is_empty() {
            return Err(AccountError::BadRequest("Username is required".into()));
        }
        if email.is_empty() {
            return Err(AccountError::BadRequest("Email is required".into()));
        }
        if input.password.trim().is_empty() {
            return Err(AccountError::BadRequest("Password is required".into()));
        }
        let birth_year = input.birth_year.filter(|y| (1900..=2100).contains(y));

        if self.users.get_by_email(email).await.context("Failed to check email")?.is_some() {
            return Err(AccountError::Conflict(
                "Kunde inte skapa konto. Prova en annan e-post eller logga in.".into(),
            ));
        }
        if self
            .users
            .get_by_username(username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(AccountError::Conflict("Användarnamnet är upptaget.".into()));
        }
        check_password_policy(&input.password)?;

        let user = self
            .users
            .create(&NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: Some(hash_password(&input.password)?),
                name: input.name.filter(|n| !n.trim().is_empty()),
                birth_year,
                email_confirmed: false,
                notify_on_new_post: input.subscribe_new_posts,
                requires_username_setup: false,
            })
            .await
            .context("Failed to create user")?;
        self.users
            .add_role(user.id, Role::User.as_str())
            .await
            .context("Failed to assign role")?;
        tracing::info!("Registered user {} ({})", user.username, user.id);

        let code = self
            .issue_identity_token(user.id, TokenPurpose::ConfirmEmail, None)
            .await?;
        let confirm_url = self.link(
            "ConfirmEmail",
            &[("userId", &user.id.to_string()), ("code", &code)],
        );

        let expose = if self.settings.environment.is_production() {
            let html = format!(
                "<p>Hej!</p>\
                 <p>Bekräfta din e-post genom att klicka på länken nedan:</p>\
                 <p><a href=\"{confirm_url}\">Bekräfta min e-post</a></p>\
                 <p>Hälsningar,<br/>Med Hjärtat som Kompass</p>"
            );
            let sent = self.send_email(&user.email, CONFIRM_SUBJECT, &html).await;
            !sent || self.settings.expose_links
        } else {
            tracing::info!("Register: non-production, exposing confirmation link");
            true
        };

        Ok(if expose {
            BasicResult::with_url("User created (dev/test mode)", confirm_url)
        } else {
            BasicResult::ok("User created. Check your email.")
        })
    }

    pub async fn confirm_email(&self, input: UserCodeInput) -> Result<BasicResult, AccountError> {
        if input.user_id.trim().is_empty() || input.code.trim().is_empty() {
            return Err(AccountError::BadRequest("UserId and Code are required".into()));
        }
        let mut user = self
            .find_by_id_str(&input.user_id)
            .await?
            .ok_or_else(|| AccountError::BadRequest("Invalid user".into()))?;

        if self
            .redeem_identity_token(user.id, TokenPurpose::ConfirmEmail, &input.code)
            .await?
            .is_none()
        {
            return Err(AccountError::BadRequest(
                "Invalid or expired confirmation code.".into(),
            ));
        }

        if !user.email_confirmed {
            user.email_confirmed = true;
            self.users.update(&user).await.context("Failed to confirm email")?;
        }
        Ok(BasicResult::ok("Email confirmed successfully"))
    }

    /// Issue a new confirmation link; the answer never reveals whether the address exists.
    pub async fn resend_confirmation(&self, email: &str) -> Result<BasicResult, AccountError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(BasicResult::ok(NEUTRAL_CONFIRMATION));
        }
        let user = match self.users.get_by_email(email).await.context("Failed to find user")? {
            Some(user) if !user.email_confirmed => user,
            _ => return Ok(BasicResult::ok(NEUTRAL_CONFIRMATION)),
        };

        let code = self
            .issue_identity_token(user.id, TokenPurpose::ConfirmEmail, None)
            .await?;
        let confirm_url = self.link(
            "ConfirmEmail",
            &[("userId", &user.id.to_string()), ("code", &code)],
        );
        let html = format!(
            "<p>Hej {},</p>\
             <p>Bekräfta din e-post genom att klicka här:</p>\
             <p><a href=\"{}\">Bekräfta e-post</a></p>",
            escape_html(&user.username),
            confirm_url
        );
        self.send_email(&user.email, CONFIRM_SUBJECT, &html).await;

        Ok(if self.settings.may_expose() {
            BasicResult::with_url("Bekräftelselänk skapad (dev).", confirm_url)
        } else {
            BasicResult::ok(NEUTRAL_CONFIRMATION)
        })
    }

    // ------------------------------------------------------------------
    // Login, refresh, logout
    // ------------------------------------------------------------------

    /// Password login by username or email.
    pub async fn login(&self, input: LoginInput) -> Result<LoginResponse, AccountError> {
        let identifier = input.user_name_or_email.trim();
        if identifier.is_empty() || input.password.is_empty() {
            return Err(AccountError::Unauthorized(INVALID_CREDENTIALS.into()));
        }

        let user = match self
            .users
            .get_by_username(identifier)
            .await
            .context("Failed to find user")?
        {
            Some(user) => Some(user),
            None => self
                .users
                .get_by_email(identifier)
                .await
                .context("Failed to find user")?,
        };
        let Some(mut user) = user else {
            return Err(AccountError::Unauthorized(INVALID_CREDENTIALS.into()));
        };

        let now = Utc::now();
        if user.is_locked_out(now) {
            tracing::warn!("Login attempt for locked out user {}", user.id);
            return Err(AccountError::Unauthorized(INVALID_CREDENTIALS.into()));
        }

        let valid = match user.password_hash.as_deref().filter(|h| !h.is_empty()) {
            Some(hash) => verify_password(&input.password, hash).unwrap_or(false),
            None => false,
        };
        if !valid {
            self.record_failed_login(&mut user, now).await?;
            return Err(AccountError::Unauthorized(INVALID_CREDENTIALS.into()));
        }

        if user.access_failed_count != 0 || user.lockout_end.is_some() {
            user.access_failed_count = 0;
            user.lockout_end = None;
            self.users.update(&user).await.context("Failed to reset lockout")?;
        }

        if !user.email_confirmed {
            return Err(AccountError::Unauthorized("Email not confirmed.".into()));
        }

        let refresh_lifetime = if input.remember_me {
            Duration::days(REMEMBER_ME_DAYS)
        } else {
            self.token_service.refresh_lifetime()
        };
        let response = self.issue_tokens(&user, refresh_lifetime).await?;
        tracing::info!("User {} logged in", user.id);
        Ok(response)
    }

    async fn record_failed_login(&self, user: &mut User, now: DateTime<Utc>) -> Result<(), AccountError> {
        user.access_failed_count += 1;
        if user.access_failed_count >= MAX_FAILED_ACCESS_ATTEMPTS {
            user.access_failed_count = 0;
            user.lockout_end = Some(now + Duration::minutes(LOCKOUT_MINUTES));
            tracing::warn!("User {} locked out for {} minutes", user.id, LOCKOUT_MINUTES);
        }
        self.users
            .update(user)
            .await
            .context("Failed to record failed login")?;
        Ok(())
    }

    /// Trade a refresh token for a new token pair; the old refresh token is revoked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginResponse, AccountError> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(AccountError::Unauthorized(INVALID_REFRESH_TOKEN.into()));
        }
        let hash = hash_token(refresh_token);

        let stored = self
            .tokens
            .get_refresh_token(&hash)
            .await
            .context("Failed to load refresh token")?
            .filter(|t| t.is_active(Utc::now()))
            .ok_or_else(|| AccountError::Unauthorized(INVALID_REFRESH_TOKEN.into()))?;

        if !self
            .tokens
            .revoke_refresh_token(&hash)
            .await
            .context("Failed to revoke refresh token")?
        {
            return Err(AccountError::Unauthorized(INVALID_REFRESH_TOKEN.into()));
        }

        let user = self
            .users
            .get_by_id(stored.user_id)
            .await
            .context("Failed to load user")?
            .ok_or_else(|| AccountError::Unauthorized(INVALID_REFRESH_TOKEN.into()))?;

        self.issue_tokens(&user, self.token_service.refresh_lifetime())
            .await
    }

    /// New tokens from the current state of the user, so role changes take effect
    pub async fn refresh_session(&self, user_id: i64) -> Result<LoginResponse, AccountError> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to load user")?
            .ok_or_else(|| AccountError::Unauthorized("Unauthorized".into()))?;
        self.issue_tokens(&user, self.token_service.refresh_lifetime())
            .await
    }

    /// Revoke every refresh token of the user
    pub async fn logout(&self, user_id: i64) -> Result<(), AccountError> {
        let revoked = self
            .tokens
            .revoke_all_refresh_tokens(user_id)
            .await
            .context("Failed to revoke refresh tokens")?;
        tracing::info!("User {} logged out ({} refresh tokens revoked)", user_id, revoked);
        Ok(())
    }

    pub async fn me(&self, user_id: i64) -> Result<UserDto, AccountError> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to load user")?
            .ok_or_else(|| AccountError::Unauthorized("Unauthorized".into()))?;
        let roles = self.users.get_roles(user.id).await.context("Failed to load roles")?;
        Ok(UserDto::from_user(&user, roles))
    }

    async fn issue_tokens(
        &self,
        user: &User,
        refresh_lifetime: Duration,
    ) -> Result<LoginResponse, AccountError> {
        let roles = self.users.get_roles(user.id).await.context("Failed to load roles")?;
        let (access_token, access_token_expires_utc) =
            self.token_service.issue_access_token(user, &roles)?;

        let (refresh_token, refresh_hash) = generate_refresh_token();
        let refresh_token_expires_utc = Utc::now() + refresh_lifetime;
        self.tokens
            .create_refresh_token(user.id, &refresh_hash, refresh_token_expires_utc)
            .await
            .context("Failed to store refresh token")?;

        Ok(LoginResponse {
            access_token,
            access_token_expires_utc,
            refresh_token,
            refresh_token_expires_utc,
        })
    }

    // ------------------------------------------------------------------
    // Passwords
    // ------------------------------------------------------------------

    pub async fn forgot_password(&self, email: &str) -> Result<BasicResult, AccountError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(BasicResult::ok(NEUTRAL_RESET));
        }
        let user = match self.users.get_by_email(email).await.context("Failed to find user")? {
            Some(user) if user.email_confirmed => user,
            _ => return Ok(BasicResult::ok(NEUTRAL_RESET)),
        };

        let reset_url = self.reset_link(&user).await?;
        if !self.settings.environment.is_production() {
            tracing::info!("ForgotPassword: non-production, exposing reset link");
            return Ok(BasicResult::with_url("Reset link generated (dev/test).", reset_url));
        }

        let html = format!(
            "<p>Hej {},</p>\
             <p>Klicka på länken nedan för att välja ett nytt lösenord:</p>\
             <p><a href=\"{}\">Återställ lösenord</a></p>\
             <p>Om du inte begärt detta kan du ignorera mejlet.</p>\
             <p>Hälsningar,<br/>Med Hjärtat som Kompass</p>",
            escape_html(&user.username),
            reset_url
        );
        if self.send_email(&user.email, "Återställ lösenord", &html).await {
            Ok(BasicResult::ok(NEUTRAL_RESET))
        } else if self.settings.expose_links {
            Ok(BasicResult::with_url("Reset link generated (fallback).", reset_url))
        } else {
            Ok(BasicResult::ok(NEUTRAL_RESET))
        }
    }

    /// Set a new password with a reset token; also lifts any lockout.
    pub async fn reset_password(&self, input: ResetPasswordInput) -> Result<BasicResult, AccountError> {
        if input.user_id.trim().is_empty()
            || input.token.trim().is_empty()
            || input.new_password.trim().is_empty()
        {
            return Err(AccountError::BadRequest("Invalid payload".into()));
        }
        let mut user = self
            .find_by_id_str(&input.user_id)
            .await?
            .ok_or_else(|| AccountError::BadRequest("Invalid user".into()))?;

        check_password_policy(&input.new_password)?;
        if self
            .redeem_identity_token(user.id, TokenPurpose::ResetPassword, &input.token)
            .await?
            .is_none()
        {
            return Err(AccountError::BadRequest(INVALID_TOKEN.into()));
        }

        user.password_hash = Some(hash_password(&input.new_password)?);
        user.access_failed_count = 0;
        user.lockout_end = None;
        self.users.update(&user).await.context("Failed to reset password")?;
        tracing::info!("Password reset for user {}", user.id);
        Ok(BasicResult::ok("Password reset successfully"))
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        input: ChangePasswordInput,
    ) -> Result<BasicResult, AccountError> {
        if input.current_password.trim().is_empty() || input.new_password.trim().is_empty() {
            return Err(AccountError::BadRequest(
                "Current and new password are required.".into(),
            ));
        }
        let mut user = self.require_user(user_id).await?;

        let current_ok = match user.password_hash.as_deref().filter(|h| !h.is_empty()) {
            Some(hash) => verify_password(&input.current_password, hash).unwrap_or(false),
            None => false,
        };
        if !current_ok {
            return Err(AccountError::BadRequest("Incorrect password.".into()));
        }
        check_password_policy(&input.new_password)?;

        user.password_hash = Some(hash_password(&input.new_password)?);
        user.access_failed_count = 0;
        user.lockout_end = None;
        self.users.update(&user).await.context("Failed to change password")?;
        Ok(BasicResult::ok("Password changed successfully."))
    }

    /// Add a password to an account created through an external login
    pub async fn set_password(&self, user_id: i64, new_password: &str) -> Result<BasicResult, AccountError> {
        if new_password.trim().is_empty() {
            return Err(AccountError::BadRequest("New password is required.".into()));
        }
        let mut user = self.require_user(user_id).await?;
        if user.has_password() {
            return Err(AccountError::BadRequest("User already has a password.".into()));
        }
        check_password_policy(new_password)?;

        user.password_hash = Some(hash_password(new_password)?);
        self.users.update(&user).await.context("Failed to set password")?;
        Ok(BasicResult::ok("Password set successfully."))
    }

    /// Reset link for another user, on behalf of a superadmin
    pub async fn send_reset_link(&self, email: &str) -> Result<BasicResult, AccountError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AccountError::BadRequest("Email required".into()));
        }
        if self.settings.is_admin_email(email) {
            return Err(AccountError::Forbidden("System user cannot be managed.".into()));
        }
        let user = self
            .users
            .get_by_email(email)
            .await
            .context("Failed to find user")?
            .ok_or_else(|| AccountError::NotFound("User not found".into()))?;

        let reset_url = self.reset_link(&user).await?;
        if !self.settings.environment.is_production() {
            return Ok(BasicResult::with_url("Reset link generated (dev/test mode).", reset_url));
        }

        let html = format!(
            "<p>Hej {},</p>\
             <p>En administratör har initierat en återställning av ditt lösenord.</p>\
             <p>Klicka här för att återställa det:</p>\
             <p><a href=\"{}\">Återställ lösenord</a></p>\
             <p>Hälsningar,<br/>Med Hjärtat som Kompass</p>",
            escape_html(&user.username),
            reset_url
        );
        let subject = "Återställ lösenord (initierad av administratör)";
        if self.send_email(&user.email, subject, &html).await {
            Ok(BasicResult::ok("Reset link sent to user."))
        } else {
            Ok(BasicResult::with_url("Reset link generated (fallback mode).", reset_url))
        }
    }

    async fn reset_link(&self, user: &User) -> Result<String, AccountError> {
        let token = self
            .issue_identity_token(user.id, TokenPurpose::ResetPassword, None)
            .await?;
        Ok(self.link(
            "ResetPassword",
            &[("userId", &user.id.to_string()), ("token", &token)],
        ))
    }

    // ------------------------------------------------------------------
    // Email change
    // ------------------------------------------------------------------

    pub async fn change_email_start(
        &self,
        user_id: i64,
        new_email: &str,
    ) -> Result<BasicResult, AccountError> {
        let new_email = new_email.trim();
        if new_email.is_empty() {
            return Err(AccountError::BadRequest("New email is required.".into()));
        }
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to load user")?
            .ok_or_else(|| AccountError::Unauthorized("Unauthorized".into()))?;

        if let Some(existing) = self.users.get_by_email(new_email).await.context("Failed to check email")? {
            if existing.id != user.id {
                return Err(AccountError::BadRequest("Email already in use.".into()));
            }
        }

        let code = self
            .issue_identity_token(user.id, TokenPurpose::ChangeEmail, Some(new_email))
            .await?;
        let confirm_url = self.link(
            "ConfirmEmailChange",
            &[
                ("userId", &user.id.to_string()),
                ("code", &code),
                ("email", new_email),
            ],
        );

        let html = format!(
            "<p>Hej {},</p>\
             <p>Klicka för att bekräfta ny e-post: <a href=\"{}\">Bekräfta e-post</a></p>",
            escape_html(&user.username),
            confirm_url
        );
        self.send_email(new_email, "Bekräfta byte av e-post", &html).await;

        Ok(if self.settings.may_expose() {
            BasicResult::with_url("Confirmation sent.", confirm_url)
        } else {
            BasicResult::ok("Confirmation sent.")
        })
    }

    /// Apply a confirmed email change. A username equal to the old email follows the change.
    pub async fn change_email_confirm(
        &self,
        input: UserCodeInput,
        new_email: Option<&str>,
    ) -> Result<BasicResult, AccountError> {
        let new_email = new_email.map(str::trim).unwrap_or_default();
        if input.user_id.trim().is_empty() || input.code.trim().is_empty() || new_email.is_empty() {
            return Err(AccountError::BadRequest(
                "UserId, Code and newEmail are required.".into(),
            ));
        }
        let mut user = self
            .find_by_id_str(&input.user_id)
            .await?
            .ok_or_else(|| AccountError::BadRequest("Invalid user.".into()))?;

        let token = self
            .redeem_identity_token(user.id, TokenPurpose::ChangeEmail, &input.code)
            .await?
            .filter(|t| {
                t.new_email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(new_email))
            });
        if token.is_none() {
            return Err(AccountError::BadRequest(INVALID_TOKEN.into()));
        }

        if let Some(existing) = self.users.get_by_email(new_email).await.context("Failed to check email")? {
            if existing.id != user.id {
                return Err(AccountError::BadRequest("Email already in use.".into()));
            }
        }

        if user.username.eq_ignore_ascii_case(&user.email) {
            user.username = new_email.to_string();
        }
        user.email = new_email.to_string();
        user.email_confirmed = true;
        self.users.update(&user).await.context("Failed to change email")?;
        tracing::info!("User {} changed email", user.id);
        Ok(BasicResult::ok("Email changed."))
    }

    // ------------------------------------------------------------------
    // External login
    // ------------------------------------------------------------------

    fn external_provider(&self) -> Result<&Arc<dyn ExternalIdentityProvider>, AccountError> {
        self.external
            .as_ref()
            .ok_or_else(|| AccountError::NotFound("External login is not configured.".into()))
    }

    /// Provider url to redirect the browser to
    pub async fn external_login_start(&self, return_url: Option<&str>) -> Result<String, AccountError> {
        let provider = self.external_provider()?;
        let state = generate_one_time_code();
        self.oauth_states
            .set(
                &format!("{OAUTH_STATE_PREFIX}{state}"),
                &return_url.unwrap_or_default().to_string(),
                OAUTH_STATE_TTL,
            )
            .await?;
        Ok(provider.authorization_url(&state))
    }

    /// Finish an external login and return the frontend url carrying a one-time code.
    pub async fn external_login_callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        remote_error: Option<&str>,
    ) -> Result<String, AccountError> {
        let provider = self.external_provider()?;

        if let Some(error) = remote_error.filter(|e| !e.is_empty()) {
            tracing::warn!("External login error: {}", error);
            return Err(AccountError::BadRequest("External login error.".into()));
        }

        let state = state.unwrap_or_default();
        let known_state: Option<String> = if state.is_empty() {
            None
        } else {
            self.oauth_states.take(&format!("{OAUTH_STATE_PREFIX}{state}")).await?
        };
        if known_state.is_none() {
            return Err(AccountError::BadRequest("Invalid or expired login state.".into()));
        }

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AccountError::BadRequest("External login info missing.".into()))?;
        let identity = provider.fetch_identity(code).await.map_err(|e| {
            tracing::warn!("External identity lookup failed: {:#}", e);
            AccountError::BadRequest("External login info missing.".into())
        })?;

        if let Some(email) = identity.email.as_deref() {
            if self.settings.is_admin_email(email) {
                tracing::warn!("External login blocked for the system account");
                return Err(AccountError::Forbidden(
                    "External login is not allowed for this account.".into(),
                ));
            }
        }
        let email = identity
            .email
            .clone()
            .ok_or_else(|| AccountError::BadRequest("Email not provided by external provider.".into()))?;

        let existing = match self
            .users
            .find_by_login(provider.name(), &identity.provider_key)
            .await
            .context("Failed to find linked user")?
        {
            Some(user) => Some(user),
            None => self.users.get_by_email(&email).await.context("Failed to find user")?,
        };
        let user = match existing {
            Some(user) => user,
            None => {
                let user = self
                    .users
                    .create(&NewUser {
                        username: email.clone(),
                        email: email.clone(),
                        name: identity.name.clone(),
                        email_confirmed: true,
                        requires_username_setup: true,
                        ..Default::default()
                    })
                    .await
                    .context("Failed to create user")?;
                self.users
                    .add_role(user.id, Role::User.as_str())
                    .await
                    .context("Failed to assign role")?;
                tracing::info!("Created user {} from {} login", user.id, provider.name());
                user
            }
        };

        let logins = self.users.get_logins(user.id).await.context("Failed to load logins")?;
        if !logins.iter().any(|l| l.provider == provider.name()) {
            self.users
                .add_login(user.id, provider.name(), &identity.provider_key)
                .await
                .context("Failed to link login")?;
        }

        let refresh_lifetime =
            self.token_service.access_lifetime() + Duration::days(EXTERNAL_REFRESH_EXTRA_DAYS);
        let tokens = self.issue_tokens(&user, refresh_lifetime).await?;

        let login_code = generate_one_time_code();
        self.login_codes
            .set(
                &format!("{EXTERNAL_CODE_PREFIX}{login_code}"),
                &tokens,
                EXTERNAL_CODE_TTL,
            )
            .await?;

        Ok(format!(
            "{}/Identity/Account/ExternalLoginCallback?code={}",
            self.settings.frontend.origin(),
            urlencoding::encode(&login_code)
        ))
    }

    /// Redeem a one-time external-login code
    pub async fn exchange_external_code(&self, code: &str) -> Result<LoginResponse, AccountError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AccountError::BadRequest("Missing code.".into()));
        }
        self.login_codes
            .take::<LoginResponse>(&format!("{EXTERNAL_CODE_PREFIX}{code}"))
            .await?
            .ok_or_else(|| AccountError::BadRequest("Invalid or expired code.".into()))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn require_user(&self, user_id: i64) -> Result<User, AccountError> {
        self.users
            .get_by_id(user_id)
            .await
            .context("Failed to load user")?
            .ok_or_else(|| AccountError::BadRequest("User not found.".into()))
    }

    async fn find_by_id_str(&self, user_id: &str) -> Result<Option<User>, AccountError> {
        let Ok(id) = user_id.trim().parse::<i64>() else {
            return Ok(None);
        };
        Ok(self.users.get_by_id(id).await.context("Failed to load user")?)
    }

    async fn issue_identity_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        new_email: Option<&str>,
    ) -> Result<String, AccountError> {
        let (token, hash) = generate_identity_token();
        self.tokens
            .create_user_token(
                user_id,
                purpose,
                &hash,
                new_email,
                Utc::now() + Duration::hours(IDENTITY_TOKEN_HOURS),
            )
            .await
            .context("Failed to store identity token")?;
        Ok(token)
    }

    async fn redeem_identity_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<UserToken>, AccountError> {
        Ok(self
            .tokens
            .consume_user_token(user_id, purpose, &hash_token(token.trim()))
            .await
            .context("Failed to redeem identity token")?)
    }

    /// `{frontend}/Identity/Account/{page}?k=v&...`
    fn link(&self, page: &str, params: &[(&str, &str)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/Identity/Account/{}?{}", self.settings.frontend.base(), page, query)
    }

    /// Send an email; failures are logged and reported as `false`
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> bool {
        match self.email.send(to, subject, html).await {
            Ok(()) => {
                tracing::info!("Email '{}' sent to {}", subject, to);
                true
            }
            Err(e) => {
                tracing::error!("Email '{}' to {} failed: {:#}", subject, to, e);
                false
            }
        }
    }
}

fn check_password_policy(password: &str) -> Result<(), AccountError> {
    let errors = validate_password_policy(password);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AccountError::BadRequest(errors.join(" ")))
    }
}
