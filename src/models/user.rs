//! User model
//!
//! Accounts, roles, authorization policies and the single-use tokens that back
//! the email confirmation and password reset flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 hash; `None` for accounts created through an external login
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub birth_year: Option<i32>,
    pub phone_number: Option<String>,
    pub profile_image_url: Option<String>,
    pub email_confirmed: bool,
    pub notify_on_new_post: bool,
    /// Set for external-login accounts until they pick a username
    pub requires_username_setup: bool,
    pub two_factor_enabled: bool,
    pub access_failed_count: i32,
    pub lockout_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Whether a lockout is in effect at `now`
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_end.is_some_and(|end| end > now)
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub birth_year: Option<i32>,
    pub email_confirmed: bool,
    pub notify_on_new_post: bool,
    pub requires_username_setup: bool,
}

/// Partial profile update; only `Some` fields are written
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub phone_number: Option<String>,
    pub name: Option<String>,
    pub birth_year: Option<i32>,
    pub notify_on_new_post: Option<bool>,
}

impl ProfileUpdate {
    /// True when applying the update to `user` would change nothing
    pub fn is_noop_for(&self, user: &User) -> bool {
        let same_phone = self
            .phone_number
            .as_ref()
            .map_or(true, |p| Some(p) == user.phone_number.as_ref());
        let same_name = self
            .name
            .as_ref()
            .map_or(true, |n| Some(n) == user.name.as_ref());
        let same_year = self.birth_year.map_or(true, |y| Some(y) == user.birth_year);
        let same_notify = self
            .notify_on_new_post
            .map_or(true, |n| n == user.notify_on_new_post);

        same_phone && same_name && same_year && same_notify
    }
}

/// Account as returned to clients (`/me`, user administration)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub user_name: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub birth_year: Option<i32>,
    pub email_confirmed: bool,
    pub phone_number: Option<String>,
    pub roles: Vec<String>,
    pub notify_on_new_post: bool,
    pub requires_username_setup: bool,
}

impl UserDto {
    pub fn from_user(user: &User, roles: Vec<String>) -> Self {
        Self {
            id: user.id.to_string(),
            user_name: user.username.clone(),
            email: Some(user.email.clone()),
            name: user.name.clone(),
            birth_year: user.birth_year,
            email_confirmed: user.email_confirmed,
            phone_number: user.phone_number.clone(),
            roles,
            notify_on_new_post: user.notify_on_new_post,
            requires_username_setup: user.requires_username_setup,
        }
    }
}

/// Linked external identity (e.g. Google)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLogin {
    pub provider: String,
    pub provider_key: String,
}

/// Built-in roles, ordered from most to least privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Admin,
    Superuser,
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Superadmin, Role::Admin, Role::Superuser, Role::User];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Superuser => "superuser",
            Role::User => "user",
        }
    }

    /// Lower is more privileged
    pub fn rank(self) -> u8 {
        match self {
            Role::Superadmin => 0,
            Role::Admin => 1,
            Role::Superuser => 2,
            Role::User => 3,
        }
    }

    /// Built-in roles cannot be deleted
    pub fn is_protected(name: &str) -> bool {
        name.parse::<Role>().is_ok()
    }

    /// The most privileged built-in role among `names`
    pub fn top<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<Role> {
        names
            .into_iter()
            .filter_map(|n| n.parse::<Role>().ok())
            .min_by_key(|r| r.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "superadmin" => Ok(Role::Superadmin),
            "admin" => Ok(Role::Admin),
            "superuser" => Ok(Role::Superuser),
            "user" => Ok(Role::User),
            _ => Err(anyhow::anyhow!("Invalid role: {}", s)),
        }
    }
}

/// Authorization policies applied to endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Any built-in role
    RequireUser,
    /// superuser, admin, superadmin
    CanModerateComments,
    /// admin, superadmin
    AdminOrSuperadmin,
    /// superadmin
    SuperadminOnly,
}

impl Policy {
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Policy::RequireUser => &[Role::User, Role::Superuser, Role::Admin, Role::Superadmin],
            Policy::CanModerateComments => &[Role::Superuser, Role::Admin, Role::Superadmin],
            Policy::AdminOrSuperadmin => &[Role::Admin, Role::Superadmin],
            Policy::SuperadminOnly => &[Role::Superadmin],
        }
    }

    /// Whether any of `roles` satisfies the policy (case-insensitive)
    pub fn allows<S: AsRef<str>>(self, roles: &[S]) -> bool {
        roles.iter().any(|r| {
            r.as_ref()
                .parse::<Role>()
                .is_ok_and(|role| self.allowed_roles().contains(&role))
        })
    }
}

/// What a single-use identity token may be redeemed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    ConfirmEmail,
    ResetPassword,
    ChangeEmail,
}

impl TokenPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenPurpose::ConfirmEmail => "confirm_email",
            TokenPurpose::ResetPassword => "reset_password",
            TokenPurpose::ChangeEmail => "change_email",
        }
    }
}

/// A redeemed identity token
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserToken {
    pub id: i64,
    pub user_id: i64,
    pub new_email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// A stored refresh token (hash only)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: 1,
            username: "sara".into(),
            email: "sara@example.com".into(),
            password_hash: Some("hash".into()),
            name: Some("Sara".into()),
            birth_year: Some(1990),
            phone_number: None,
            profile_image_url: None,
            email_confirmed: true,
            notify_on_new_post: false,
            requires_username_setup: false,
            two_factor_enabled: false,
            access_failed_count: 0,
            lockout_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_parse_and_rank() {
        assert_eq!("SuperAdmin".parse::<Role>().unwrap(), Role::Superadmin);
        assert!("editor".parse::<Role>().is_err());
        assert!(Role::Superadmin.rank() < Role::User.rank());
        assert_eq!(Role::top(["user", "admin", "custom"]), Some(Role::Admin));
        assert_eq!(Role::top(["custom"]), None);
    }

    #[test]
    fn test_policies() {
        assert!(Policy::RequireUser.allows(&["user"]));
        assert!(!Policy::RequireUser.allows(&["guest"]));
        assert!(Policy::CanModerateComments.allows(&["superuser"]));
        assert!(!Policy::CanModerateComments.allows(&["user"]));
        assert!(Policy::AdminOrSuperadmin.allows(&["user", "Admin"]));
        assert!(!Policy::AdminOrSuperadmin.allows(&["superuser"]));
        assert!(Policy::SuperadminOnly.allows(&["superadmin"]));
        assert!(!Policy::SuperadminOnly.allows(&["admin"]));
        assert!(!Policy::SuperadminOnly.allows::<&str>(&[]));
    }

    #[test]
    fn test_protected_roles() {
        assert!(Role::is_protected("Admin"));
        assert!(!Role::is_protected("moderator"));
    }

    #[test]
    fn test_lockout() {
        let mut user = sample_user();
        let now = Utc::now();
        assert!(!user.is_locked_out(now));
        user.lockout_end = Some(now + Duration::minutes(5));
        assert!(user.is_locked_out(now));
        user.lockout_end = Some(now - Duration::seconds(1));
        assert!(!user.is_locked_out(now));
    }

    #[test]
    fn test_profile_update_noop_detection() {
        let user = sample_user();
        assert!(ProfileUpdate::default().is_noop_for(&user));
        assert!(ProfileUpdate {
            name: Some("Sara".into()),
            birth_year: Some(1990),
            ..Default::default()
        }
        .is_noop_for(&user));
        assert!(!ProfileUpdate {
            notify_on_new_post: Some(true),
            ..Default::default()
        }
        .is_noop_for(&user));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["emailConfirmed"], true);
    }
}
