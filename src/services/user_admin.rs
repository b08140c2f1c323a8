//! User administration and self-service
//!
//! Superadmins manage roles and usernames of other accounts; every signed-in
//! user can edit their own profile, export their personal data and delete
//! their account. The configured system account is protected from deletion,
//! renaming and role removal.

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::repositories::{CommentRepository, LikeRepository, RoleRepository, UserRepository};
use crate::models::{PersonalData, ProfileUpdate, User, UserDto};
use crate::services::password::verify_password;

/// Upper bound for the comment and like lists of a personal data export
const PERSONAL_DATA_LIMIT: i64 = 10_000;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.-]{3,30}$").expect("valid username regex"));

/// Error types for user administration
#[derive(Debug, thiserror::Error)]
pub enum UserAdminError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct UserAdminService {
    users: Arc<dyn UserRepository>,
    roles: Arc<dyn RoleRepository>,
    comments: Arc<dyn CommentRepository>,
    likes: Arc<dyn LikeRepository>,
    admin_email: String,
}

impl UserAdminService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        roles: Arc<dyn RoleRepository>,
        comments: Arc<dyn CommentRepository>,
        likes: Arc<dyn LikeRepository>,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            users,
            roles,
            comments,
            likes,
            admin_email: admin_email.into(),
        }
    }

    fn is_system_user(&self, user: &User) -> bool {
        let admin = self.admin_email.trim();
        !admin.is_empty() && user.email.trim().eq_ignore_ascii_case(admin)
    }

    async fn find(&self, id: i64) -> Result<Option<User>, UserAdminError> {
        Ok(self.users.get_by_id(id).await.context("Failed to load user")?)
    }

    async fn to_dto(&self, user: &User) -> Result<UserDto, UserAdminError> {
        let roles = self.users.get_roles(user.id).await.context("Failed to load roles")?;
        Ok(UserDto::from_user(user, roles))
    }

    pub async fn list(&self) -> Result<Vec<UserDto>, UserAdminError> {
        let users = self.users.list().await.context("Failed to list users")?;
        let mut result = Vec::with_capacity(users.len());
        for user in &users {
            result.push(self.to_dto(user).await?);
        }
        Ok(result)
    }

    pub async fn get(&self, id: i64) -> Result<UserDto, UserAdminError> {
        let user = self
            .find(id)
            .await?
            .ok_or_else(|| UserAdminError::NotFound("User not found.".into()))?;
        self.to_dto(&user).await
    }

    pub async fn roles_of(&self, id: i64) -> Result<Vec<String>, UserAdminError> {
        if self.find(id).await?.is_none() {
            return Err(UserAdminError::NotFound("User not found.".into()));
        }
        Ok(self.users.get_roles(id).await.context("Failed to load roles")?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), UserAdminError> {
        let user = self
            .find(id)
            .await?
            .ok_or_else(|| UserAdminError::NotFound("User not found.".into()))?;
        if self.is_system_user(&user) {
            return Err(UserAdminError::BadRequest("System user cannot be deleted".into()));
        }
        self.users.delete(id).await.context("Failed to delete user")?;
        tracing::info!("Deleted user {} ({})", user.username, user.id);
        Ok(())
    }

    pub async fn add_role(&self, id: i64, role: &str) -> Result<(), UserAdminError> {
        let role = role.trim().to_lowercase();
        if self.find(id).await?.is_none() {
            return Err(UserAdminError::NotFound("User not found.".into()));
        }
        if role.is_empty() || !self.roles.exists(&role).await.context("Failed to check role")? {
            return Err(UserAdminError::BadRequest("Kunde inte lägga till rollen.".into()));
        }
        self.users
            .add_role(id, &role)
            .await
            .context("Failed to add role")?;
        Ok(())
    }

    pub async fn remove_role(&self, id: i64, role: &str) -> Result<(), UserAdminError> {
        let role = role.trim().to_lowercase();
        let user = self
            .find(id)
            .await?
            .ok_or_else(|| UserAdminError::NotFound("User not found.".into()))?;
        if self.is_system_user(&user) {
            return Err(UserAdminError::BadRequest(format!(
                "Det går inte att ta bort roller från {}.",
                self.admin_email
            )));
        }
        if !self
            .users
            .remove_role(id, &role)
            .await
            .context("Failed to remove role")?
        {
            return Err(UserAdminError::BadRequest("Kunde inte ta bort rollen.".into()));
        }
        Ok(())
    }

    /// Rename a user; completing a rename clears `requires_username_setup`.
    pub async fn change_username(&self, id: i64, new_username: &str) -> Result<(), UserAdminError> {
        let new_username = new_username.trim();
        if new_username.is_empty() {
            return Err(UserAdminError::BadRequest("New username is required.".into()));
        }
        if !USERNAME_RE.is_match(new_username) {
            return Err(UserAdminError::BadRequest("Invalid username format.".into()));
        }
        let mut user = self
            .find(id)
            .await?
            .ok_or_else(|| UserAdminError::BadRequest("User not found.".into()))?;
        if self.is_system_user(&user) {
            return Err(UserAdminError::BadRequest("System user cannot be renamed.".into()));
        }
        if let Some(existing) = self
            .users
            .get_by_username(new_username)
            .await
            .context("Failed to check username")?
        {
            if existing.id != user.id {
                return Err(UserAdminError::BadRequest("Username already taken.".into()));
            }
        }

        user.username = new_username.to_string();
        user.requires_username_setup = false;
        self.users.update(&user).await.context("Failed to rename user")?;
        Ok(())
    }

    /// Apply the provided profile fields; returns whether anything changed.
    pub async fn update_profile(&self, id: i64, update: ProfileUpdate) -> Result<bool, UserAdminError> {
        if let Some(year) = update.birth_year {
            if !(1900..=2100).contains(&year) {
                return Err(UserAdminError::BadRequest(
                    "BirthYear must be between 1900 and 2100.".into(),
                ));
            }
        }
        let mut user = self
            .find(id)
            .await?
            .ok_or_else(|| UserAdminError::BadRequest("User not found.".into()))?;

        let update = ProfileUpdate {
            name: update.name.map(|n| n.trim().to_string()),
            ..update
        };
        if update.is_noop_for(&user) {
            return Ok(false);
        }

        if let Some(phone) = update.phone_number {
            user.phone_number = Some(phone).filter(|p| !p.trim().is_empty());
        }
        if let Some(name) = update.name {
            user.name = Some(name);
        }
        if let Some(year) = update.birth_year {
            user.birth_year = Some(year);
        }
        if let Some(notify) = update.notify_on_new_post {
            user.notify_on_new_post = notify;
        }
        self.users.update(&user).await.context("Failed to update profile")?;
        Ok(true)
    }

    pub async fn personal_data(&self, id: i64) -> Result<PersonalData, UserAdminError> {
        let user = self.find(id).await?.ok_or(UserAdminError::Unauthorized)?;
        let roles = self.users.get_roles(id).await.context("Failed to load roles")?;
        let logins = self.users.get_logins(id).await.context("Failed to load logins")?;

        let mut comments = self
            .comments
            .previews_for_user(id, &user.email, PERSONAL_DATA_LIMIT)
            .await
            .context("Failed to load comments")?;
        comments.reverse();
        let mut likes = self
            .likes
            .previews_for_user(id, PERSONAL_DATA_LIMIT)
            .await
            .context("Failed to load likes")?;
        likes.reverse();

        let comments_count = self
            .comments
            .count_for_user(id, &user.email)
            .await
            .context("Failed to count comments")?;
        let likes_count = self
            .likes
            .count_for_user(id)
            .await
            .context("Failed to count likes")?;

        Ok(PersonalData {
            data: personal_data_map(&user),
            roles,
            logins,
            comments_count,
            likes_count,
            comments,
            likes,
        })
    }

    /// Personal data as a downloadable JSON file: `(file name, body)`
    pub async fn personal_data_file(&self, id: i64) -> Result<(String, Vec<u8>), UserAdminError> {
        let user = self.find(id).await?.ok_or(UserAdminError::Unauthorized)?;
        let data = self.personal_data(id).await?;
        let body = serde_json::to_vec_pretty(&data).context("Failed to serialize personal data")?;
        Ok((personal_data_file_name(&user.username), body))
    }

    /// Delete the caller's own account. Accounts with a password must confirm it.
    pub async fn delete_self(&self, id: i64, password: Option<&str>) -> Result<(), UserAdminError> {
        let user = self
            .find(id)
            .await?
            .ok_or_else(|| UserAdminError::BadRequest("User not found.".into()))?;
        if self.is_system_user(&user) {
            return Err(UserAdminError::BadRequest("System user cannot be deleted.".into()));
        }

        if let Some(hash) = user.password_hash.as_deref().filter(|h| !h.is_empty()) {
            let password = password
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| UserAdminError::BadRequest("Password required.".into()))?;
            if !verify_password(password, hash).unwrap_or(false) {
                return Err(UserAdminError::BadRequest("Invalid password.".into()));
            }
        }

        self.users.delete(id).await.context("Failed to delete account")?;
        tracing::info!("User {} deleted their account", id);
        Ok(())
    }
}

fn personal_data_map(user: &User) -> BTreeMap<String, Option<String>> {
    let entries = [
        ("Id", Some(user.id.to_string())),
        ("UserName", Some(user.username.clone())),
        ("Email", Some(user.email.clone())),
        ("PhoneNumber", user.phone_number.clone()),
        ("Name", user.name.clone()),
        ("BirthYear", user.birth_year.map(|y| y.to_string())),
        ("TwoFactorEnabled", Some(user.two_factor_enabled.to_string())),
        ("LockoutEnd", user.lockout_end.map(|d| d.to_rfc3339())),
        ("AccessFailedCount", Some(user.access_failed_count.to_string())),
        ("NotifyOnNewPost", Some(user.notify_on_new_post.to_string())),
    ];
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// `{username}_personal_data.json` with `@` and `:` replaced by `_`
pub fn personal_data_file_name(username: &str) -> String {
    format!("{}_personal_data.json", username.replace(['@', ':'], "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::blogg::tests::sample_blogg;
    use crate::db::repositories::{
        BloggRepository, NewComment, SqlxBloggRepository, SqlxCommentRepository,
        SqlxLikeRepository, SqlxRoleRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::NewUser;
    use crate::services::password::hash_password;

    struct Harness {
        service: UserAdminService,
        users: Arc<dyn UserRepository>,
        bloggs: Arc<dyn BloggRepository>,
        comments: Arc<dyn CommentRepository>,
        likes: Arc<dyn LikeRepository>,
    }

    async fn harness() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let comments = SqlxCommentRepository::boxed(pool.clone());
        let likes = SqlxLikeRepository::boxed(pool.clone());
        let service = UserAdminService::new(
            users.clone(),
            SqlxRoleRepository::boxed(pool.clone()),
            comments.clone(),
            likes.clone(),
            "admin@sarasblogg.se",
        );
        Harness {
            service,
            users,
            bloggs: SqlxBloggRepository::boxed(pool),
            comments,
            likes,
        }
    }

    async fn user(h: &Harness, name: &str, email: &str, password: Option<&str>) -> User {
        h.users
            .create(&NewUser {
                username: name.into(),
                email: email.into(),
                password_hash: password.map(|p| hash_password(p).unwrap()),
                email_confirmed: true,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_system_user_is_protected() {
        let h = harness().await;
        let admin = user(&h, "admin", "Admin@SarasBlogg.se", None).await;
        h.users.add_role(admin.id, "superadmin").await.unwrap();

        let err = h.service.delete(admin.id).await.unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(m) if m == "System user cannot be deleted"));
        let err = h.service.remove_role(admin.id, "superadmin").await.unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(_)));
        let err = h.service.change_username(admin.id, "nyadmin").await.unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(m) if m == "System user cannot be renamed."));
        let err = h.service.delete_self(admin.id, None).await.unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(m) if m == "System user cannot be deleted."));
    }

    #[tokio::test]
    async fn test_delete_missing_user() {
        let h = harness().await;
        assert!(matches!(
            h.service.delete(404).await.unwrap_err(),
            UserAdminError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_add_and_remove_roles() {
        let h = harness().await;
        let anna = user(&h, "anna", "anna@example.com", None).await;

        h.service.add_role(anna.id, "  SuperUser ").await.unwrap();
        assert_eq!(h.service.roles_of(anna.id).await.unwrap(), vec!["superuser"]);

        let err = h.service.add_role(anna.id, "finnsinte").await.unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(_)));

        h.service.remove_role(anna.id, "superuser").await.unwrap();
        assert!(h.service.remove_role(anna.id, "superuser").await.is_err());
        assert!(h.service.get(anna.id).await.unwrap().roles.is_empty());
    }

    #[tokio::test]
    async fn test_change_username_rules() {
        let h = harness().await;
        let anna = user(&h, "anna@example.com", "anna@example.com", None).await;
        user(&h, "bertil", "bertil@example.com", None).await;
        let mut pending = h.users.get_by_id(anna.id).await.unwrap().unwrap();
        pending.requires_username_setup = true;
        h.users.update(&pending).await.unwrap();

        for bad in ["ab", "med mellanslag", "å-ä-ö"] {
            let err = h.service.change_username(anna.id, bad).await.unwrap_err();
            assert!(matches!(err, UserAdminError::BadRequest(m) if m == "Invalid username format."));
        }
        let err = h.service.change_username(anna.id, "Bertil").await.unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(m) if m == "Username already taken."));
        let err = h.service.change_username(999, "ledig").await.unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(m) if m == "User not found."));

        h.service.change_username(anna.id, "anna_s").await.unwrap();
        let renamed = h.users.get_by_id(anna.id).await.unwrap().unwrap();
        assert_eq!(renamed.username, "anna_s");
        assert!(!renamed.requires_username_setup);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let h = harness().await;
        let anna = user(&h, "anna", "anna@example.com", None).await;

        assert!(!h.service.update_profile(anna.id, ProfileUpdate::default()).await.unwrap());

        let changed = h
            .service
            .update_profile(
                anna.id,
                ProfileUpdate {
                    name: Some("  Anna A ".into()),
                    birth_year: Some(1985),
                    notify_on_new_post: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(changed);
        let updated = h.users.get_by_id(anna.id).await.unwrap().unwrap();
        assert_eq!(updated.name.as_deref(), Some("Anna A"));
        assert_eq!(updated.birth_year, Some(1985));
        assert!(updated.notify_on_new_post);

        let same = ProfileUpdate {
            name: Some("Anna A".into()),
            ..Default::default()
        };
        assert!(!h.service.update_profile(anna.id, same).await.unwrap());

        let err = h
            .service
            .update_profile(
                anna.id,
                ProfileUpdate {
                    birth_year: Some(1800),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_personal_data_lists_activity_oldest_first() {
        let h = harness().await;
        let anna = user(&h, "anna", "anna@example.com", None).await;
        h.users.add_role(anna.id, "user").await.unwrap();
        let post = h.bloggs.create(&sample_blogg("Vårresan")).await.unwrap();

        for text in ["första", "andra"] {
            h.comments
                .create(&NewComment {
                    blogg_id: post.id,
                    user_id: Some(anna.id),
                    name: "anna".into(),
                    email: Some("anna@example.com".into()),
                    content: text.into(),
                })
                .await
                .unwrap();
        }
        h.likes.add(post.id, anna.id).await.unwrap();

        let data = h.service.personal_data(anna.id).await.unwrap();
        assert_eq!(data.roles, vec!["user"]);
        assert_eq!(data.comments_count, 2);
        assert_eq!(data.likes_count, 1);
        assert_eq!(data.comments[0].content, "första");
        assert_eq!(data.comments[1].blogg_title, "Vårresan");
        assert_eq!(data.likes[0].blogg_id, post.id);
        assert_eq!(data.data["UserName"].as_deref(), Some("anna"));
        assert_eq!(data.data["BirthYear"], None);

        assert!(matches!(
            h.service.personal_data(999).await.unwrap_err(),
            UserAdminError::Unauthorized
        ));
    }

    #[tokio::test]
    async fn test_personal_data_file() {
        let h = harness().await;
        let ext = user(&h, "ext@mail.se", "ext@mail.se", None).await;

        let (name, body) = h.service.personal_data_file(ext.id).await.unwrap();
        assert_eq!(name, "ext_mail.se_personal_data.json");
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["Email"], "ext@mail.se");
        assert_eq!(json["commentsCount"], 0);
    }

    #[tokio::test]
    async fn test_delete_self_requires_password() {
        let h = harness().await;
        let anna = user(&h, "anna", "anna@example.com", Some("Hemligt1!")).await;

        let err = h.service.delete_self(anna.id, None).await.unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(m) if m == "Password required."));
        let err = h.service.delete_self(anna.id, Some("fel")).await.unwrap_err();
        assert!(matches!(err, UserAdminError::BadRequest(m) if m == "Invalid password."));

        h.service.delete_self(anna.id, Some("Hemligt1!")).await.unwrap();
        assert!(h.users.get_by_id(anna.id).await.unwrap().is_none());

        let external = user(&h, "ext", "ext@example.com", None).await;
        h.service.delete_self(external.id, None).await.unwrap();
    }

    #[test]
    fn test_personal_data_file_name() {
        assert_eq!(personal_data_file_name("a@b:c"), "a_b_c_personal_data.json");
        assert_eq!(personal_data_file_name("sara"), "sara_personal_data.json");
    }
}
