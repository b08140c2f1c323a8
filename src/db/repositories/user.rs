//! User repository
//!
//! Database operations for accounts, their role memberships and linked
//! external logins.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and PostgreSQL

use crate::db::{with_pool, DynDatabasePool};
use crate::models::{ExternalLogin, NewUser, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, name, birth_year, phone_number, \
     profile_image_url, email_confirmed, notify_on_new_post, requires_username_setup, \
     two_factor_enabled, access_failed_count, lockout_end, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &NewUser) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username (case-insensitive)
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email (case-insensitive)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// All users ordered by username
    async fn list(&self) -> Result<Vec<User>>;

    /// Persist every mutable column of `user`
    async fn update(&self, user: &User) -> Result<()>;

    /// Delete a user; returns false when no row matched
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Confirmed users subscribed to new-post notifications
    async fn list_notification_recipients(&self) -> Result<Vec<User>>;

    /// Role names of a user, lowercase, sorted
    async fn get_roles(&self, user_id: i64) -> Result<Vec<String>>;

    /// Add the user to an existing role (no-op when already a member)
    async fn add_role(&self, user_id: i64, role: &str) -> Result<()>;

    /// Remove the user from a role; returns false when not a member
    async fn remove_role(&self, user_id: i64, role: &str) -> Result<bool>;

    /// Link an external provider identity to a user
    async fn add_login(&self, user_id: i64, provider: &str, provider_key: &str) -> Result<()>;

    /// Find the user linked to an external provider identity
    async fn find_by_login(&self, provider: &str, provider_key: &str) -> Result<Option<User>>;

    /// External logins of a user
    async fn get_logins(&self, user_id: i64) -> Result<Vec<ExternalLogin>>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and PostgreSQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO users (username, email, password_hash, name, birth_year,
                               email_confirmed, notify_on_new_post, requires_username_setup,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {USER_COLUMNS}
            "#
        );

        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.name)
                .bind(user.birth_year)
                .bind(user.email_confirmed)
                .bind(user.notify_on_new_post)
                .bind(user.requires_username_setup)
                .bind(now)
                .bind(now)
                .fetch_one(conn)
                .await
                .context("Failed to create user")
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get user by ID")
        })
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(username) = LOWER($1)");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .bind(username.trim())
                .fetch_optional(conn)
                .await
                .context("Failed to get user by username")
        })
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .bind(email.trim())
                .fetch_optional(conn)
                .await
                .context("Failed to get user by email")
        })
    }

    async fn list(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY LOWER(username)");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list users")
        })
    }

    async fn update(&self, user: &User) -> Result<()> {
        let sql = r#"
            UPDATE users
            SET username = $1, email = $2, password_hash = $3, name = $4, birth_year = $5,
                phone_number = $6, profile_image_url = $7, email_confirmed = $8,
                notify_on_new_post = $9, requires_username_setup = $10,
                two_factor_enabled = $11, access_failed_count = $12, lockout_end = $13,
                updated_at = $14
            WHERE id = $15
        "#;

        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.name)
                .bind(user.birth_year)
                .bind(&user.phone_number)
                .bind(&user.profile_image_url)
                .bind(user.email_confirmed)
                .bind(user.notify_on_new_post)
                .bind(user.requires_username_setup)
                .bind(user.two_factor_enabled)
                .bind(user.access_failed_count)
                .bind(user.lockout_end)
                .bind(Utc::now())
                .bind(user.id)
                .execute(conn)
                .await
                .context("Failed to update user")
                .map(|_| ())
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete user")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn list_notification_recipients(&self) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE email_confirmed = $1 AND notify_on_new_post = $2 ORDER BY id"
        );
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .bind(true)
                .bind(true)
                .fetch_all(conn)
                .await
                .context("Failed to list notification recipients")
        })
    }

    async fn get_roles(&self, user_id: i64) -> Result<Vec<String>> {
        let sql = r#"
            SELECT r.name FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, String>(sql)
                .bind(user_id)
                .fetch_all(conn)
                .await
                .context("Failed to get user roles")
        })
    }

    async fn add_role(&self, user_id: i64, role: &str) -> Result<()> {
        let sql = r#"
            INSERT INTO user_roles (user_id, role_id)
            SELECT $1, id FROM roles WHERE name = $2
            ON CONFLICT DO NOTHING
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(user_id)
                .bind(role.trim().to_lowercase())
                .execute(conn)
                .await
                .context("Failed to add user to role")
                .map(|_| ())
        })
    }

    async fn remove_role(&self, user_id: i64, role: &str) -> Result<bool> {
        let sql = r#"
            DELETE FROM user_roles
            WHERE user_id = $1 AND role_id IN (SELECT id FROM roles WHERE name = $2)
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(user_id)
                .bind(role.trim().to_lowercase())
                .execute(conn)
                .await
                .context("Failed to remove user from role")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn add_login(&self, user_id: i64, provider: &str, provider_key: &str) -> Result<()> {
        let sql = r#"
            INSERT INTO user_logins (provider, provider_key, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(provider)
                .bind(provider_key)
                .bind(user_id)
                .bind(Utc::now())
                .execute(conn)
                .await
                .context("Failed to link external login")
                .map(|_| ())
        })
    }

    async fn find_by_login(&self, provider: &str, provider_key: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = \
             (SELECT user_id FROM user_logins WHERE provider = $1 AND provider_key = $2)"
        );
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .bind(provider)
                .bind(provider_key)
                .fetch_optional(conn)
                .await
                .context("Failed to find user by external login")
        })
    }

    async fn get_logins(&self, user_id: i64) -> Result<Vec<ExternalLogin>> {
        let sql = r#"
            SELECT provider, provider_key FROM user_logins
            WHERE user_id = $1
            ORDER BY provider
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, ExternalLogin>(sql)
                .bind(user_id)
                .fetch_all(conn)
                .await
                .context("Failed to get external logins")
        })
    }
}
