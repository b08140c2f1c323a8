//! Token repository
//!
//! Single-use identity tokens (email confirmation, password reset, email
//! change) and refresh tokens. Only SHA-256 hashes are stored.

use crate::db::{with_pool, DynDatabasePool};
use crate::models::{RefreshToken, TokenPurpose, UserToken};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Store a single-use token, replacing any earlier token of the same purpose
    async fn create_user_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
        new_email: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Redeem a single-use token. Returns `None` when the hash is unknown,
    /// belongs to another user or purpose, or has expired. A matching token is
    /// deleted whether or not it is still valid.
    async fn consume_user_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
    ) -> Result<Option<UserToken>>;

    /// Remove every single-use token of a user
    async fn delete_user_tokens(&self, user_id: i64) -> Result<()>;

    async fn create_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken>;

    async fn get_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>>;

    /// Mark a refresh token revoked; returns false when it was unknown or already revoked
    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool>;

    /// Revoke every active refresh token of a user
    async fn revoke_all_refresh_tokens(&self, user_id: i64) -> Result<u64>;
}

pub struct SqlxTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxTokenRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TokenRepository for SqlxTokenRepository {
    async fn create_user_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
        new_email: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM user_tokens WHERE user_id = $1 AND purpose = $2")
                .bind(user_id)
                .bind(purpose.as_str())
                .execute(conn)
                .await
                .context("Failed to clear previous tokens")?;

            sqlx::query(
                r#"
                INSERT INTO user_tokens (user_id, purpose, token_hash, new_email, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(user_id)
            .bind(purpose.as_str())
            .bind(token_hash)
            .bind(new_email)
            .bind(expires_at)
            .bind(Utc::now())
            .execute(conn)
            .await
            .context("Failed to store token")
            .map(|_| ())
        })
    }

    async fn consume_user_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
    ) -> Result<Option<UserToken>> {
        let select = r#"
            SELECT id, user_id, new_email, expires_at FROM user_tokens
            WHERE user_id = $1 AND purpose = $2 AND token_hash = $3
        "#;

        let token = with_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserToken>(select)
                .bind(user_id)
                .bind(purpose.as_str())
                .bind(token_hash)
                .fetch_optional(conn)
                .await
                .context("Failed to look up token")
        })?;

        let Some(token) = token else {
            return Ok(None);
        };

        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM user_tokens WHERE id = $1")
                .bind(token.id)
                .execute(conn)
                .await
                .context("Failed to delete token")
                .map(|_| ())
        })?;

        if token.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(token))
    }

    async fn delete_user_tokens(&self, user_id: i64) -> Result<()> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM user_tokens WHERE user_id = $1")
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to delete user tokens")
                .map(|_| ())
        })
    }

    async fn create_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken> {
        let sql = r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, expires_at, revoked_at
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, RefreshToken>(sql)
                .bind(user_id)
                .bind(token_hash)
                .bind(expires_at)
                .bind(Utc::now())
                .fetch_one(conn)
                .await
                .context("Failed to store refresh token")
        })
    }

    async fn get_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        let sql = "SELECT id, user_id, expires_at, revoked_at FROM refresh_tokens WHERE token_hash = $1";
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, RefreshToken>(sql)
                .bind(token_hash)
                .fetch_optional(conn)
                .await
                .context("Failed to get refresh token")
        })
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool> {
        let sql = "UPDATE refresh_tokens SET revoked_at = $1 WHERE token_hash = $2 AND revoked_at IS NULL";
        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(Utc::now())
                .bind(token_hash)
                .execute(conn)
                .await
                .context("Failed to revoke refresh token")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn revoke_all_refresh_tokens(&self, user_id: i64) -> Result<u64> {
        let sql = "UPDATE refresh_tokens SET revoked_at = $1 WHERE user_id = $2 AND revoked_at IS NULL";
        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(Utc::now())
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to revoke refresh tokens")
                .map(|r| r.rows_affected())
        })
    }
}
