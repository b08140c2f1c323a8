//! Comment repository
//!
//! Provides database operations for comments.

use crate::db::{with_pool, DynDatabasePool};
use crate::models::{Comment, CommentPreview};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const COMMENT_COLUMNS: &str = "id, blogg_id, user_id, name, email, content, created_at";

/// Comment to be inserted
#[derive(Debug, Clone, Default)]
pub struct NewComment {
    pub blogg_id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
    pub content: String,
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Every comment, oldest first
    async fn list(&self) -> Result<Vec<Comment>>;

    /// Comments of a post, oldest first
    async fn list_by_blogg(&self, blogg_id: i64) -> Result<Vec<Comment>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    async fn create(&self, comment: &NewComment) -> Result<Comment>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn delete_by_blogg(&self, blogg_id: i64) -> Result<u64>;

    /// Latest comments written by a user (matched by id or email), with post titles
    async fn previews_for_user(
        &self,
        user_id: i64,
        email: &str,
        limit: i64,
    ) -> Result<Vec<CommentPreview>>;

    async fn count_for_user(&self, user_id: i64, email: &str) -> Result<i64>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn list(&self) -> Result<Vec<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments ORDER BY created_at, id");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Comment>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list comments")
        })
    }

    async fn list_by_blogg(&self, blogg_id: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE blogg_id = $1 ORDER BY created_at, id"
        );
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Comment>(&sql)
                .bind(blogg_id)
                .fetch_all(conn)
                .await
                .context("Failed to list comments by blogg")
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Comment>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get comment")
        })
    }

    async fn create(&self, comment: &NewComment) -> Result<Comment> {
        let sql = format!(
            r#"
            INSERT INTO comments (blogg_id, user_id, name, email, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COMMENT_COLUMNS}
            "#
        );
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Comment>(&sql)
                .bind(comment.blogg_id)
                .bind(comment.user_id)
                .bind(&comment.name)
                .bind(&comment.email)
                .bind(&comment.content)
                .bind(Utc::now())
                .fetch_one(conn)
                .await
                .context("Failed to create comment")
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM comments WHERE id = $1")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete comment")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn delete_by_blogg(&self, blogg_id: i64) -> Result<u64> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM comments WHERE blogg_id = $1")
                .bind(blogg_id)
                .execute(conn)
                .await
                .context("Failed to delete comments by blogg")
                .map(|r| r.rows_affected())
        })
    }

    async fn previews_for_user(
        &self,
        user_id: i64,
        email: &str,
        limit: i64,
    ) -> Result<Vec<CommentPreview>> {
        let sql = r#"
            SELECT c.id, c.blogg_id, b.title AS blogg_title, c.content, c.created_at
            FROM comments c
            JOIN bloggs b ON b.id = c.blogg_id
            WHERE c.user_id = $1 OR LOWER(c.email) = LOWER($2)
            ORDER BY c.created_at DESC, c.id DESC
            LIMIT $3
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, CommentPreview>(sql)
                .bind(user_id)
                .bind(email)
                .bind(limit)
                .fetch_all(conn)
                .await
                .context("Failed to get comment previews")
        })
    }

    async fn count_for_user(&self, user_id: i64, email: &str) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM comments WHERE user_id = $1 OR LOWER(email) = LOWER($2)";
        with_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(sql)
                .bind(user_id)
                .bind(email)
                .fetch_one(conn)
                .await
                .context("Failed to count comments")
        })
    }
}
