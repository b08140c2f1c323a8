//! Like repository

use crate::db::{with_pool, DynDatabasePool};
use crate::models::LikePreview;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait LikeRepository: Send + Sync {
    async fn count(&self, blogg_id: i64) -> Result<i64>;

    async fn exists(&self, blogg_id: i64, user_id: i64) -> Result<bool>;

    /// Record a like; liking twice has no further effect
    async fn add(&self, blogg_id: i64, user_id: i64) -> Result<()>;

    /// Returns false when the user had not liked the post
    async fn remove(&self, blogg_id: i64, user_id: i64) -> Result<bool>;

    async fn previews_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<LikePreview>>;

    async fn count_for_user(&self, user_id: i64) -> Result<i64>;
}

pub struct SqlxLikeRepository {
    pool: DynDatabasePool,
}

impl SqlxLikeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LikeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LikeRepository for SqlxLikeRepository {
    async fn count(&self, blogg_id: i64) -> Result<i64> {
        with_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM blogg_likes WHERE blogg_id = $1")
                .bind(blogg_id)
                .fetch_one(conn)
                .await
                .context("Failed to count likes")
        })
    }

    async fn exists(&self, blogg_id: i64, user_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) FROM blogg_likes WHERE blogg_id = $1 AND user_id = $2";
        let count = with_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(sql)
                .bind(blogg_id)
                .bind(user_id)
                .fetch_one(conn)
                .await
                .context("Failed to check like")
        })?;
        Ok(count > 0)
    }

    async fn add(&self, blogg_id: i64, user_id: i64) -> Result<()> {
        let sql = r#"
            INSERT INTO blogg_likes (blogg_id, user_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (blogg_id, user_id) DO NOTHING
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(blogg_id)
                .bind(user_id)
                .bind(Utc::now())
                .execute(conn)
                .await
                .context("Failed to add like")
                .map(|_| ())
        })
    }

    async fn remove(&self, blogg_id: i64, user_id: i64) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM blogg_likes WHERE blogg_id = $1 AND user_id = $2")
                .bind(blogg_id)
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to remove like")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn previews_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<LikePreview>> {
        let sql = r#"
            SELECT l.id, l.blogg_id, b.title AS blogg_title, l.created_at
            FROM blogg_likes l
            JOIN bloggs b ON b.id = l.blogg_id
            WHERE l.user_id = $1
            ORDER BY l.created_at DESC, l.id DESC
            LIMIT $2
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, LikePreview>(sql)
                .bind(user_id)
                .bind(limit)
                .fetch_all(conn)
                .await
                .context("Failed to get like previews")
        })
    }

    async fn count_for_user(&self, user_id: i64) -> Result<i64> {
        with_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM blogg_likes WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(conn)
                .await
                .context("Failed to count user likes")
        })
    }
}
