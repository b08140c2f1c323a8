//! Blogg repository
//!
//! Database operations for blog posts.

use crate::db::{with_pool, DynDatabasePool};
use crate::models::Blogg;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

const BLOGG_COLUMNS: &str =
    "id, title, content, author, launch_date, is_archived, view_count, hidden, user_id";

/// Blogg repository trait
#[async_trait]
pub trait BloggRepository: Send + Sync {
    /// All posts, newest launch date first
    async fn list(&self) -> Result<Vec<Blogg>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Blogg>>;

    /// Insert a post; the `id` of `blogg` is ignored
    async fn create(&self, blogg: &Blogg) -> Result<Blogg>;

    /// Overwrite a post; returns false when it does not exist
    async fn update(&self, blogg: &Blogg) -> Result<bool>;

    async fn set_hidden(&self, id: i64, hidden: bool) -> Result<bool>;

    async fn set_archived(&self, id: i64, archived: bool) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based blogg repository implementation
pub struct SqlxBloggRepository {
    pool: DynDatabasePool,
}

impl SqlxBloggRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BloggRepository> {
        Arc::new(Self::new(pool))
    }

    async fn set_flag(&self, column: &str, id: i64, value: bool) -> Result<bool> {
        let sql = format!("UPDATE bloggs SET {column} = $1 WHERE id = $2");
        with_pool!(self.pool, conn => {
            sqlx::query(&sql)
                .bind(value)
                .bind(id)
                .execute(conn)
                .await
                .with_context(|| format!("Failed to update {column}"))
                .map(|r| r.rows_affected() > 0)
        })
    }
}

#[async_trait]
impl BloggRepository for SqlxBloggRepository {
    async fn list(&self) -> Result<Vec<Blogg>> {
        let sql = format!("SELECT {BLOGG_COLUMNS} FROM bloggs ORDER BY launch_date DESC, id DESC");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Blogg>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list bloggs")
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Blogg>> {
        let sql = format!("SELECT {BLOGG_COLUMNS} FROM bloggs WHERE id = $1");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Blogg>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get blogg")
        })
    }

    async fn create(&self, blogg: &Blogg) -> Result<Blogg> {
        let sql = format!(
            r#"
            INSERT INTO bloggs (title, content, author, launch_date, is_archived, view_count, hidden, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {BLOGG_COLUMNS}
            "#
        );
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Blogg>(&sql)
                .bind(&blogg.title)
                .bind(&blogg.content)
                .bind(&blogg.author)
                .bind(blogg.launch_date)
                .bind(blogg.is_archived)
                .bind(blogg.view_count)
                .bind(blogg.hidden)
                .bind(blogg.user_id)
                .fetch_one(conn)
                .await
                .context("Failed to create blogg")
        })
    }

    async fn update(&self, blogg: &Blogg) -> Result<bool> {
        let sql = r#"
            UPDATE bloggs
            SET title = $1, content = $2, author = $3, launch_date = $4, is_archived = $5,
                view_count = $6, hidden = $7, user_id = $8
            WHERE id = $9
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(&blogg.title)
                .bind(&blogg.content)
                .bind(&blogg.author)
                .bind(blogg.launch_date)
                .bind(blogg.is_archived)
                .bind(blogg.view_count)
                .bind(blogg.hidden)
                .bind(blogg.user_id)
                .bind(blogg.id)
                .execute(conn)
                .await
                .context("Failed to update blogg")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn set_hidden(&self, id: i64, hidden: bool) -> Result<bool> {
        self.set_flag("hidden", id, hidden).await
    }

    async fn set_archived(&self, id: i64, archived: bool) -> Result<bool> {
        self.set_flag("is_archived", id, archived).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM bloggs WHERE id = $1")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete blogg")
                .map(|r| r.rows_affected() > 0)
        })
    }
}
