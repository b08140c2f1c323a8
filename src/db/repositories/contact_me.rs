//! Contact form repository

use crate::db::{with_pool, DynDatabasePool};
use crate::models::{ContactMe, ContactMeInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait ContactMeRepository: Send + Sync {
    /// Submissions, newest first
    async fn list(&self) -> Result<Vec<ContactMe>>;

    async fn create(&self, input: &ContactMeInput) -> Result<ContactMe>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxContactMeRepository {
    pool: DynDatabasePool,
}

impl SqlxContactMeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContactMeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ContactMeRepository for SqlxContactMeRepository {
    async fn list(&self) -> Result<Vec<ContactMe>> {
        let sql = r#"
            SELECT id, name, email, subject, message, created_at
            FROM contact_me
            ORDER BY created_at DESC, id DESC
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, ContactMe>(sql)
                .fetch_all(conn)
                .await
                .context("Failed to list contact messages")
        })
    }

    async fn create(&self, input: &ContactMeInput) -> Result<ContactMe> {
        let sql = r#"
            INSERT INTO contact_me (name, email, subject, message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, subject, message, created_at
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, ContactMe>(sql)
                .bind(input.name.trim())
                .bind(input.email.trim())
                .bind(input.subject.trim())
                .bind(input.message.trim())
                .bind(Utc::now())
                .fetch_one(conn)
                .await
                .context("Failed to create contact message")
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM contact_me WHERE id = $1")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete contact message")
                .map(|r| r.rows_affected() > 0)
        })
    }
}
